//! Tax Refiner
//!
//! Nudges share counts on lots already in a plan to pull net tax toward zero
//! while keeping proceeds inside the configured band around the target.

use crate::allocation::AllocationBook;
use crate::config::OptimizerConfig;
use crate::eligibility::EligibleLots;
use crate::lot::Lot;
use crate::tax_calculator::AllocationCalculator;

/// One kind of local adjustment, in the order the refiner may apply them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Sell more of included loss lots (net tax is positive)
    IncreaseLosses,
    /// Sell less of included gain lots (net tax is positive)
    DecreaseGains,
    /// Sell more of included gain lots (net tax is negative)
    IncreaseGains,
    /// Sell less of included loss lots (net tax is negative)
    DecreaseLosses,
}

impl Adjustment {
    fn targets_gains(self) -> bool {
        matches!(self, Adjustment::DecreaseGains | Adjustment::IncreaseGains)
    }
}

pub struct Refiner<'a> {
    calc: &'a AllocationCalculator<'a>,
    config: &'a OptimizerConfig,
    lots: &'a EligibleLots<'a>,
}

impl<'a> Refiner<'a> {
    pub fn new(
        calc: &'a AllocationCalculator<'a>,
        config: &'a OptimizerConfig,
        lots: &'a EligibleLots<'a>,
    ) -> Self {
        Self { calc, config, lots }
    }

    /// Refine a plan and drop entries that ended at zero shares.
    ///
    /// A plan already within the tax tolerance is returned unchanged.
    pub fn refine(&self, book: AllocationBook, target_amount: f64) -> AllocationBook {
        let tolerance = self.config.tax_tolerance;
        let total_tax = book.total_tax();

        if total_tax.abs() < tolerance {
            return book;
        }

        let refined = if total_tax > 0.0 {
            let book = self.increase(book, Adjustment::IncreaseLosses, target_amount);
            if book.total_tax() > tolerance {
                self.decrease(book, Adjustment::DecreaseGains, target_amount)
            } else {
                book
            }
        } else {
            let book = self.increase(book, Adjustment::IncreaseGains, target_amount);
            if book.total_tax() < -tolerance {
                self.decrease(book, Adjustment::DecreaseLosses, target_amount)
            } else {
                book
            }
        };

        tracing::debug!(
            "Refined tax ${:.2} -> ${:.2} (proceeds ${:.2})",
            total_tax,
            refined.total_tax(),
            refined.total_proceeds()
        );

        refined.pruned()
    }

    /// Included lots on the side an adjustment touches, best candidate first
    pub fn rank(&self, book: &AllocationBook, adjustment: Adjustment) -> Vec<(&'a Lot, f64)> {
        let wants_gain = adjustment.targets_gains();
        let mut ranked: Vec<(&'a Lot, f64)> = book
            .iter()
            .filter(|a| if wants_gain { a.tax > 0.0 } else { a.tax < 0.0 })
            .filter_map(|a| self.lots.get(a.lot_index))
            .map(|lot| (lot, self.calc.tax_per_share(lot)))
            .filter(|(_, tax_per_share)| *tax_per_share != 0.0)
            .collect();

        ranked.sort_by(|(a, a_tax), (b, b_tax)| {
            let primary = match adjustment {
                // Most negative tax per dollar of proceeds first
                Adjustment::IncreaseLosses => {
                    (a_tax / self.calc.price(a)).total_cmp(&(b_tax / self.calc.price(b)))
                }
                Adjustment::DecreaseGains => b_tax.total_cmp(a_tax),
                Adjustment::IncreaseGains => a_tax.total_cmp(b_tax),
                Adjustment::DecreaseLosses => b_tax.abs().total_cmp(&a_tax.abs()),
            };
            primary.then(a.index.cmp(&b.index))
        });

        ranked
    }

    fn increase(
        &self,
        mut book: AllocationBook,
        adjustment: Adjustment,
        target_amount: f64,
    ) -> AllocationBook {
        let ceiling = target_amount * self.config.upper_proceeds_band;

        for (lot, tax_per_share) in self.rank(&book, adjustment) {
            let total_tax = book.total_tax();
            let total_proceeds = book.total_proceeds();
            if total_tax.abs() < self.config.tax_tolerance || total_proceeds >= ceiling {
                break;
            }

            let sold = book.get(lot.index);
            let current = sold.map_or(0.0, |a| a.shares);
            let shares_per_dollar = match sold {
                Some(a) if a.proceeds > 0.0 => a.shares / a.proceeds,
                _ => 1.0,
            };
            let unsold = lot.quantity - current;
            // Offsetting shares scaled by shares per dollar already sold
            let offsetting = total_tax.abs() / tax_per_share.abs() * shares_per_dollar;
            let headroom = self.calc.shares_for_amount(lot, ceiling - total_proceeds);
            let additional = unsold.min(offsetting).min(headroom);

            if additional > 0.0 {
                let shares = (current + additional).min(lot.quantity);
                book.upsert(self.calc.allocation(lot, shares));
            }
        }

        book
    }

    fn decrease(
        &self,
        mut book: AllocationBook,
        adjustment: Adjustment,
        target_amount: f64,
    ) -> AllocationBook {
        let floor = target_amount * self.config.lower_proceeds_band;
        let dust = self.config.dust_floor_shares;

        for (lot, tax_per_share) in self.rank(&book, adjustment) {
            let total_tax = book.total_tax();
            let total_proceeds = book.total_proceeds();
            if total_tax.abs() < self.config.tax_tolerance || total_proceeds <= floor {
                break;
            }

            let current = book.shares_of(lot.index);
            if current <= dust {
                continue;
            }

            let offsetting = total_tax.abs() / tax_per_share.abs();
            let room = self.calc.shares_for_amount(lot, total_proceeds - floor);
            let to_remove = (current * self.config.max_removal_fraction)
                .min(offsetting)
                .min(room);

            if to_remove > 0.0 {
                let mut shares = current - to_remove;
                if shares < dust {
                    shares = 0.0;
                }
                book.upsert(self.calc.allocation(lot, shares));
            }
        }

        book
    }
}
