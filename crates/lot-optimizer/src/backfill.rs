//! Shortfall Backfill
//!
//! Brings a refined plan back up to the proceeds floor, first from lots it
//! already sells and then from lots it has not touched.

use crate::allocation::AllocationBook;
use crate::config::OptimizerConfig;
use crate::eligibility::EligibleLots;
use crate::lot::Lot;
use crate::tax_calculator::AllocationCalculator;

pub struct Backfill<'a> {
    calc: &'a AllocationCalculator<'a>,
    config: &'a OptimizerConfig,
    lots: &'a EligibleLots<'a>,
}

impl<'a> Backfill<'a> {
    pub fn new(
        calc: &'a AllocationCalculator<'a>,
        config: &'a OptimizerConfig,
        lots: &'a EligibleLots<'a>,
    ) -> Self {
        Self { calc, config, lots }
    }

    /// No-op when proceeds already reach the floor. May still fall short when
    /// the portfolio runs out.
    pub fn fill(&self, book: AllocationBook, target_amount: f64) -> AllocationBook {
        let floor = target_amount * self.config.proceeds_floor;
        if book.total_proceeds() >= floor {
            return book;
        }

        let book = self.top_up_included(book, target_amount, floor);
        if book.total_proceeds() >= floor {
            return book;
        }

        let book = self.add_unused(book, target_amount, floor);
        if book.total_proceeds() < floor {
            tracing::warn!(
                "Backfill left a shortfall: ${:.2} of ${:.2} raised",
                book.total_proceeds(),
                target_amount
            );
        }
        book
    }

    fn top_up_included(
        &self,
        mut book: AllocationBook,
        target_amount: f64,
        floor: f64,
    ) -> AllocationBook {
        let included: Vec<&Lot> = self.lots.iter().filter(|lot| book.contains(lot.index)).collect();

        for lot in included {
            let total_proceeds = book.total_proceeds();
            if total_proceeds >= floor {
                break;
            }

            let current = book.shares_of(lot.index);
            let unsold = lot.quantity - current;
            let additional = unsold.min(self.calc.shares_for_amount(lot, target_amount - total_proceeds));

            if additional > 0.0 {
                let shares = (current + additional).min(lot.quantity);
                book.upsert(self.calc.allocation(lot, shares));
            }
        }

        book
    }

    fn add_unused(&self, mut book: AllocationBook, target_amount: f64, floor: f64) -> AllocationBook {
        for lot in self.unused_order(&book) {
            let total_proceeds = book.total_proceeds();
            if total_proceeds >= floor {
                break;
            }

            let shares = lot
                .quantity
                .min(self.calc.shares_for_amount(lot, target_amount - total_proceeds));
            if shares > 0.0 {
                book.upsert(self.calc.allocation(lot, shares));
            }
        }

        book
    }

    /// Lots absent from the plan, in the order the backfill should use them.
    ///
    /// With net tax at or above zero the most tax-neutral lots come first; with
    /// a net benefit, gain lots come first so the benefit is spent.
    pub fn unused_order(&self, book: &AllocationBook) -> Vec<&'a Lot> {
        let prefer_gains = book.total_tax() < 0.0;

        let mut unused: Vec<(&'a Lot, u8, f64)> = self
            .lots
            .iter()
            .filter(|lot| !book.contains(lot.index))
            .map(|lot| {
                let (group, score) = match self.calc.tax_efficiency_score(lot) {
                    None => (2, 0.0),
                    Some(score) if !prefer_gains => (0, score),
                    Some(score) if self.calc.tax_per_share(lot) > 0.0 => (0, score),
                    Some(_) => (1, 0.0),
                };
                (lot, group, score)
            })
            .collect();

        unused.sort_by(|(a, a_group, a_score), (b, b_group, b_score)| {
            a_group
                .cmp(b_group)
                .then(a_score.total_cmp(b_score))
                .then(a.index.cmp(&b.index))
        });

        unused.into_iter().map(|(lot, _, _)| lot).collect()
    }
}
