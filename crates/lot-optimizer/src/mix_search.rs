//! Gain/Loss Mix Search
//!
//! Sweeps the share of the target raised from gain lots versus loss lots and
//! keeps the mix whose net tax lands closest to zero.

use crate::allocation::AllocationBook;
use crate::config::{OptimizerConfig, AMOUNT_EPSILON};
use crate::eligibility::EligibleLots;
use crate::lot::Lot;
use crate::tax_calculator::AllocationCalculator;

/// A lot paired with the tax of selling one share of it
#[derive(Debug, Clone, Copy)]
pub struct RankedLot<'a> {
    pub lot: &'a Lot,
    /// Signed tax of selling one share at the current price
    pub tax_per_share: f64,
}

/// Best mix found by the sweep
#[derive(Debug, Clone)]
pub struct MixCandidate {
    /// Percentage of the target raised from gain lots
    pub gain_percent: u32,
    /// Allocations of the mix
    pub book: AllocationBook,
    /// Proceeds of the mix; at least the proceeds floor
    pub total_proceeds: f64,
    /// Net signed tax of the mix
    pub total_tax: f64,
}

pub struct MixSearch<'a> {
    calc: &'a AllocationCalculator<'a>,
    config: &'a OptimizerConfig,
}

impl<'a> MixSearch<'a> {
    pub fn new(calc: &'a AllocationCalculator<'a>, config: &'a OptimizerConfig) -> Self {
        Self { calc, config }
    }

    /// Split lots into gain lots (cheapest tax first) and loss lots
    /// (smallest benefit first). Tax-neutral lots belong to neither.
    pub fn partition<'l>(
        &self,
        eligible: &EligibleLots<'l>,
    ) -> (Vec<RankedLot<'l>>, Vec<RankedLot<'l>>) {
        let (mut gains, mut losses): (Vec<_>, Vec<_>) = eligible
            .iter()
            .map(|lot| RankedLot {
                lot,
                tax_per_share: self.calc.tax_per_share(lot),
            })
            .filter(|ranked| ranked.tax_per_share != 0.0)
            .partition(|ranked| ranked.tax_per_share > 0.0);

        gains.sort_by(|a, b| {
            a.tax_per_share
                .total_cmp(&b.tax_per_share)
                .then(a.lot.index.cmp(&b.lot.index))
        });
        losses.sort_by(|a, b| {
            a.tax_per_share
                .abs()
                .total_cmp(&b.tax_per_share.abs())
                .then(a.lot.index.cmp(&b.lot.index))
        });

        (gains, losses)
    }

    /// Returns `None` when no mix raises at least the proceeds floor
    pub fn run(&self, eligible: &EligibleLots<'_>, target_amount: f64) -> Option<MixCandidate> {
        let (gains, losses) = self.partition(eligible);
        let floor = target_amount * self.config.proceeds_floor;
        let mut best: Option<MixCandidate> = None;

        for gain_percent in self.config.mix_ratios() {
            let candidate = self.trial(&gains, &losses, gain_percent, target_amount);

            if candidate.total_proceeds < floor {
                continue;
            }

            let closer = best
                .as_ref()
                .map_or(true, |b| candidate.total_tax.abs() < b.total_tax.abs());
            if closer {
                best = Some(candidate);
            }
        }

        match &best {
            Some(b) => tracing::debug!(
                "Mix search picked {}% gains: proceeds ${:.2}, tax ${:.2}",
                b.gain_percent,
                b.total_proceeds,
                b.total_tax
            ),
            None => tracing::debug!(
                "Mix search found no mix reaching ${:.2} ({} gain lots, {} loss lots)",
                floor,
                gains.len(),
                losses.len()
            ),
        }

        best
    }

    fn trial(
        &self,
        gains: &[RankedLot<'_>],
        losses: &[RankedLot<'_>],
        gain_percent: u32,
        target_amount: f64,
    ) -> MixCandidate {
        let gain_target = target_amount * (f64::from(gain_percent) / 100.0);
        let loss_target = target_amount * (f64::from(100 - gain_percent) / 100.0);

        let mut book = AllocationBook::new();
        self.consume(gains, gain_target, &mut book);
        self.consume(losses, loss_target, &mut book);

        MixCandidate {
            gain_percent,
            total_proceeds: book.total_proceeds(),
            total_tax: book.total_tax(),
            book,
        }
    }

    /// Sell down `lots` in order until `amount` is raised or they run out
    fn consume(&self, lots: &[RankedLot<'_>], amount: f64, book: &mut AllocationBook) {
        let mut remaining = amount;
        for ranked in lots {
            if remaining <= AMOUNT_EPSILON {
                break;
            }
            let shares = ranked
                .lot
                .quantity
                .min(self.calc.shares_for_amount(ranked.lot, remaining));
            if shares > 0.0 {
                let allocation = self.calc.allocation(ranked.lot, shares);
                remaining -= allocation.proceeds;
                book.upsert(allocation);
            }
        }
    }
}
