//! Tax-Loss Harvesting Fallback
//!
//! Liquidation order used when no gain/loss mix reaches the target: realize
//! losses first, then long-term gains, then short-term gains.

use crate::allocation::AllocationBook;
use crate::config::AMOUNT_EPSILON;
use crate::eligibility::EligibleLots;
use crate::lot::{GainType, Lot};
use crate::tax_calculator::AllocationCalculator;
use serde::{Deserialize, Serialize};

/// Sale priority of a lot, earliest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HarvestTier {
    /// Unrealized loss of either term
    Loss,
    /// Price equals cost basis
    Neutral,
    LongTermGain,
    ShortTermGain,
}

impl HarvestTier {
    pub fn classify(gain_loss_per_share: f64, gain_type: GainType) -> Self {
        if gain_loss_per_share == 0.0 {
            return Self::Neutral;
        }
        if gain_type.is_loss() {
            Self::Loss
        } else if gain_type.is_long_term() {
            Self::LongTermGain
        } else {
            Self::ShortTermGain
        }
    }
}

pub struct FallbackHarvester<'a> {
    calc: &'a AllocationCalculator<'a>,
}

impl<'a> FallbackHarvester<'a> {
    pub fn new(calc: &'a AllocationCalculator<'a>) -> Self {
        Self { calc }
    }

    pub fn tier(&self, lot: &Lot) -> HarvestTier {
        let price = self.calc.price(lot);
        let gain_type = lot.gain_type(price, self.calc.holding_period(lot));
        HarvestTier::classify(lot.unrealized_gain_loss_per_share(price), gain_type)
    }

    /// Losses by largest total loss, neutral lots, then gains by lowest tax per share
    pub fn harvest_order<'l>(&self, eligible: &EligibleLots<'l>) -> Vec<&'l Lot> {
        let mut ordered: Vec<(&'l Lot, HarvestTier)> =
            eligible.iter().map(|lot| (lot, self.tier(lot))).collect();

        ordered.sort_by(|(a, a_tier), (b, b_tier)| {
            let within = match a_tier {
                HarvestTier::Loss => a
                    .total_unrealized_gain_loss(self.calc.price(a))
                    .total_cmp(&b.total_unrealized_gain_loss(self.calc.price(b))),
                HarvestTier::Neutral => std::cmp::Ordering::Equal,
                HarvestTier::LongTermGain | HarvestTier::ShortTermGain => self
                    .calc
                    .tax_per_share(a)
                    .total_cmp(&self.calc.tax_per_share(b)),
            };
            a_tier
                .cmp(b_tier)
                .then(within)
                .then(a.index.cmp(&b.index))
        });

        ordered.into_iter().map(|(lot, _)| lot).collect()
    }

    /// Sell in harvest order until the target is raised.
    ///
    /// A portfolio worth less than the target is sold in full.
    pub fn harvest(&self, eligible: &EligibleLots<'_>, target_amount: f64) -> AllocationBook {
        let order = self.harvest_order(eligible);
        let portfolio_value = eligible.total_value(self.calc);

        if portfolio_value < target_amount {
            tracing::warn!(
                "Portfolio value ${:.2} is below target ${:.2}; selling every eligible lot",
                portfolio_value,
                target_amount
            );
            return order
                .into_iter()
                .map(|lot| self.calc.allocation(lot, lot.quantity))
                .collect();
        }

        let mut book = AllocationBook::new();
        let mut remaining = target_amount;
        for lot in order {
            if remaining <= AMOUNT_EPSILON {
                break;
            }
            let shares = lot.quantity.min(self.calc.shares_for_amount(lot, remaining));
            if shares > 0.0 {
                let allocation = self.calc.allocation(lot, shares);
                remaining -= allocation.proceeds;
                book.upsert(allocation);
            }
        }

        book
    }
}
