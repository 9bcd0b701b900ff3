//! Lot Eligibility
//!
//! Selects the lots that can be sold and indexes them by lot index.

use crate::error::{OptimizerError, Result};
use crate::lot::Lot;
use crate::tax_calculator::AllocationCalculator;
use std::collections::{HashMap, HashSet};

/// Sellable lots in input order, plus a lookup table by lot index
#[derive(Debug, Clone, Default)]
pub struct EligibleLots<'a> {
    lots: Vec<&'a Lot>,
    by_index: HashMap<usize, &'a Lot>,
}

impl<'a> EligibleLots<'a> {
    /// Keep lots with a positive price and quantity.
    ///
    /// Fails only when two input lots share an index.
    pub fn build(lots: &'a [Lot], calc: &AllocationCalculator<'_>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(lots.len());
        let mut eligible = Self::default();

        for lot in lots {
            if !seen.insert(lot.index) {
                return Err(OptimizerError::DuplicateLotIndex(lot.index));
            }

            if lot.is_degenerate() {
                tracing::warn!(
                    "Skipping degenerate lot {} ({} shares @ ${:.2})",
                    lot.index,
                    lot.quantity,
                    lot.cost_basis_per_share
                );
                continue;
            }

            if !calc.is_eligible(lot) {
                tracing::debug!("Skipping lot {}: no price for {}", lot.index, lot.symbol);
                continue;
            }

            eligible.by_index.insert(lot.index, lot);
            eligible.lots.push(lot);
        }

        Ok(eligible)
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Lot> + '_ {
        self.lots.iter().copied()
    }

    pub fn get(&self, lot_index: usize) -> Option<&'a Lot> {
        self.by_index.get(&lot_index).copied()
    }

    pub fn total_shares(&self) -> f64 {
        self.lots.iter().map(|lot| lot.quantity).sum()
    }

    pub fn total_value(&self, calc: &AllocationCalculator<'_>) -> f64 {
        self.lots.iter().map(|lot| lot.market_value(calc.price(lot))).sum()
    }
}
