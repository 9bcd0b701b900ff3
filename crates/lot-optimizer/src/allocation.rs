//! Allocations
//!
//! The sale records produced by the optimizer and the ordered, index-keyed
//! book the phases pass between each other.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Shares sold from one lot, with the resulting proceeds and signed tax
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    /// Index of the lot sold from
    pub lot_index: usize,
    /// Shares sold (fractional shares allowed)
    pub shares: f64,
    /// Shares times current price
    pub proceeds: f64,
    /// Signed tax: positive is owed, negative is a benefit
    pub tax: f64,
}

impl Allocation {
    pub fn is_empty(&self) -> bool {
        self.shares <= 0.0
    }
}

/// Ordered allocations with at most one entry per lot.
///
/// `upsert` replaces an existing entry in place and appends otherwise, so the
/// first-seen order of lots is preserved across phases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationBook {
    entries: Vec<Allocation>,
    positions: HashMap<usize, usize>,
}

impl AllocationBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, lot_index: usize) -> bool {
        self.positions.contains_key(&lot_index)
    }

    pub fn get(&self, lot_index: usize) -> Option<&Allocation> {
        self.positions.get(&lot_index).map(|&pos| &self.entries[pos])
    }

    /// Shares currently sold from a lot (0 when absent)
    pub fn shares_of(&self, lot_index: usize) -> f64 {
        self.get(lot_index).map_or(0.0, |a| a.shares)
    }

    pub fn upsert(&mut self, allocation: Allocation) {
        match self.positions.get(&allocation.lot_index) {
            Some(&pos) => self.entries[pos] = allocation,
            None => {
                self.positions.insert(allocation.lot_index, self.entries.len());
                self.entries.push(allocation);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Allocation> {
        self.entries.iter()
    }

    pub fn lot_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|a| a.lot_index)
    }

    pub fn total_proceeds(&self) -> f64 {
        self.entries.iter().map(|a| a.proceeds).sum()
    }

    pub fn total_tax(&self) -> f64 {
        self.entries.iter().map(|a| a.tax).sum()
    }

    pub fn total_shares(&self) -> f64 {
        self.entries.iter().map(|a| a.shares).sum()
    }

    /// Drop entries whose shares settled at zero
    pub fn pruned(self) -> Self {
        self.entries.into_iter().filter(|a| !a.is_empty()).collect()
    }

    pub fn into_allocations(self) -> Vec<Allocation> {
        self.entries
    }
}

impl FromIterator<Allocation> for AllocationBook {
    fn from_iter<I: IntoIterator<Item = Allocation>>(iter: I) -> Self {
        let mut book = Self::new();
        for allocation in iter {
            book.upsert(allocation);
        }
        book
    }
}
