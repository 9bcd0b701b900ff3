//! Stock Lots
//!
//! One acquisition batch of a security and the facts derived from it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current market price per symbol
pub type PriceMap = HashMap<String, f64>;

/// Days held before a lot qualifies for long-term treatment
pub const LONG_TERM_THRESHOLD_DAYS: i64 = 365;

/// Holding period classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoldingPeriod {
    ShortTerm,
    LongTerm,
}

impl std::fmt::Display for HoldingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoldingPeriod::ShortTerm => write!(f, "Short-term"),
            HoldingPeriod::LongTerm => write!(f, "Long-term"),
        }
    }
}

/// Type of gain/loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GainType {
    ShortTermGain,
    ShortTermLoss,
    LongTermGain,
    LongTermLoss,
}

impl GainType {
    pub fn new(gain_loss: f64, holding_period: HoldingPeriod) -> Self {
        match (gain_loss >= 0.0, holding_period) {
            (true, HoldingPeriod::LongTerm) => GainType::LongTermGain,
            (true, HoldingPeriod::ShortTerm) => GainType::ShortTermGain,
            (false, HoldingPeriod::LongTerm) => GainType::LongTermLoss,
            (false, HoldingPeriod::ShortTerm) => GainType::ShortTermLoss,
        }
    }

    pub fn is_loss(&self) -> bool {
        matches!(self, GainType::ShortTermLoss | GainType::LongTermLoss)
    }

    pub fn is_long_term(&self) -> bool {
        matches!(self, GainType::LongTermGain | GainType::LongTermLoss)
    }
}

/// A purchase batch of a single security.
///
/// Lots are read-only inputs: the optimizer never changes a lot, it only
/// produces allocations that reference one by `index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    /// Stable identity, unique within a run
    pub index: usize,
    /// Number of shares held
    pub quantity: f64,
    /// Security identifier
    pub symbol: String,
    /// Acquisition date
    pub date_acquired: NaiveDate,
    /// Cost basis per share
    pub cost_basis_per_share: f64,
}

impl Lot {
    pub fn new(
        index: usize,
        quantity: f64,
        symbol: impl Into<String>,
        date_acquired: NaiveDate,
        cost_basis_per_share: f64,
    ) -> Self {
        Self {
            index,
            quantity,
            symbol: symbol.into(),
            date_acquired,
            cost_basis_per_share,
        }
    }

    /// Lots with no shares or no cost basis should never reach the optimizer
    pub fn is_degenerate(&self) -> bool {
        !(self.quantity > 0.0 && self.cost_basis_per_share > 0.0)
    }

    pub fn days_held(&self, as_of: NaiveDate) -> i64 {
        (as_of - self.date_acquired).num_days()
    }

    pub fn holding_period(&self, as_of: NaiveDate, threshold_days: i64) -> HoldingPeriod {
        if self.days_held(as_of) >= threshold_days {
            HoldingPeriod::LongTerm
        } else {
            HoldingPeriod::ShortTerm
        }
    }

    pub fn unrealized_gain_loss_per_share(&self, current_price: f64) -> f64 {
        current_price - self.cost_basis_per_share
    }

    pub fn total_unrealized_gain_loss(&self, current_price: f64) -> f64 {
        self.quantity * self.unrealized_gain_loss_per_share(current_price)
    }

    pub fn market_value(&self, current_price: f64) -> f64 {
        self.quantity * current_price
    }

    pub fn gain_type(&self, current_price: f64, holding_period: HoldingPeriod) -> GainType {
        GainType::new(self.total_unrealized_gain_loss(current_price), holding_period)
    }
}

impl std::fmt::Display for Lot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Lot {}: {} shares of {}, acquired {}, cost basis ${:.2}",
            self.index, self.quantity, self.symbol, self.date_acquired, self.cost_basis_per_share
        )
    }
}
