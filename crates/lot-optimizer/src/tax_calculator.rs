//! Tax Calculator
//!
//! Rate schedules and the per-lot proceeds/tax arithmetic every phase relies on.

use crate::allocation::Allocation;
use crate::error::{OptimizerError, Result};
use crate::lot::{HoldingPeriod, Lot, PriceMap, LONG_TERM_THRESHOLD_DAYS};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Supported tax jurisdictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TaxJurisdiction {
    /// United States - short/long term (1 year)
    #[default]
    US,
    /// United Kingdom - single CGT rate
    UK,
    /// Canada - 50% inclusion rate
    Canada,
    /// Australia - CGT discount (12 months)
    Australia,
    /// Germany - flat tax
    Germany,
    /// Custom rates
    Custom,
}

impl std::fmt::Display for TaxJurisdiction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaxJurisdiction::US => write!(f, "United States"),
            TaxJurisdiction::UK => write!(f, "United Kingdom"),
            TaxJurisdiction::Canada => write!(f, "Canada"),
            TaxJurisdiction::Australia => write!(f, "Australia"),
            TaxJurisdiction::Germany => write!(f, "Germany"),
            TaxJurisdiction::Custom => write!(f, "Custom"),
        }
    }
}

/// Short-term and long-term capital gains rates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxRateTable {
    /// Rate on gains held under the long-term threshold
    pub short_term: f64,
    /// Rate on gains held at least the long-term threshold
    pub long_term: f64,
}

impl Default for TaxRateTable {
    fn default() -> Self {
        Self {
            short_term: 0.35,
            long_term: 0.15,
        }
    }
}

impl TaxRateTable {
    pub fn new(short_term: f64, long_term: f64) -> Result<Self> {
        let table = Self {
            short_term,
            long_term,
        };
        table.validate()?;
        Ok(table)
    }

    /// Top-bracket rates for a jurisdiction
    pub fn for_jurisdiction(jurisdiction: TaxJurisdiction) -> Self {
        match jurisdiction {
            TaxJurisdiction::US => Self { short_term: 0.37, long_term: 0.20 },
            TaxJurisdiction::UK => Self { short_term: 0.20, long_term: 0.20 },
            TaxJurisdiction::Canada => Self { short_term: 0.25, long_term: 0.25 },
            TaxJurisdiction::Australia => Self { short_term: 0.45, long_term: 0.225 },
            // 25% + solidarity surcharge
            TaxJurisdiction::Germany => Self { short_term: 0.26375, long_term: 0.26375 },
            TaxJurisdiction::Custom => Self::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (term, rate) in [("short_term", self.short_term), ("long_term", self.long_term)] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(OptimizerError::InvalidTaxRate { term, rate });
            }
        }
        Ok(())
    }

    pub fn rate(&self, holding_period: HoldingPeriod) -> f64 {
        match holding_period {
            HoldingPeriod::ShortTerm => self.short_term,
            HoldingPeriod::LongTerm => self.long_term,
        }
    }
}

/// Proceeds and tax for (lot, shares) pairs under one price snapshot.
///
/// Tax is signed: positive is a liability, negative a benefit.
#[derive(Debug, Clone)]
pub struct AllocationCalculator<'a> {
    prices: &'a PriceMap,
    rates: TaxRateTable,
    as_of: NaiveDate,
    long_term_threshold_days: i64,
}

impl<'a> AllocationCalculator<'a> {
    pub fn new(prices: &'a PriceMap, rates: TaxRateTable) -> Self {
        Self {
            prices,
            rates,
            as_of: Utc::now().date_naive(),
            long_term_threshold_days: LONG_TERM_THRESHOLD_DAYS,
        }
    }

    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn with_long_term_threshold(mut self, days: i64) -> Self {
        self.long_term_threshold_days = days;
        self
    }

    pub fn rates(&self) -> &TaxRateTable {
        &self.rates
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// Current price, or 0 for unpriced symbols
    pub fn price(&self, lot: &Lot) -> f64 {
        match self.prices.get(&lot.symbol) {
            Some(&price) if price > 0.0 => price,
            _ => 0.0,
        }
    }

    pub fn holding_period(&self, lot: &Lot) -> HoldingPeriod {
        lot.holding_period(self.as_of, self.long_term_threshold_days)
    }

    pub fn rate(&self, lot: &Lot) -> f64 {
        self.rates.rate(self.holding_period(lot))
    }

    pub fn is_eligible(&self, lot: &Lot) -> bool {
        self.price(lot) > 0.0 && lot.quantity > 0.0
    }

    pub fn tax(&self, lot: &Lot, shares: f64) -> f64 {
        if shares <= 0.0 {
            return 0.0;
        }
        let gain_loss_per_share = lot.unrealized_gain_loss_per_share(self.price(lot));
        shares * gain_loss_per_share * self.rate(lot)
    }

    pub fn proceeds(&self, lot: &Lot, shares: f64) -> f64 {
        if shares <= 0.0 {
            return 0.0;
        }
        shares * self.price(lot)
    }

    /// Tax for selling a single share
    pub fn tax_per_share(&self, lot: &Lot) -> f64 {
        self.tax(lot, 1.0)
    }

    /// Absolute tax per dollar of proceeds; `None` for unpriced or empty lots.
    ///
    /// Smaller is closer to a tax-neutral sale.
    pub fn tax_efficiency_score(&self, lot: &Lot) -> Option<f64> {
        let price = self.price(lot);
        if price <= 0.0 || lot.quantity <= 0.0 {
            return None;
        }
        let gain_loss_per_share = lot.unrealized_gain_loss_per_share(price);
        Some((gain_loss_per_share * self.rate(lot) / price).abs())
    }

    /// Shares needed to raise `amount`, 0 when the lot has no price
    pub fn shares_for_amount(&self, lot: &Lot, amount: f64) -> f64 {
        let price = self.price(lot);
        if price <= 0.0 || amount <= 0.0 {
            return 0.0;
        }
        amount / price
    }

    pub fn allocation(&self, lot: &Lot, shares: f64) -> Allocation {
        let shares = shares.max(0.0);
        Allocation {
            lot_index: lot.index,
            shares,
            proceeds: self.proceeds(lot, shares),
            tax: self.tax(lot, shares),
        }
    }
}
