//! Optimizer Configuration
//!
//! Tolerances and step sizes used by the search and refinement phases.

use crate::error::{OptimizerError, Result};
use crate::lot::LONG_TERM_THRESHOLD_DAYS;
use serde::{Deserialize, Serialize};

/// Remaining amounts at or below this are treated as fully raised
pub const AMOUNT_EPSILON: f64 = 1e-9;

/// Heuristic constants for a single optimization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Fraction of the target that proceeds must reach (0.98 = 2% tolerance)
    pub proceeds_floor: f64,
    /// Gain/loss mix step in percentage points
    pub mix_step_percent: u32,
    /// Net tax considered "close enough" to zero, in currency
    pub tax_tolerance: f64,
    /// Refiner stops adding shares above this fraction of the target
    pub upper_proceeds_band: f64,
    /// Refiner stops removing shares below this fraction of the target
    pub lower_proceeds_band: f64,
    /// Share positions smaller than this are rounded down to zero
    pub dust_floor_shares: f64,
    /// Largest fraction of a lot's sold shares removed in one step
    pub max_removal_fraction: f64,
    /// Days held to qualify for long-term treatment
    pub long_term_threshold_days: i64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            proceeds_floor: 0.98,
            mix_step_percent: 5,
            tax_tolerance: 1.0,
            upper_proceeds_band: 1.05,
            lower_proceeds_band: 0.95,
            dust_floor_shares: 0.1,
            max_removal_fraction: 0.5,
            long_term_threshold_days: LONG_TERM_THRESHOLD_DAYS,
        }
    }
}

impl OptimizerConfig {
    /// Parse a (possibly partial) JSON document; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| OptimizerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.proceeds_floor > 0.0 && self.proceeds_floor <= 1.0) {
            return Err(OptimizerError::InvalidConfig(format!(
                "proceeds_floor must be within (0, 1], got {}",
                self.proceeds_floor
            )));
        }
        if self.mix_step_percent == 0 || self.mix_step_percent > 100 {
            return Err(OptimizerError::InvalidConfig(format!(
                "mix_step_percent must be within 1..=100, got {}",
                self.mix_step_percent
            )));
        }
        if !(self.tax_tolerance >= 0.0 && self.tax_tolerance.is_finite()) {
            return Err(OptimizerError::InvalidConfig(format!(
                "tax_tolerance must be a non-negative number, got {}",
                self.tax_tolerance
            )));
        }
        if !(self.lower_proceeds_band > 0.0
            && self.lower_proceeds_band <= self.proceeds_floor
            && self.upper_proceeds_band >= 1.0
            && self.upper_proceeds_band.is_finite())
        {
            return Err(OptimizerError::InvalidConfig(format!(
                "proceeds band {}..{} must straddle the floor {} and the target",
                self.lower_proceeds_band, self.upper_proceeds_band, self.proceeds_floor
            )));
        }
        if !(self.dust_floor_shares >= 0.0 && self.dust_floor_shares.is_finite()) {
            return Err(OptimizerError::InvalidConfig(format!(
                "dust_floor_shares must be non-negative, got {}",
                self.dust_floor_shares
            )));
        }
        if !(self.max_removal_fraction > 0.0 && self.max_removal_fraction <= 1.0) {
            return Err(OptimizerError::InvalidConfig(format!(
                "max_removal_fraction must be within (0, 1], got {}",
                self.max_removal_fraction
            )));
        }
        if self.long_term_threshold_days < 0 {
            return Err(OptimizerError::InvalidConfig(format!(
                "long_term_threshold_days must be non-negative, got {}",
                self.long_term_threshold_days
            )));
        }
        Ok(())
    }

    /// Gain percentages tried by the mix search, ascending
    pub fn mix_ratios(&self) -> impl Iterator<Item = u32> {
        (0..=100u32).step_by(self.mix_step_percent.max(1) as usize)
    }
}
