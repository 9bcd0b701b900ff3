//! Lot Optimizer
//!
//! Tax-aware lot selection: given tax lots, current prices and a cash target,
//! decide how many shares of each lot to sell so the sale raises the target
//! while realized gains and losses offset as closely as possible.
//! Rate presets cover US, UK, Canada, Australia and Germany.

pub mod allocation;
pub mod backfill;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod harvester;
pub mod lot;
pub mod mix_search;
pub mod optimizer;
pub mod refiner;
pub mod tax_calculator;
#[cfg(test)]
mod tests;

pub use allocation::{Allocation, AllocationBook};
pub use config::OptimizerConfig;
pub use error::{OptimizerError, Result};
pub use harvester::{FallbackHarvester, HarvestTier};
pub use lot::{GainType, HoldingPeriod, Lot, PriceMap};
pub use optimizer::{OptimizerPhase, PlanStrategy, SalePlan, TaxOptimizer};
pub use tax_calculator::{AllocationCalculator, TaxJurisdiction, TaxRateTable};
