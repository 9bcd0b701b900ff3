//! Tax-Aware Sale Optimizer
//!
//! Chooses which lots to sell, and how many shares of each, to raise a cash
//! target with net realized tax as close to zero as possible.
//!
//! The run is a one-pass state machine:
//! `Searching -> Refining -> Done` when a gain/loss mix reaches the proceeds
//! floor, otherwise `Searching -> Fallback -> Done`.

use crate::allocation::{Allocation, AllocationBook};
use crate::backfill::Backfill;
use crate::config::OptimizerConfig;
use crate::eligibility::EligibleLots;
use crate::error::{OptimizerError, Result};
use crate::harvester::FallbackHarvester;
use crate::lot::{Lot, PriceMap};
use crate::mix_search::{MixCandidate, MixSearch};
use crate::refiner::Refiner;
use crate::tax_calculator::{AllocationCalculator, TaxRateTable};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Phases of an optimization run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerPhase {
    Searching,
    Refining,
    Fallback,
    Done,
}

/// How the final allocation was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStrategy {
    /// No lot had both a price and shares
    NoEligibleLots,
    /// Mix search, refinement and backfill
    MixRefined { gain_percent: u32 },
    /// Loss-first liquidation
    Fallback,
}

/// Result of an optimization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalePlan {
    /// Cash the plan was asked to raise
    pub target_amount: f64,
    /// Sales in plan order, at most one per lot
    pub allocations: Vec<Allocation>,
    /// Sum of allocation proceeds
    pub total_proceeds: f64,
    /// Net signed tax across all allocations
    pub total_tax: f64,
    /// Path that produced the allocations
    pub strategy: PlanStrategy,
    /// Phases visited, in order
    pub phases: Vec<OptimizerPhase>,
    /// Fraction of the target the plan was expected to reach
    pub proceeds_floor: f64,
}

impl SalePlan {
    fn new(
        target_amount: f64,
        book: AllocationBook,
        strategy: PlanStrategy,
        phases: Vec<OptimizerPhase>,
        proceeds_floor: f64,
    ) -> Self {
        Self {
            target_amount,
            total_proceeds: book.total_proceeds(),
            total_tax: book.total_tax(),
            allocations: book.into_allocations(),
            strategy,
            phases,
            proceeds_floor,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    /// Proceeds left after paying (or plus the benefit of) the realized tax
    pub fn net_proceeds(&self) -> f64 {
        self.total_proceeds - self.total_tax
    }

    /// Amount of the target not raised
    pub fn shortfall(&self) -> f64 {
        (self.target_amount - self.total_proceeds).max(0.0)
    }

    pub fn target_achievement_pct(&self) -> f64 {
        if self.target_amount > 0.0 {
            self.total_proceeds / self.target_amount * 100.0
        } else {
            0.0
        }
    }

    pub fn meets_floor(&self) -> bool {
        self.total_proceeds >= self.target_amount * self.proceeds_floor
    }

    pub fn total_shares(&self) -> f64 {
        self.allocations.iter().map(|a| a.shares).sum()
    }

    /// `(lot_index, shares)` pairs in plan order
    pub fn sales(&self) -> Vec<(usize, f64)> {
        self.allocations
            .iter()
            .map(|a| (a.lot_index, a.shares))
            .collect()
    }

    /// What is left of each lot after the plan executes; fully sold lots are omitted
    pub fn remaining_lots(&self, lots: &[Lot]) -> Vec<Lot> {
        let sold: HashMap<usize, f64> = self
            .allocations
            .iter()
            .map(|a| (a.lot_index, a.shares))
            .collect();

        lots.iter()
            .filter_map(|lot| {
                let remaining = lot.quantity - sold.get(&lot.index).copied().unwrap_or(0.0);
                (remaining > 0.0).then(|| Lot {
                    quantity: remaining,
                    ..lot.clone()
                })
            })
            .collect()
    }
}

/// Run state; each variant carries what the next phase consumes
enum State {
    Searching,
    Refining(MixCandidate),
    Fallback,
    Done(AllocationBook, PlanStrategy),
}

impl State {
    fn phase(&self) -> OptimizerPhase {
        match self {
            State::Searching => OptimizerPhase::Searching,
            State::Refining(_) => OptimizerPhase::Refining,
            State::Fallback => OptimizerPhase::Fallback,
            State::Done(..) => OptimizerPhase::Done,
        }
    }
}

/// Optimizer over an immutable snapshot of lots, prices and tax rates
pub struct TaxOptimizer<'a> {
    lots: &'a [Lot],
    prices: &'a PriceMap,
    rates: TaxRateTable,
    config: OptimizerConfig,
    as_of: NaiveDate,
}

impl<'a> TaxOptimizer<'a> {
    pub fn new(lots: &'a [Lot], prices: &'a PriceMap, rates: TaxRateTable) -> Self {
        Self {
            lots,
            prices,
            rates,
            config: OptimizerConfig::default(),
            as_of: Utc::now().date_naive(),
        }
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    /// Date holding periods are measured to (defaults to today)
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn calculator(&self) -> AllocationCalculator<'a> {
        AllocationCalculator::new(self.prices, self.rates)
            .with_as_of(self.as_of)
            .with_long_term_threshold(self.config.long_term_threshold_days)
    }

    pub fn optimize(&self, target_amount: f64) -> Result<SalePlan> {
        if !(target_amount > 0.0 && target_amount.is_finite()) {
            return Err(OptimizerError::InvalidTarget(target_amount));
        }
        self.rates.validate()?;
        self.config.validate()?;

        let calc = self.calculator();
        let eligible = EligibleLots::build(self.lots, &calc)?;

        if eligible.is_empty() {
            tracing::info!(
                "No eligible lots among {} supplied; returning an empty plan",
                self.lots.len()
            );
            return Ok(SalePlan::new(
                target_amount,
                AllocationBook::new(),
                PlanStrategy::NoEligibleLots,
                vec![OptimizerPhase::Done],
                self.config.proceeds_floor,
            ));
        }

        tracing::info!(
            "Optimizing sale of ${:.2} across {} eligible lots (of {})",
            target_amount,
            eligible.len(),
            self.lots.len()
        );

        let mut phases = Vec::new();
        let mut state = State::Searching;

        let (book, strategy) = loop {
            phases.push(state.phase());
            state = match state {
                State::Searching => {
                    match MixSearch::new(&calc, &self.config).run(&eligible, target_amount) {
                        Some(candidate) => State::Refining(candidate),
                        None => State::Fallback,
                    }
                }
                State::Refining(candidate) => {
                    let refined = Refiner::new(&calc, &self.config, &eligible)
                        .refine(candidate.book, target_amount);
                    let filled = Backfill::new(&calc, &self.config, &eligible)
                        .fill(refined, target_amount);
                    State::Done(
                        filled,
                        PlanStrategy::MixRefined {
                            gain_percent: candidate.gain_percent,
                        },
                    )
                }
                State::Fallback => {
                    tracing::info!("No gain/loss mix reached the target; harvesting losses first");
                    let book = FallbackHarvester::new(&calc).harvest(&eligible, target_amount);
                    State::Done(book, PlanStrategy::Fallback)
                }
                State::Done(book, strategy) => break (book, strategy),
            };
        };

        let plan = SalePlan::new(
            target_amount,
            book,
            strategy,
            phases,
            self.config.proceeds_floor,
        );

        if !plan.meets_floor() {
            tracing::warn!(
                "Plan raises ${:.2} of ${:.2} (shortfall ${:.2})",
                plan.total_proceeds,
                target_amount,
                plan.shortfall()
            );
        }
        tracing::info!(
            "Sale plan: {} lots, proceeds ${:.2}, tax ${:.2} ({:?})",
            plan.allocations.len(),
            plan.total_proceeds,
            plan.total_tax,
            plan.strategy
        );

        Ok(plan)
    }

    /// `(lot_index, shares)` pairs to sell
    pub fn optimize_sales(&self, target_amount: f64) -> Result<Vec<(usize, f64)>> {
        Ok(self.optimize(target_amount)?.sales())
    }
}
