use std::collections::HashSet;

use approx::assert_relative_eq;
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::OptimizerConfig;
use crate::error::OptimizerError;
use crate::lot::{Lot, PriceMap, LONG_TERM_THRESHOLD_DAYS};
use crate::optimizer::{OptimizerPhase, PlanStrategy, SalePlan, TaxOptimizer};
use crate::tax_calculator::{TaxJurisdiction, TaxRateTable};

/// Helper: fixed valuation date so holding periods never drift.
fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 7).unwrap()
}

fn long_term() -> NaiveDate {
    as_of() - Duration::days(400)
}

fn short_term() -> NaiveDate {
    as_of() - Duration::days(30)
}

/// Helper: price map from `(symbol, price)` pairs.
fn price_map(entries: &[(&str, f64)]) -> PriceMap {
    entries
        .iter()
        .map(|(symbol, price)| (symbol.to_string(), *price))
        .collect()
}

fn optimize(lots: &[Lot], prices: &PriceMap, target: f64) -> SalePlan {
    TaxOptimizer::new(lots, prices, TaxRateTable::default())
        .with_as_of(as_of())
        .optimize(target)
        .unwrap()
}

/// Helper: mixed portfolio across three priced symbols plus one unpriced lot.
///
/// Priced value is $14,000.
fn mixed_portfolio() -> (Vec<Lot>, PriceMap) {
    let lots = vec![
        Lot::new(0, 10.0, "AAPL", long_term(), 150.0),  // long-term loss
        Lot::new(1, 20.0, "AAPL", long_term(), 80.0),   // long-term gain
        Lot::new(2, 15.0, "MSFT", short_term(), 300.0), // short-term loss
        Lot::new(3, 5.0, "MSFT", long_term(), 200.0),   // long-term gain
        Lot::new(4, 30.0, "TSLA", short_term(), 190.0), // short-term gain
        Lot::new(5, 8.0, "NVDA", long_term(), 100.0),   // no price
    ];
    let prices = price_map(&[("AAPL", 100.0), ("MSFT", 250.0), ("TSLA", 200.0)]);
    (lots, prices)
}

const MIXED_PORTFOLIO_VALUE: f64 = 14_000.0;

// =============================================================================
// Reference scenarios
// =============================================================================

#[test]
fn test_single_loss_lot_sells_to_target() {
    let lots = vec![Lot::new(0, 10.0, "TEST", long_term(), 150.0)];
    let prices = price_map(&[("TEST", 100.0)]);

    let plan = optimize(&lots, &prices, 1000.0);

    assert_eq!(plan.allocations.len(), 1);
    assert_eq!(plan.allocations[0].lot_index, 0);
    assert_relative_eq!(plan.allocations[0].shares, 10.0, epsilon = 1e-9);
    assert_relative_eq!(plan.total_proceeds, 1000.0, epsilon = 1e-9);
    // 10 x (100 - 150) x 0.15
    assert_relative_eq!(plan.total_tax, -75.0, epsilon = 1e-9);
}

#[test]
fn test_loss_lot_offsets_gain_lot() {
    let lots = vec![
        Lot::new(0, 10.0, "TEST", long_term(), 150.0),
        Lot::new(1, 20.0, "TEST", long_term(), 80.0),
    ];
    let prices = price_map(&[("TEST", 100.0)]);

    let plan = optimize(&lots, &prices, 1500.0);

    let indices: HashSet<usize> = plan.allocations.iter().map(|a| a.lot_index).collect();
    assert!(indices.contains(&0));
    assert!(indices.contains(&1));
    assert!(plan.total_tax.abs() < 1.0);
    assert!(plan.meets_floor());
    assert_eq!(plan.strategy, PlanStrategy::MixRefined { gain_percent: 70 });

    // 70% mix (10.5 gain + 4.5 loss shares), then a small gain step and a loss trim
    assert_relative_eq!(plan.allocations[0].shares, 10.5075, epsilon = 1e-9);
    assert_eq!(plan.allocations[0].lot_index, 1);
    assert_relative_eq!(plan.allocations[1].shares, 4.203, epsilon = 1e-9);
    assert_eq!(plan.allocations[1].lot_index, 0);
    assert_relative_eq!(plan.total_proceeds, 1471.05, epsilon = 1e-9);
}

#[test]
fn test_exact_target_from_single_lot() {
    let lots = vec![Lot::new(0, 20.0, "TEST", long_term(), 80.0)];
    let prices = price_map(&[("TEST", 100.0)]);

    let plan = optimize(&lots, &prices, 1000.0);

    assert!((plan.total_proceeds - 1000.0).abs() < 0.01);
    assert_relative_eq!(plan.total_shares(), 10.0, epsilon = 1e-9);
}

#[test]
fn test_target_above_portfolio_sells_everything() {
    let lots = vec![
        Lot::new(0, 20.0, "TEST", long_term(), 150.0),
        Lot::new(1, 20.0, "TEST", long_term(), 80.0),
        Lot::new(2, 15.0, "TEST", short_term(), 120.0),
        Lot::new(3, 15.0, "TEST", short_term(), 90.0),
    ];
    let prices = price_map(&[("TEST", 100.0)]);

    let plan = optimize(&lots, &prices, 10_000.0);

    assert_eq!(plan.strategy, PlanStrategy::Fallback);
    assert_relative_eq!(plan.total_shares(), 70.0, epsilon = 1e-9);
    assert_relative_eq!(plan.total_proceeds, 7000.0, epsilon = 1e-9);
    assert_relative_eq!(plan.shortfall(), 3000.0, epsilon = 1e-9);
    assert!(plan.remaining_lots(&lots).is_empty());
}

// =============================================================================
// Plan invariants over a mixed portfolio
// =============================================================================

#[test]
fn test_never_oversells_a_lot() {
    let (lots, prices) = mixed_portfolio();

    for target in [250.0, 1500.0, 5000.0, 9000.0, 13_000.0, 20_000.0] {
        let plan = optimize(&lots, &prices, target);

        let mut seen = HashSet::new();
        for allocation in &plan.allocations {
            assert!(seen.insert(allocation.lot_index), "lot listed twice at {}", target);
            let lot = &lots[allocation.lot_index];
            assert!(allocation.shares > 0.0);
            assert!(
                allocation.shares <= lot.quantity + 1e-9,
                "lot {} oversold at target {}",
                lot.index,
                target
            );
        }
        assert!(!seen.contains(&5), "unpriced lot sold at {}", target);
        assert!(plan.total_proceeds <= MIXED_PORTFOLIO_VALUE + 1e-6);
    }
}

#[test]
fn test_reachable_targets_meet_floor() {
    let (lots, prices) = mixed_portfolio();

    for target in [250.0, 1500.0, 5000.0, 9000.0, 13_000.0] {
        let plan = optimize(&lots, &prices, target);
        assert!(
            plan.meets_floor(),
            "target {} raised only {}",
            target,
            plan.total_proceeds
        );
        assert!(plan.total_proceeds <= target * 1.05 + 1e-6);
    }
}

/// Helper: check every allocation against an independent proceeds/tax computation.
fn assert_entries_match(lots: &[Lot], prices: &PriceMap, rates: &TaxRateTable, plan: &SalePlan) {
    let mut expected_proceeds = 0.0;
    let mut expected_tax = 0.0;
    for allocation in &plan.allocations {
        let lot = lots
            .iter()
            .find(|lot| lot.index == allocation.lot_index)
            .unwrap();
        let price = prices[&lot.symbol];
        let rate = rates.rate(lot.holding_period(as_of(), LONG_TERM_THRESHOLD_DAYS));
        let proceeds = allocation.shares * price;
        let tax = allocation.shares * (price - lot.cost_basis_per_share) * rate;

        assert_relative_eq!(allocation.proceeds, proceeds, epsilon = 1e-6);
        assert_relative_eq!(allocation.tax, tax, epsilon = 1e-6);
        expected_proceeds += proceeds;
        expected_tax += tax;
    }

    assert_relative_eq!(plan.total_proceeds, expected_proceeds, epsilon = 1e-6);
    assert_relative_eq!(plan.total_tax, expected_tax, epsilon = 1e-6);
    assert_relative_eq!(
        plan.net_proceeds(),
        expected_proceeds - expected_tax,
        epsilon = 1e-6
    );
}

#[test]
fn test_reported_totals_match_allocations() {
    let (lots, prices) = mixed_portfolio();
    let rates = TaxRateTable::default();

    for target in [1500.0, 9000.0, 20_000.0] {
        let plan = optimize(&lots, &prices, target);
        assert_entries_match(&lots, &prices, &rates, &plan);
    }
}

/// Helper: seeded random portfolio over three priced symbols and one unpriced one.
fn random_portfolio(rng: &mut StdRng) -> (Vec<Lot>, PriceMap) {
    let symbols = ["AAA", "BBB", "CCC", "ZZZ"];
    let prices = price_map(&[
        ("AAA", rng.gen_range(10.0..300.0)),
        ("BBB", rng.gen_range(10.0..300.0)),
        ("CCC", rng.gen_range(10.0..300.0)),
    ]);

    let count = rng.gen_range(1..=8);
    let lots = (0..count)
        .map(|index| {
            let symbol = if rng.gen_bool(0.1) {
                symbols[3]
            } else {
                symbols[rng.gen_range(0..3)]
            };
            Lot::new(
                index,
                rng.gen_range(0.5..100.0),
                symbol,
                as_of() - Duration::days(rng.gen_range(1..1500)),
                rng.gen_range(5.0..400.0),
            )
        })
        .collect();

    (lots, prices)
}

#[test]
fn test_random_portfolios_keep_plan_invariants() {
    let mut rng = StdRng::seed_from_u64(42);
    let rates = TaxRateTable::default();

    for _ in 0..200 {
        let (lots, prices) = random_portfolio(&mut rng);
        let value: f64 = lots
            .iter()
            .map(|lot| lot.market_value(prices.get(&lot.symbol).copied().unwrap_or(0.0)))
            .sum();
        if value <= 0.0 {
            continue;
        }

        for fraction in [0.1, 0.5, 0.9, 1.0, 1.3] {
            let target = value * fraction;
            let plan = optimize(&lots, &prices, target);

            let mut seen = HashSet::new();
            for allocation in &plan.allocations {
                assert!(seen.insert(allocation.lot_index));
                let lot = &lots[allocation.lot_index];
                assert!(allocation.shares > 0.0);
                assert!(allocation.shares <= lot.quantity + 1e-9);
                assert!(prices.contains_key(&lot.symbol));
            }
            assert_entries_match(&lots, &prices, &rates, &plan);
            assert!(plan.total_proceeds <= value + 1e-6);

            if target <= value {
                assert!(
                    plan.meets_floor(),
                    "raised {} of {} from a ${} portfolio",
                    plan.total_proceeds,
                    target,
                    value
                );
                assert!(plan.total_proceeds <= target * 1.05 + 1e-6);
            } else {
                assert_relative_eq!(plan.total_proceeds, value, epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn test_repeated_runs_are_identical() {
    let (lots, prices) = mixed_portfolio();

    for target in [1500.0, 9000.0, 20_000.0] {
        let first = optimize(&lots, &prices, target);
        let second = optimize(&lots, &prices, target);
        assert_eq!(first, second);
    }
}

// =============================================================================
// Selection behaviour
// =============================================================================

#[test]
fn test_prefers_long_term_gains() {
    let lots = vec![
        Lot::new(2, 20.0, "TEST", long_term(), 80.0),  // 3.00 tax per share
        Lot::new(3, 20.0, "TEST", short_term(), 80.0), // 7.00 tax per share
    ];
    let prices = price_map(&[("TEST", 100.0)]);

    let plan = optimize(&lots, &prices, 1500.0);

    assert_eq!(plan.sales().len(), 1);
    assert_eq!(plan.allocations[0].lot_index, 2);
    assert_relative_eq!(plan.allocations[0].shares, 15.0, epsilon = 1e-9);
}

#[test]
fn test_partial_sale_leaves_remainder() {
    let lots = vec![Lot::new(0, 10.0, "TEST", long_term(), 80.0)];
    let prices = price_map(&[("TEST", 100.0)]);

    let plan = optimize(&lots, &prices, 250.0);
    assert_relative_eq!(plan.total_shares(), 2.5, epsilon = 1e-9);

    let remaining = plan.remaining_lots(&lots);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].index, 0);
    assert_relative_eq!(remaining[0].quantity, 7.5, epsilon = 1e-9);
    assert_eq!(remaining[0].cost_basis_per_share, 80.0);
}

#[test]
fn test_jurisdiction_rates_apply() {
    let lots = vec![Lot::new(0, 10.0, "TEST", long_term(), 80.0)];
    let prices = price_map(&[("TEST", 100.0)]);

    let plan = TaxOptimizer::new(&lots, &prices, TaxRateTable::for_jurisdiction(TaxJurisdiction::UK))
        .with_as_of(as_of())
        .optimize(1000.0)
        .unwrap();

    assert_relative_eq!(plan.total_shares(), 10.0, epsilon = 1e-9);
    // 10 x 20 x 0.20
    assert_relative_eq!(plan.total_tax, 40.0, epsilon = 1e-9);
}

#[test]
fn test_custom_holding_threshold() {
    // Held 400 days: long-term by default, short-term under a two-year rule
    let lots = vec![Lot::new(0, 10.0, "TEST", long_term(), 80.0)];
    let prices = price_map(&[("TEST", 100.0)]);
    let config = OptimizerConfig {
        long_term_threshold_days: 730,
        ..OptimizerConfig::default()
    };

    let plan = TaxOptimizer::new(&lots, &prices, TaxRateTable::default())
        .with_config(config)
        .with_as_of(as_of())
        .optimize(1000.0)
        .unwrap();

    // 10 x 20 x 0.35
    assert_relative_eq!(plan.total_tax, 70.0, epsilon = 1e-9);
}

#[test]
fn test_skips_degenerate_and_unpriced_lots() {
    let lots = vec![
        Lot::new(0, 0.0, "TEST", long_term(), 80.0),
        Lot::new(1, 10.0, "NONE", long_term(), 80.0),
        Lot::new(2, 10.0, "TEST", long_term(), 0.0),
        Lot::new(3, 10.0, "TEST", long_term(), 90.0),
    ];
    let prices = price_map(&[("TEST", 100.0), ("NONE", 0.0)]);

    let plan = optimize(&lots, &prices, 500.0);

    assert!(plan.allocations.iter().all(|a| a.lot_index == 3));
    assert!(plan.meets_floor());
}

// =============================================================================
// Empty inputs and errors
// =============================================================================

#[test]
fn test_empty_portfolio_returns_empty_plan() {
    let prices = price_map(&[("TEST", 100.0)]);
    let plan = optimize(&[], &prices, 1000.0);

    assert!(plan.is_empty());
    assert_eq!(plan.strategy, PlanStrategy::NoEligibleLots);
    assert_eq!(plan.phases, vec![OptimizerPhase::Done]);
    assert_eq!(plan.total_proceeds, 0.0);
    assert_eq!(plan.shortfall(), 1000.0);
}

#[test]
fn test_unpriced_portfolio_returns_empty_plan() {
    let lots = vec![Lot::new(0, 10.0, "TEST", long_term(), 80.0)];
    let plan = optimize(&lots, &PriceMap::new(), 1000.0);

    assert!(plan.is_empty());
    assert_eq!(plan.remaining_lots(&lots), lots);
}

#[test]
fn test_duplicate_lot_index_is_rejected() {
    let lots = vec![
        Lot::new(7, 10.0, "TEST", long_term(), 80.0),
        Lot::new(7, 5.0, "TEST", short_term(), 120.0),
    ];
    let prices = price_map(&[("TEST", 100.0)]);

    let result = TaxOptimizer::new(&lots, &prices, TaxRateTable::default()).optimize(500.0);
    assert_eq!(result, Err(OptimizerError::DuplicateLotIndex(7)));
}

#[test]
fn test_optimize_sales_pairs() {
    let lots = vec![Lot::new(4, 10.0, "TEST", long_term(), 150.0)];
    let prices = price_map(&[("TEST", 100.0)]);

    let sales = TaxOptimizer::new(&lots, &prices, TaxRateTable::default())
        .with_as_of(as_of())
        .optimize_sales(1000.0)
        .unwrap();

    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].0, 4);
    assert_relative_eq!(sales[0].1, 10.0, epsilon = 1e-9);

    assert!(TaxOptimizer::new(&lots, &prices, TaxRateTable::default())
        .optimize_sales(-1.0)
        .is_err());
}
