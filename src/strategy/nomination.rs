use std::cmp::Ordering;
use std::collections::HashSet;

use super::signals::AssetSignals;
use super::TradingStrategy;
use crate::config::SignalConfig;
use crate::indicators::volatility::in_band;
use crate::models::{NominationResult, TestId, TestOutcome, TestResults};
use crate::universe::Universe;

/// What a predicate may look at besides the asset's own signals
pub struct TestContext<'a> {
    pub config: &'a SignalConfig,
    pub active_orders: &'a HashSet<String>,
}

pub type Predicate = fn(&AssetSignals, &TestContext<'_>) -> bool;

/// Ordered list of named nomination predicates
pub struct TestRegistry {
    tests: Vec<(TestId, Predicate)>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self { tests: Vec::new() }
    }

    /// Every built-in test, in evaluation order
    pub fn standard() -> Self {
        Self::new()
            .with(TestId::Blacklist, test_blacklist)
            .with(TestId::Trend, test_trend)
            .with(TestId::SupportResistance, test_support_resistance)
            .with(TestId::Range, test_range)
            .with(TestId::SrGapPct, test_sr_gap_pct)
            .with(TestId::Volatility, test_volatility)
            .with(TestId::ActiveOrders, test_active_orders)
    }

    pub fn with(mut self, id: TestId, predicate: Predicate) -> Self {
        self.tests.push((id, predicate));
        self
    }

    pub fn ids(&self) -> impl Iterator<Item = TestId> + '_ {
        self.tests.iter().map(|(id, _)| *id)
    }

    /// Run every registered test
    pub fn evaluate(&self, signals: &AssetSignals, ctx: &TestContext<'_>) -> TestResults {
        self.tests
            .iter()
            .map(|(id, predicate)| (*id, TestOutcome::from_bool(predicate(signals, ctx))))
            .collect()
    }
}

impl Default for TestRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn test_blacklist(signals: &AssetSignals, ctx: &TestContext<'_>) -> bool {
    !signals.blacklisted && !ctx.config.blacklist.iter().any(|s| *s == signals.symbol)
}

fn test_trend(signals: &AssetSignals, _ctx: &TestContext<'_>) -> bool {
    signals.is_uptrend_1m && signals.is_uptrend_cover
}

/// Price strictly inside the next channel and above the support floor
fn test_support_resistance(signals: &AssetSignals, _ctx: &TestContext<'_>) -> bool {
    match (signals.next_support_resistance, signals.lowest_support) {
        (Some((support, resistance)), Some(lowest)) => {
            let price = signals.current_price;
            lowest < support && support < price && price < resistance
        }
        _ => false,
    }
}

fn test_range(signals: &AssetSignals, _ctx: &TestContext<'_>) -> bool {
    !signals.is_unusual_volatility
}

fn test_sr_gap_pct(signals: &AssetSignals, ctx: &TestContext<'_>) -> bool {
    signals.support_resistance_range_pct >= ctx.config.min_sr_gap_pct
}

fn test_volatility(signals: &AssetSignals, ctx: &TestContext<'_>) -> bool {
    let bands = &ctx.config.volatility;
    match (signals.volatility_factor_1m, signals.volatility_factor_cover) {
        (Some(one_m), Some(cover)) => {
            in_band(one_m, bands.one_m_low, bands.one_m_high)
                && in_band(cover, bands.one_h_low, bands.one_h_high)
        }
        _ => false,
    }
}

fn test_active_orders(signals: &AssetSignals, ctx: &TestContext<'_>) -> bool {
    !ctx.active_orders.contains(&signals.symbol)
}

/// Output of one nomination pass
#[derive(Debug, Clone, Default)]
pub struct NominationCycle {
    /// Highest volume first
    pub nominees: Vec<NominationResult>,
    /// Test results of every evaluated symbol, nominated or not
    pub results: Vec<(String, TestResults)>,
}

pub struct NominationEngine {
    registry: TestRegistry,
    config: SignalConfig,
}

impl NominationEngine {
    pub fn new(config: SignalConfig) -> Self {
        Self::with_registry(TestRegistry::standard(), config)
    }

    pub fn with_registry(registry: TestRegistry, config: SignalConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    pub fn evaluate(&self, signals: &AssetSignals, active_orders: &HashSet<String>) -> TestResults {
        let ctx = TestContext {
            config: &self.config,
            active_orders,
        };
        self.registry.evaluate(signals, &ctx)
    }

    /// Evaluate every symbol and keep those passing all of the strategy's tests
    pub fn nominate(
        &self,
        strategy: TradingStrategy,
        signals: &[AssetSignals],
        active_orders: &HashSet<String>,
    ) -> NominationCycle {
        let mut ordered: Vec<&AssetSignals> = signals.iter().collect();
        ordered.sort_by(|a, b| {
            b.last_volume
                .partial_cmp(&a.last_volume)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });

        let required = strategy.required_tests();
        let mut cycle = NominationCycle::default();

        for s in ordered {
            let results = self.evaluate(s, active_orders);

            let nominated = required.is_some_and(|tests| {
                tests
                    .iter()
                    .all(|id| results.get(id).is_some_and(TestOutcome::passed))
            });

            if nominated {
                let (support_level, resistance_level) = s.next_support_resistance.unwrap_or((0.0, 0.0));
                cycle.nominees.push(NominationResult {
                    symbol: s.symbol.clone(),
                    support_level,
                    resistance_level,
                    range_pct: s.support_resistance_range_pct,
                    test_results: results.clone(),
                });
            }
            cycle.results.push((s.symbol.clone(), results));
        }

        cycle
    }

    /// Snapshot the universe, nominate, and write each symbol's results back.
    ///
    /// Returns the nominees paired with the signals they were chosen on.
    pub fn run_cycle(
        &self,
        universe: &Universe,
        strategy: TradingStrategy,
        active_orders: &HashSet<String>,
    ) -> Vec<(NominationResult, AssetSignals)> {
        let signals: Vec<AssetSignals> = universe
            .snapshot()
            .iter()
            .map(|asset| AssetSignals::compute(asset, &self.config))
            .collect();

        let cycle = self.nominate(strategy, &signals, active_orders);

        for (symbol, results) in cycle.results {
            universe.set_test_results(&symbol, results);
        }

        cycle
            .nominees
            .into_iter()
            .filter_map(|nominee| {
                let s = signals.iter().find(|s| s.symbol == nominee.symbol)?.clone();
                Some((nominee, s))
            })
            .collect()
    }
}
