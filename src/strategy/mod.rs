// Trading strategy module
pub mod nomination;
pub mod order_plan;
pub mod signals;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::TestId;

pub use nomination::{NominationCycle, NominationEngine, TestRegistry};
pub use order_plan::OrderPlan;
pub use signals::AssetSignals;

/// Which nomination tests must all pass before a symbol is traded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TradingStrategy {
    /// Exercise the order path on anything without a live order
    Test,
    /// Price inside the nearest support/resistance channel, all filters on
    SupportResistance,
    /// Quick scalp on trending symbols
    Flash,
    /// Evaluate and report, never nominate
    #[default]
    Suspend,
}

const TEST_TESTS: &[TestId] = &[TestId::ActiveOrders];
const SUPPORT_RESISTANCE_TESTS: &[TestId] = &[
    TestId::Blacklist,
    TestId::Trend,
    TestId::SupportResistance,
    TestId::Range,
    TestId::SrGapPct,
    TestId::Volatility,
    TestId::ActiveOrders,
];
const FLASH_TESTS: &[TestId] = &[TestId::Trend, TestId::ActiveOrders];

impl TradingStrategy {
    /// Tests that must all pass; None means nothing is nominated
    pub fn required_tests(&self) -> Option<&'static [TestId]> {
        match self {
            TradingStrategy::Test => Some(TEST_TESTS),
            TradingStrategy::SupportResistance => Some(SUPPORT_RESISTANCE_TESTS),
            TradingStrategy::Flash => Some(FLASH_TESTS),
            TradingStrategy::Suspend => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradingStrategy::Test => "test",
            TradingStrategy::SupportResistance => "support_resistance",
            TradingStrategy::Flash => "flash",
            TradingStrategy::Suspend => "suspend",
        }
    }
}

impl fmt::Display for TradingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "test" => Ok(TradingStrategy::Test),
            "support_resistance" => Ok(TradingStrategy::SupportResistance),
            "flash" => Ok(TradingStrategy::Flash),
            "suspend" => Ok(TradingStrategy::Suspend),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}
