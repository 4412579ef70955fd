use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::KlineError;
use crate::indicators::macd::Crossover;
use crate::indicators::price_movement::PriceMovement;
use crate::indicators::zones::ZoneReport;

pub const MS_IN_MINUTE: i64 = 60_000;

/// One OHLCV bar, field order as served by the exchange
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Kline {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
    pub quote_volume: f64,
    pub trade_count: u64,
    pub taker_buy_base: f64,
    pub taker_buy_quote: f64,
}

impl Kline {
    /// Parse one raw kline row (`[open_time, "open", "high", ...]`).
    ///
    /// Fields past the eleventh (the exchange's "ignore" column) are dropped.
    pub fn from_raw(row: &[Value]) -> Result<Self, KlineError> {
        if row.len() < 11 {
            return Err(KlineError::Malformed(format!(
                "expected at least 11 fields, got {}",
                row.len()
            )));
        }

        Ok(Self {
            open_time: raw_i64(&row[0], "open_time")?,
            open: raw_f64(&row[1], "open")?,
            high: raw_f64(&row[2], "high")?,
            low: raw_f64(&row[3], "low")?,
            close: raw_f64(&row[4], "close")?,
            volume: raw_f64(&row[5], "volume")?,
            close_time: raw_i64(&row[6], "close_time")?,
            quote_volume: raw_f64(&row[7], "quote_volume")?,
            trade_count: raw_i64(&row[8], "trade_count")?.max(0) as u64,
            taker_buy_base: raw_f64(&row[9], "taker_buy_base")?,
            taker_buy_quote: raw_f64(&row[10], "taker_buy_quote")?,
        })
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }
}

fn raw_f64(value: &Value, field: &str) -> Result<f64, KlineError> {
    match value {
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| KlineError::Malformed(format!("{}: {}", field, e))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| KlineError::Malformed(format!("{}: not a float", field))),
        other => Err(KlineError::Malformed(format!("{}: unexpected {}", field, other))),
    }
}

fn raw_i64(value: &Value, field: &str) -> Result<i64, KlineError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| KlineError::Malformed(format!("{}: not an integer", field))),
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|e| KlineError::Malformed(format!("{}: {}", field, e))),
        other => Err(KlineError::Malformed(format!("{}: unexpected {}", field, other))),
    }
}

/// Which of an asset's two series a bar belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Timeframe {
    OneMinute,
    Cover,
}

impl Timeframe {
    pub const ALL: [Timeframe; 2] = [Timeframe::OneMinute, Timeframe::Cover];

    /// Exchange interval label, e.g. "1m" or the configured cover interval
    pub fn interval_label<'a>(&self, cover_interval: &'a str) -> &'a str {
        match self {
            Timeframe::OneMinute => "1m",
            Timeframe::Cover => cover_interval,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::OneMinute => write!(f, "1m"),
            Timeframe::Cover => write!(f, "cover"),
        }
    }
}

/// Identifies one series in the universe
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

/// Convert an exchange interval label ("1m", "15m", "1h", "1d", "1w") to milliseconds
pub fn interval_to_ms(label: &str) -> Option<i64> {
    let label = label.trim();
    if label.len() < 2 {
        return None;
    }
    let (count, unit) = label.split_at(label.len() - 1);
    let count: i64 = count.parse().ok()?;
    if count <= 0 {
        return None;
    }
    let unit_ms = match unit {
        "s" => 1_000,
        "m" => MS_IN_MINUTE,
        "h" => 60 * MS_IN_MINUTE,
        "d" => 24 * 60 * MS_IN_MINUTE,
        "w" => 7 * 24 * 60 * MS_IN_MINUTE,
        _ => return None,
    };
    Some(count * unit_ms)
}

/// A support or resistance price with the number of closes that touched it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Level {
    pub price: f64,
    pub strength: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Demand,
    Supply,
}

/// Price band tied to a structural reversal pattern
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Zone {
    pub kind: ZoneKind,
    pub low: f64,
    pub high: f64,
    /// open_time of the bar that completed the pattern
    pub creation_time: i64,
    pub source_candles: Vec<Kline>,
    /// Only meaningful as of the series it was computed against; see `is_fresh_in`
    pub fresh: bool,
}

impl Zone {
    pub fn new(kind: ZoneKind, low: f64, high: f64, creation_time: i64, source_candles: Vec<Kline>) -> Self {
        Self {
            kind,
            low,
            high,
            creation_time,
            source_candles,
            fresh: true,
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        self.low <= price && price <= self.high
    }

    /// True iff no bar opened after the zone's creation closed inside it
    pub fn is_fresh_in(&self, klines: &[Kline]) -> bool {
        !klines
            .iter()
            .filter(|k| k.open_time > self.creation_time)
            .any(|k| self.contains(k.close))
    }

    /// Recompute freshness against the latest series
    pub fn revalidate(&mut self, klines: &[Kline]) {
        self.fresh = self.is_fresh_in(klines);
    }

    /// touches × touched volume × large-body count, normalized by bars and zone width
    pub fn strength(&self, klines: &[Kline]) -> f64 {
        let width = self.high - self.low;
        if klines.is_empty() || width <= 0.0 {
            return 0.0;
        }

        let mut touches = 0usize;
        let mut touched_volume = 0.0;
        let mut large_bodies = 0usize;

        for k in klines {
            if k.body() > (k.high - k.low) * 0.7 {
                large_bodies += 1;
            }
            if self.contains(k.high) || self.contains(k.low) {
                touches += 1;
                touched_volume += k.volume;
            }
        }

        (touches as f64 * touched_volume * large_bodies as f64) / (klines.len() as f64 * width)
    }

    /// Reward must be at least three times the risk
    pub fn has_valid_risk_to_reward(entry: f64, target: f64, stop_loss: f64) -> bool {
        let risk = (entry - stop_loss).abs();
        let reward = (target - entry).abs();
        risk > 0.0 && reward / risk >= 3.0
    }
}

/// Named nomination predicates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TestId {
    Blacklist,
    Trend,
    SupportResistance,
    Range,
    SrGapPct,
    Volatility,
    ActiveOrders,
}

impl TestId {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestId::Blacklist => "blacklist",
            TestId::Trend => "trend",
            TestId::SupportResistance => "support_resistance",
            TestId::Range => "range",
            TestId::SrGapPct => "sr_gap_pct",
            TestId::Volatility => "volatility",
            TestId::ActiveOrders => "active_orders",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    Passed,
    Failed,
}

impl TestOutcome {
    pub fn from_bool(passed: bool) -> Self {
        if passed {
            TestOutcome::Passed
        } else {
            TestOutcome::Failed
        }
    }

    pub fn passed(&self) -> bool {
        *self == TestOutcome::Passed
    }
}

pub type TestResults = BTreeMap<TestId, TestOutcome>;

/// One nominee produced by a nomination cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NominationResult {
    pub symbol: String,
    pub support_level: f64,
    pub resistance_level: f64,
    pub range_pct: f64,
    pub test_results: TestResults,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
    Market,
}

/// What the core asks the order collaborator to do
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// None for market orders
    pub price: Option<f64>,
    pub amount: f64,
}

pub const ORDER_HANDLE_VERSION: u32 = 1;

/// Order as reported back by the exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderHandle {
    #[serde(default = "order_handle_version")]
    pub version: u32,
    pub id: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "average")]
    pub average_fill_price: Option<f64>,
    #[serde(default, alias = "filled")]
    pub filled_amount: Option<f64>,
}

fn order_handle_version() -> u32 {
    ORDER_HANDLE_VERSION
}

const ORDER_HANDLE_FIELDS: &[&str] = &[
    "version",
    "id",
    "symbol",
    "side",
    "status",
    "average_fill_price",
    "average",
    "filled_amount",
    "filled",
];

impl OrderHandle {
    /// Decode an exchange response; fields we don't model are logged and dropped
    pub fn from_response(value: Value) -> Result<Self, serde_json::Error> {
        if let Value::Object(map) = &value {
            let mut unknown: Vec<&str> = map
                .keys()
                .map(String::as_str)
                .filter(|k| !ORDER_HANDLE_FIELDS.contains(k))
                .collect();
            if !unknown.is_empty() {
                unknown.sort_unstable();
                tracing::debug!("Dropping unknown order fields: {:?}", unknown);
            }
        }
        serde_json::from_value(value)
    }

    /// The exchange is done with this order (filled, cancelled or expired)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("closed" | "filled" | "canceled" | "cancelled" | "expired" | "rejected")
        )
    }

    /// `(average price, amount)` of a completed fill
    pub fn fill(&self) -> Option<(f64, f64)> {
        if !self.is_terminal() {
            return None;
        }
        match (self.average_fill_price, self.filled_amount) {
            (Some(price), Some(amount)) if price > 0.0 && amount > 0.0 => Some((price, amount)),
            _ => None,
        }
    }
}

/// Serializable view of everything the engine knew about a symbol when it was authorized
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub symbol: String,
    pub current_price: f64,
    pub supports: Vec<Level>,
    pub resistances: Vec<Level>,
    pub strongest_support_resistance: Option<(f64, f64)>,
    pub next_support_resistance: Option<(f64, f64)>,
    pub support_resistance_range_pct: f64,
    pub lowest_support: Option<f64>,
    pub zones: ZoneReport,
    pub volatility_factor_1m: Option<f64>,
    pub volatility_factor_cover: Option<f64>,
    pub is_unusual_volatility: bool,
    pub is_uptrend_1m: bool,
    pub is_uptrend_cover: bool,
    pub rsi_1m: Option<f64>,
    pub rsi_cover: Option<f64>,
    pub macd_crossover_1m: Option<Crossover>,
    pub price_movement: PriceMovement,
    pub test_results: TestResults,
    pub captured_at: DateTime<Utc>,
}

/// One completed (or authorized) trade, handed to the trade-log collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub symbol: String,
    pub authorization_time: DateTime<Utc>,
    pub snapshot: SignalSnapshot,
    pub order: Option<OrderHandle>,
    pub pnl: Option<f64>,
}

impl TradeRecord {
    pub fn authorized(snapshot: SignalSnapshot, order: Option<OrderHandle>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: snapshot.symbol.clone(),
            authorization_time: Utc::now(),
            snapshot,
            order,
            pnl: None,
        }
    }

    /// Attach the realized P&L once the sell side has filled
    pub fn with_pnl(mut self, pnl: Option<f64>) -> Self {
        self.pnl = pnl;
        self
    }
}

/// Realized P&L of a buy/sell pair after exchange fees.
///
/// Any unsold remainder is valued at the sell price.
pub fn realized_pnl(
    buy_price: f64,
    buy_amount: f64,
    sell_price: f64,
    sell_amount: f64,
    cost_pct: f64,
) -> f64 {
    let fee = 1.0 - cost_pct / 100.0;
    sell_price * sell_amount * fee - buy_price * buy_amount * fee
        + (buy_amount - sell_amount) * sell_price
}
