// Bot configuration
// Layered: built-in defaults < optional TOML file < SRBOT__* environment

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::execution::kline_store::{DEFAULT_CAPACITY, MAX_CAPACITY};
use crate::models::{interval_to_ms, Timeframe, MS_IN_MINUTE};
use crate::strategy::TradingStrategy;

pub const ENV_PREFIX: &str = "SRBOT";
pub const ENV_SEPARATOR: &str = "__";
/// Looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "srbot";
/// Upper bound on order placement attempts before the market fallback
pub const MAX_ORDER_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub market: MarketConfig,
    pub signals: SignalConfig,
    pub trading: TradingConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub base_url: String,
    pub quote_asset: String,
    /// Exchange interval label of the longer series
    pub cover_interval: String,
    /// Bars kept per series, clamped to the exchange fetch limit
    pub kline_limit: usize,
    pub universe_limit: Option<usize>,
    pub requests_per_minute: u32,
    /// symbol -> tags; assets tagged `stablecoin` are never loaded
    pub asset_tags: HashMap<String, Vec<String>>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            quote_asset: "USDT".to_string(),
            cover_interval: "15m".to_string(),
            kline_limit: DEFAULT_CAPACITY,
            universe_limit: None,
            requests_per_minute: 1200,
            asset_tags: HashMap::new(),
        }
    }
}

impl MarketConfig {
    /// Cover bar length; `validated` rejects labels this can't parse
    pub fn cover_interval_ms(&self) -> i64 {
        interval_to_ms(&self.cover_interval).unwrap_or(15 * MS_IN_MINUTE)
    }

    pub fn interval_ms(&self, timeframe: Timeframe) -> i64 {
        match timeframe {
            Timeframe::OneMinute => MS_IN_MINUTE,
            Timeframe::Cover => self.cover_interval_ms(),
        }
    }
}

/// Volatility factor bands, in percent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolatilityBands {
    pub one_m_low: f64,
    pub one_m_high: f64,
    pub one_h_low: f64,
    pub one_h_high: f64,
}

impl Default for VolatilityBands {
    fn default() -> Self {
        Self {
            one_m_low: 2.0,
            one_m_high: 10.0,
            one_h_low: 5.0,
            one_h_high: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub support_closeness_threshold_pct: f64,
    pub resistance_closeness_threshold_pct: f64,
    pub min_sr_gap_pct: f64,
    pub volatility: VolatilityBands,
    pub outlier_zscore_threshold: f64,
    pub base_candle_count: usize,
    pub short_ma_period: usize,
    pub long_ma_period: usize,
    pub blacklist: Vec<String>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            support_closeness_threshold_pct: 0.5,
            resistance_closeness_threshold_pct: 0.5,
            min_sr_gap_pct: 1.0,
            volatility: VolatilityBands::default(),
            outlier_zscore_threshold: 2.0,
            base_candle_count: 3,
            short_ma_period: 5,
            long_ma_period: 20,
            blacklist: vec!["OMUSDT".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub strategy: TradingStrategy,
    pub flash_pct: f64,
    /// Quote spent per order
    pub order_quote_amount: f64,
    /// Stop placing once this much quote is committed
    pub max_quote_to_place: f64,
    pub exchange_cost_pct: f64,
    pub dry_run: bool,
    pub dry_run_balance: f64,
    pub order_max_attempts: u32,
    pub order_initial_backoff_ms: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            strategy: TradingStrategy::Suspend,
            flash_pct: 0.1,
            order_quote_amount: 10.0,
            max_quote_to_place: 15.0,
            exchange_cost_pct: 0.1,
            dry_run: true,
            dry_run_balance: 100.0,
            order_max_attempts: 3,
            order_initial_backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub price_update_interval_secs: u64,
    pub nomination_interval_secs: u64,
    pub kline_refresh_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            price_update_interval_secs: 1,
            nomination_interval_secs: 60,
            kline_refresh_interval_secs: 1800,
        }
    }
}

impl BotConfig {
    /// Load `path` (or `srbot.toml` if present) and overlay `SRBOT__SECTION__KEY` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .list_separator(",")
                    .with_list_parse_key("signals.blacklist")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let config: BotConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validated()
    }

    /// Clamp and sanity-check values that would otherwise break the loops
    pub fn validated(mut self) -> Result<Self> {
        let limit = self.market.kline_limit.clamp(1, MAX_CAPACITY);
        if limit != self.market.kline_limit {
            tracing::warn!(
                "kline_limit {} out of range, using {}",
                self.market.kline_limit,
                limit
            );
            self.market.kline_limit = limit;
        }

        if interval_to_ms(&self.market.cover_interval).is_none() {
            anyhow::bail!("Unsupported cover interval: {}", self.market.cover_interval);
        }
        if self.signals.short_ma_period >= self.signals.long_ma_period {
            anyhow::bail!(
                "short_ma_period ({}) must be below long_ma_period ({})",
                self.signals.short_ma_period,
                self.signals.long_ma_period
            );
        }
        if self.trading.order_max_attempts == 0 {
            anyhow::bail!("order_max_attempts must be at least 1");
        }
        if self.trading.order_max_attempts > MAX_ORDER_ATTEMPTS {
            tracing::warn!(
                "order_max_attempts {} above limit, using {}",
                self.trading.order_max_attempts,
                MAX_ORDER_ATTEMPTS
            );
            self.trading.order_max_attempts = MAX_ORDER_ATTEMPTS;
        }

        // Symbols are upper case on the exchange; config keys may arrive folded
        self.market.asset_tags = self
            .market
            .asset_tags
            .into_iter()
            .map(|(symbol, tags)| (symbol.to_uppercase(), tags))
            .collect();
        for symbol in &mut self.signals.blacklist {
            *symbol = symbol.trim().to_uppercase();
        }
        self.market.quote_asset = self.market.quote_asset.to_uppercase();

        self.schedule.price_update_interval_secs = self.schedule.price_update_interval_secs.max(1);
        self.schedule.nomination_interval_secs = self.schedule.nomination_interval_secs.max(1);
        self.schedule.kline_refresh_interval_secs = self.schedule.kline_refresh_interval_secs.max(1);

        Ok(self)
    }

    /// Tags configured for a symbol
    pub fn tags_for(&self, symbol: &str) -> &[String] {
        self.market
            .asset_tags
            .get(symbol)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_blacklisted(&self, symbol: &str) -> bool {
        self.signals.blacklist.iter().any(|s| s == symbol)
    }
}
