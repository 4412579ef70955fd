use chrono::Utc;

use crate::config::SignalConfig;
use crate::error::SignalError;
use crate::indicators::macd::{macd_crossover, Crossover};
use crate::indicators::moving_average::is_uptrend;
use crate::indicators::price_movement::PriceMovement;
use crate::indicators::rsi::calculate_rsi;
use crate::indicators::support_resistance::{
    find_support_resistance, lowest_support, next_support_resistance,
    strongest_support_resistance, support_resistance_range_pct,
};
use crate::indicators::zones::ZoneReport;
use crate::models::{Level, SignalSnapshot, TestResults, Timeframe};
use crate::universe::Asset;

pub const RSI_PERIOD: usize = 14;

/// Everything nomination needs about one asset, computed from a single snapshot
#[derive(Debug, Clone)]
pub struct AssetSignals {
    pub symbol: String,
    pub current_price: f64,
    pub last_volume: f64,
    pub tick_size: f64,
    pub min_qty: f64,
    pub blacklisted: bool,
    pub supports: Vec<Level>,
    pub resistances: Vec<Level>,
    /// Set when levels could not be computed; every level-derived field is then absent
    pub level_error: Option<SignalError>,
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
}

impl AssetSignals {
    /// Derive signals from an asset snapshot. Levels come from the 1m series,
    /// zones from the cover series.
    pub fn compute(asset: &Asset, config: &SignalConfig) -> Self {
        let klines_1m = asset.klines_1m.klines();
        let klines_cover = asset.klines_cover.klines();
        let closes_1m = asset.klines_1m.closes();
        let closes_cover = asset.klines_cover.closes();

        let (supports, resistances, level_error) = match find_support_resistance(
            klines_1m,
            Timeframe::OneMinute,
            config.support_closeness_threshold_pct,
            config.resistance_closeness_threshold_pct,
        ) {
            Ok((supports, resistances)) => (supports, resistances, None),
            Err(e) => {
                tracing::debug!(symbol = %asset.symbol, "Levels unavailable: {}", e);
                (Vec::new(), Vec::new(), Some(e))
            }
        };

        let next = next_support_resistance(&supports, &resistances);

        Self {
            symbol: asset.symbol.clone(),
            current_price: asset.current_price,
            last_volume: asset.last_volume,
            tick_size: asset.tick_size,
            min_qty: asset.min_qty,
            blacklisted: asset.blacklisted,
            strongest_support_resistance: strongest_support_resistance(&supports, &resistances),
            next_support_resistance: next,
            support_resistance_range_pct: support_resistance_range_pct(next),
            lowest_support: lowest_support(&supports),
            supports,
            resistances,
            level_error,
            zones: ZoneReport::compute(klines_cover, config.base_candle_count),
            volatility_factor_1m: asset.volatility_factor(Timeframe::OneMinute),
            volatility_factor_cover: asset.volatility_factor(Timeframe::Cover),
            is_unusual_volatility: asset.is_unusual_volatility,
            is_uptrend_1m: is_uptrend(&closes_1m, config.short_ma_period, config.long_ma_period),
            is_uptrend_cover: is_uptrend(
                &closes_cover,
                config.short_ma_period,
                config.long_ma_period,
            ),
            rsi_1m: calculate_rsi(&closes_1m, RSI_PERIOD),
            rsi_cover: calculate_rsi(&closes_cover, RSI_PERIOD),
            macd_crossover_1m: macd_crossover(&closes_1m),
            price_movement: asset.price_movement,
        }
    }

    /// Serializable record of these signals for the trade log
    pub fn snapshot(&self, test_results: TestResults) -> SignalSnapshot {
        SignalSnapshot {
            symbol: self.symbol.clone(),
            current_price: self.current_price,
            supports: self.supports.clone(),
            resistances: self.resistances.clone(),
            strongest_support_resistance: self.strongest_support_resistance,
            next_support_resistance: self.next_support_resistance,
            support_resistance_range_pct: self.support_resistance_range_pct,
            lowest_support: self.lowest_support,
            zones: self.zones.clone(),
            volatility_factor_1m: self.volatility_factor_1m,
            volatility_factor_cover: self.volatility_factor_cover,
            is_unusual_volatility: self.is_unusual_volatility,
            is_uptrend_1m: self.is_uptrend_1m,
            is_uptrend_cover: self.is_uptrend_cover,
            rsi_1m: self.rsi_1m,
            rsi_cover: self.rsi_cover,
            macd_crossover_1m: self.macd_crossover_1m,
            price_movement: self.price_movement,
            test_results,
            captured_at: Utc::now(),
        }
    }
}
