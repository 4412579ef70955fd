pub mod validator;

use std::sync::Arc;
use tokio::task::JoinSet;

use crate::api::MarketDataSource;
use crate::config::MarketConfig;
use crate::error::{KlineError, MarketDataError};
use crate::execution::kline_store::Series;
use crate::models::{Kline, SeriesKey, Timeframe};
use crate::universe::Universe;

pub use validator::KlineValidator;

/// Statistics from a backfill operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillStats {
    pub requested_series: usize,
    pub fetched_klines: usize,
    pub swapped_series: usize,
    pub fetch_failures: usize,
    pub validation_failures: usize,
}

enum SeriesOutcome {
    Swapped { klines: usize },
    FetchFailed,
    Invalid,
}

/// Fetch both series of every asset concurrently and swap each one in whole.
///
/// A series that fails to fetch or validate keeps its previous contents.
/// Once every task is joined, each asset's `last_volume` is recomputed.
pub async fn backfill_universe(
    source: Arc<dyn MarketDataSource>,
    universe: &Universe,
    market: &MarketConfig,
) -> BackfillStats {
    let symbols = universe.symbols();
    tracing::info!(
        "Backfilling {} symbols ({} bars of 1m and {})",
        symbols.len(),
        market.kline_limit,
        market.cover_interval
    );

    let mut stats = BackfillStats::default();
    let mut tasks = JoinSet::new();

    for symbol in symbols {
        for timeframe in Timeframe::ALL {
            let key = SeriesKey::new(symbol.clone(), timeframe);
            let interval = timeframe.interval_label(&market.cover_interval).to_string();
            let interval_ms = market.interval_ms(timeframe);
            let limit = market.kline_limit;
            let source = source.clone();
            let universe = universe.clone();

            stats.requested_series += 1;
            tasks.spawn(async move {
                backfill_series(source, &universe, key, &interval, interval_ms, limit).await
            });
        }
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(SeriesOutcome::Swapped { klines }) => {
                stats.swapped_series += 1;
                stats.fetched_klines += klines;
            }
            Ok(SeriesOutcome::FetchFailed) => stats.fetch_failures += 1,
            Ok(SeriesOutcome::Invalid) => stats.validation_failures += 1,
            Err(e) => {
                tracing::error!("Backfill task failed: {}", e);
                stats.fetch_failures += 1;
            }
        }
    }

    universe.refresh_last_volumes();

    tracing::info!(
        "✓ Backfill complete: {}/{} series swapped ({} klines, {} fetch failures, {} invalid)",
        stats.swapped_series,
        stats.requested_series,
        stats.fetched_klines,
        stats.fetch_failures,
        stats.validation_failures
    );

    stats
}

async fn backfill_series(
    source: Arc<dyn MarketDataSource>,
    universe: &Universe,
    key: SeriesKey,
    interval: &str,
    interval_ms: i64,
    limit: usize,
) -> SeriesOutcome {
    let klines = match source.fetch_historical_bars(&key.symbol, interval, limit).await {
        Ok(klines) => klines,
        Err(e) => {
            tracing::warn!(series = %key, "Fetch failed, keeping previous series: {}", e);
            return SeriesOutcome::FetchFailed;
        }
    };

    match build_series(klines, limit, interval_ms).and_then(|series| {
        let count = series.len();
        universe.swap_series(&key, series).map(|_| count)
    }) {
        Ok(count) => {
            tracing::debug!(series = %key, "Swapped in {} klines", count);
            SeriesOutcome::Swapped { klines: count }
        }
        Err(e) => {
            tracing::warn!(series = %key, "Rejected fetched series: {}", e);
            SeriesOutcome::Invalid
        }
    }
}

fn build_series(klines: Vec<Kline>, limit: usize, interval_ms: i64) -> Result<Series, KlineError> {
    if klines.is_empty() {
        return Err(KlineError::EmptySeries);
    }
    KlineValidator::new().validate_series(&klines)?;
    Series::from_klines(klines, limit, interval_ms)
}

/// Fetch one series without touching the universe
pub async fn fetch_series(
    source: &dyn MarketDataSource,
    symbol: &str,
    interval: &str,
    interval_ms: i64,
    limit: usize,
) -> Result<Series, MarketDataError> {
    let klines = source.fetch_historical_bars(symbol, interval, limit).await?;
    Ok(build_series(klines, limit, interval_ms)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AssetInfo;
    use crate::config::BotConfig;
    use crate::models::MS_IN_MINUTE;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Serves a fixed rising series for every symbol except `broken`
    struct FakeSource {
        broken: &'static str,
    }

    fn klines(count: usize, interval_ms: i64, volume: f64) -> Vec<Kline> {
        (0..count)
            .map(|i| {
                let open_time = i as i64 * interval_ms;
                let price = 10.0 + i as f64;
                Kline {
                    open_time,
                    open: price,
                    high: price + 1.0,
                    low: price - 0.5,
                    close: price + 0.5,
                    volume,
                    close_time: open_time + interval_ms - 1,
                    quote_volume: 0.0,
                    trade_count: 1,
                    taker_buy_base: 0.0,
                    taker_buy_quote: 0.0,
                }
            })
            .collect()
    }

    #[async_trait]
    impl MarketDataSource for FakeSource {
        async fn fetch_recent_prices(&self) -> Result<HashMap<String, f64>, MarketDataError> {
            Ok(HashMap::new())
        }

        async fn fetch_historical_bars(
            &self,
            symbol: &str,
            interval: &str,
            limit: usize,
        ) -> Result<Vec<Kline>, MarketDataError> {
            if symbol == self.broken {
                return Err(MarketDataError::Api {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            let interval_ms = crate::models::interval_to_ms(interval).unwrap_or(MS_IN_MINUTE);
            Ok(klines(limit.min(30), interval_ms, 2.0))
        }

        async fn fetch_universe(&self, _quote_asset: &str) -> Result<Vec<AssetInfo>, MarketDataError> {
            Ok(vec![])
        }
    }

    fn info(symbol: &str, price: f64) -> AssetInfo {
        AssetInfo {
            symbol: symbol.to_string(),
            base_asset: symbol.trim_end_matches("USDT").to_string(),
            quote_asset: "USDT".to_string(),
            tick_size: 0.01,
            min_qty: 0.001,
            opening_price: price,
            current_price: price,
            quote_volume: 0.0,
        }
    }

    #[tokio::test]
    async fn test_backfill_swaps_series_and_refreshes_volume() {
        let config = BotConfig::default();
        let universe = Universe::from_infos(vec![info("AUSDT", 3.0), info("BUSDT", 4.0)], &config);
        let source: Arc<dyn MarketDataSource> = Arc::new(FakeSource { broken: "" });

        let stats = backfill_universe(source, &universe, &config.market).await;

        assert_eq!(stats.requested_series, 4);
        assert_eq!(stats.swapped_series, 4);
        assert_eq!(stats.fetched_klines, 120);

        let a = universe.get("AUSDT").unwrap();
        assert_eq!(a.klines_1m.len(), 30);
        assert_eq!(a.klines_cover.len(), 30);
        assert_eq!(a.klines_cover.interval_ms(), 15 * MS_IN_MINUTE);
        // last cover volume 2.0 at price 3.0
        assert_eq!(a.last_volume, 6.0);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_series() {
        let config = BotConfig::default();
        let universe = Universe::from_infos(vec![info("AUSDT", 3.0), info("BUSDT", 4.0)], &config);
        let source: Arc<dyn MarketDataSource> = Arc::new(FakeSource { broken: "BUSDT" });

        let stats = backfill_universe(source, &universe, &config.market).await;

        assert_eq!(stats.swapped_series, 2);
        assert_eq!(stats.fetch_failures, 2);
        assert!(universe.get("BUSDT").unwrap().klines_1m.is_empty());
        assert_eq!(universe.get("AUSDT").unwrap().klines_1m.len(), 30);
    }

    #[test]
    fn test_build_series_rejects_invalid_and_empty() {
        assert_eq!(build_series(vec![], 10, MS_IN_MINUTE).unwrap_err(), KlineError::EmptySeries);

        let mut bad = klines(3, MS_IN_MINUTE, 1.0);
        bad[1].high = 0.0;
        assert!(build_series(bad, 10, MS_IN_MINUTE).is_err());

        let series = build_series(klines(12, MS_IN_MINUTE, 1.0), 10, MS_IN_MINUTE).unwrap();
        assert_eq!(series.len(), 10);
    }

    #[tokio::test]
    async fn test_fetch_series_propagates_source_errors() {
        let source = FakeSource { broken: "AUSDT" };
        let result = fetch_series(&source, "AUSDT", "1m", MS_IN_MINUTE, 10).await;
        assert!(matches!(result, Err(MarketDataError::Api { status: 500, .. })));
    }
}
