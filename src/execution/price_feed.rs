use chrono::Utc;
use std::sync::Arc;

use crate::api::MarketDataSource;
use crate::error::MarketDataError;
use crate::universe::Universe;

/// Result of one price poll
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestStats {
    pub received: usize,
    pub updated: usize,
    pub unusual: Vec<String>,
}

/// Polls bulk prices into the universe, then re-flags volatility outliers
pub struct PriceFeed {
    source: Arc<dyn MarketDataSource>,
    universe: Universe,
    zscore_threshold: f64,
}

impl PriceFeed {
    pub fn new(source: Arc<dyn MarketDataSource>, universe: Universe, zscore_threshold: f64) -> Self {
        Self {
            source,
            universe,
            zscore_threshold,
        }
    }

    /// Poll once at the current wall-clock time
    pub async fn ingest(&self) -> Result<IngestStats, MarketDataError> {
        self.ingest_at(Utc::now().timestamp_millis()).await
    }

    /// Poll once, stamping every tick with `now_ms`.
    ///
    /// On a fetch error nothing is written and the universe keeps its state.
    /// Outliers are recomputed only after every tick of the poll is applied.
    pub async fn ingest_at(&self, now_ms: i64) -> Result<IngestStats, MarketDataError> {
        let prices = self.source.fetch_recent_prices().await?;
        let updated = self.universe.apply_prices(&prices, now_ms);
        let unusual = self.universe.refresh_unusual_volatility(self.zscore_threshold);

        if !unusual.is_empty() {
            tracing::debug!("Unusual volatility: {:?}", unusual);
        }
        tracing::trace!(
            received = prices.len(),
            updated,
            "Applied price poll"
        );

        Ok(IngestStats {
            received: prices.len(),
            updated,
            unusual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AssetInfo;
    use crate::execution::kline_store::Series;
    use crate::models::{Kline, SeriesKey, Timeframe, MS_IN_MINUTE};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ScriptedPrices {
        polls: Mutex<Vec<Result<HashMap<String, f64>, MarketDataError>>>,
    }

    #[async_trait]
    impl MarketDataSource for ScriptedPrices {
        async fn fetch_recent_prices(&self) -> Result<HashMap<String, f64>, MarketDataError> {
            self.polls.lock().unwrap().remove(0)
        }

        async fn fetch_historical_bars(
            &self,
            _symbol: &str,
            _interval: &str,
            _limit: usize,
        ) -> Result<Vec<Kline>, MarketDataError> {
            Ok(vec![])
        }

        async fn fetch_universe(&self, _quote_asset: &str) -> Result<Vec<AssetInfo>, MarketDataError> {
            Ok(vec![])
        }
    }

    fn bar(open_time: i64, price: f64) -> Kline {
        Kline {
            open_time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1.0,
            close_time: open_time + MS_IN_MINUTE - 1,
            quote_volume: 0.0,
            trade_count: 0,
            taker_buy_base: 0.0,
            taker_buy_quote: 0.0,
        }
    }

    fn universe() -> Universe {
        let universe = Universe::new();
        universe.insert(crate::universe::Asset::new(
            AssetInfo {
                symbol: "AUSDT".to_string(),
                base_asset: "A".to_string(),
                quote_asset: "USDT".to_string(),
                tick_size: 0.01,
                min_qty: 0.001,
                opening_price: 10.0,
                current_price: 10.0,
                quote_volume: 0.0,
            },
            vec![],
            200,
            15 * MS_IN_MINUTE,
        ));
        universe
            .swap_series(
                &SeriesKey::new("AUSDT", Timeframe::OneMinute),
                Series::from_klines(vec![bar(0, 10.0)], 200, MS_IN_MINUTE).unwrap(),
            )
            .unwrap();
        universe
    }

    #[tokio::test]
    async fn test_ingest_updates_known_symbols_only() {
        let prices: HashMap<String, f64> = [("AUSDT".to_string(), 11.0), ("ZUSDT".to_string(), 1.0)]
            .into_iter()
            .collect();
        let source = Arc::new(ScriptedPrices {
            polls: Mutex::new(vec![Ok(prices)]),
        });
        let universe = universe();
        let feed = PriceFeed::new(source, universe.clone(), 2.0);

        let stats = feed.ingest_at(30_000).await.unwrap();

        assert_eq!(stats.received, 2);
        assert_eq!(stats.updated, 1);
        let asset = universe.get("AUSDT").unwrap();
        assert_eq!(asset.current_price, 11.0);
        assert_eq!(asset.klines_1m.latest().unwrap().high, 11.0);
        assert_eq!(asset.klines_1m.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_leaves_universe_untouched() {
        let source = Arc::new(ScriptedPrices {
            polls: Mutex::new(vec![Err(MarketDataError::Parse("bad".to_string()))]),
        });
        let universe = universe();
        let feed = PriceFeed::new(source, universe.clone(), 2.0);

        assert!(feed.ingest_at(30_000).await.is_err());
        assert_eq!(universe.get("AUSDT").unwrap().current_price, 10.0);
    }
}
