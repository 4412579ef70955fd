use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::Duration;

use crate::error::MarketDataError;
use crate::models::Kline;

pub const BINANCE_API_BASE: &str = "https://api.binance.com";
const REQUEST_TIMEOUT_SECS: u64 = 15;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Tradable symbol with the metadata needed to size orders
#[derive(Debug, Clone, PartialEq)]
pub struct AssetInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub tick_size: f64,
    pub min_qty: f64,
    /// 24h rolling open
    pub opening_price: f64,
    pub current_price: f64,
    pub quote_volume: f64,
}

/// Where prices and bars come from
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Latest trade price of every listed symbol
    async fn fetch_recent_prices(&self) -> Result<HashMap<String, f64>, MarketDataError>;

    /// Most recent `limit` bars, oldest first
    async fn fetch_historical_bars(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, MarketDataError>;

    /// Trading symbols quoted in `quote_asset`, highest quote volume first
    async fn fetch_universe(&self, quote_asset: &str) -> Result<Vec<AssetInfo>, MarketDataError>;
}

/// Binance spot REST client
///
/// Cloneable; all clones share one rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    filters: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: String,
    open_price: String,
    last_price: String,
    quote_volume: String,
}

impl BinanceClient {
    pub fn new(base_url: impl Into<String>, requests_per_minute: u32) -> Result<Self, MarketDataError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
        })
    }

    /// Rate-limited GET, one attempt.
    ///
    /// Failures surface to the caller; the next scheduled cycle is the retry.
    async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, MarketDataError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        self.rate_limiter.until_ready().await;

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            return serde_json::from_str(&body)
                .map_err(|e| MarketDataError::Parse(format!("{}: {}", path, e)));
        }

        if status.as_u16() == 429 || status.is_server_error() {
            tracing::warn!("Binance {} returned {}, skipping until next cycle", path, status);
        }
        let body = response.text().await.unwrap_or_default();
        Err(MarketDataError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl MarketDataSource for BinanceClient {
    async fn fetch_recent_prices(&self) -> Result<HashMap<String, f64>, MarketDataError> {
        let tickers: Vec<TickerPrice> = self.get_json("/api/v3/ticker/price", &[]).await?;

        let mut prices = HashMap::with_capacity(tickers.len());
        for ticker in tickers {
            match ticker.price.parse::<f64>() {
                Ok(price) => {
                    prices.insert(ticker.symbol, price);
                }
                Err(e) => tracing::debug!(symbol = %ticker.symbol, "Skipping unparsable price: {}", e),
            }
        }
        Ok(prices)
    }

    async fn fetch_historical_bars(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, MarketDataError> {
        let rows: Vec<Vec<Value>> = self
            .get_json(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let klines = rows
            .iter()
            .map(|row| Kline::from_raw(row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(klines)
    }

    async fn fetch_universe(&self, quote_asset: &str) -> Result<Vec<AssetInfo>, MarketDataError> {
        let info: ExchangeInfo = self.get_json("/api/v3/exchangeInfo", &[]).await?;
        let tickers: Vec<Ticker24h> = self.get_json("/api/v3/ticker/24hr", &[]).await?;

        let tickers: HashMap<String, Ticker24h> =
            tickers.into_iter().map(|t| (t.symbol.clone(), t)).collect();

        let mut assets: Vec<AssetInfo> = info
            .symbols
            .into_iter()
            .filter(|s| s.status == "TRADING" && s.quote_asset == quote_asset)
            .filter_map(|s| {
                let ticker = tickers.get(&s.symbol)?;
                Some(AssetInfo {
                    tick_size: filter_value(&s.filters, "PRICE_FILTER", "tickSize").unwrap_or(0.0),
                    min_qty: filter_value(&s.filters, "LOT_SIZE", "minQty").unwrap_or(0.0),
                    opening_price: ticker.open_price.parse().ok()?,
                    current_price: ticker.last_price.parse().ok()?,
                    quote_volume: ticker.quote_volume.parse().ok()?,
                    symbol: s.symbol,
                    base_asset: s.base_asset,
                    quote_asset: s.quote_asset,
                })
            })
            .collect();

        assets.sort_by(|a, b| b.quote_volume.total_cmp(&a.quote_volume));
        Ok(assets)
    }
}

/// Numeric field of the first filter of `filter_type`
fn filter_value(filters: &[Value], filter_type: &str, field: &str) -> Option<f64> {
    filters
        .iter()
        .find(|f| f.get("filterType").and_then(Value::as_str) == Some(filter_type))?
        .get(field)?
        .as_str()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_fetch_recent_prices() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/ticker/price")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"symbol":"BTCUSDT","price":"64000.10"},{"symbol":"ETHUSDT","price":"3100.5"},{"symbol":"BAD","price":"n/a"}]"#,
            )
            .create_async()
            .await;

        let client = BinanceClient::new(server.url(), 1200).unwrap();
        let prices = client.fetch_recent_prices().await.unwrap();

        mock.assert_async().await;
        assert_eq!(prices.len(), 2);
        assert_eq!(prices["BTCUSDT"], 64000.10);
        assert_eq!(prices["ETHUSDT"], 3100.5);
    }

    #[tokio::test]
    async fn test_fetch_historical_bars_parses_rows() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
                Matcher::UrlEncoded("interval".into(), "15m".into()),
                Matcher::UrlEncoded("limit".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[
                    [1700000000000,"100.0","105.0","99.0","104.0","10.5",1700000899999,"1090.0",42,"5.0","520.0","0"],
                    [1700000900000,"104.0","106.0","103.0","105.5","8.0",1700001799999,"840.0",30,"4.0","420.0","0"]
                ]"#,
            )
            .create_async()
            .await;

        let client = BinanceClient::new(server.url(), 1200).unwrap();
        let klines = client.fetch_historical_bars("BTCUSDT", "15m", 2).await.unwrap();

        mock.assert_async().await;
        assert_eq!(klines.len(), 2);
        assert_eq!(klines[0].open_time, 1700000000000);
        assert_eq!(klines[0].trade_count, 42);
        assert_eq!(klines[1].close, 105.5);
        assert_eq!(klines[1].close_time, 1700001799999);
    }

    #[tokio::test]
    async fn test_malformed_kline_row_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[[1700000000000,"100.0"]]"#)
            .create_async()
            .await;

        let client = BinanceClient::new(server.url(), 1200).unwrap();
        let result = client.fetch_historical_bars("BTCUSDT", "1m", 1).await;

        assert!(matches!(result, Err(MarketDataError::Kline(_))));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-1121,"msg":"Invalid symbol."}"#)
            .expect(1)
            .create_async()
            .await;

        let client = BinanceClient::new(server.url(), 1200).unwrap();
        let result = client.fetch_historical_bars("NOPE", "1m", 10).await;

        mock.assert_async().await;
        match result {
            Err(MarketDataError::Api { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("Invalid symbol"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_fails_fast_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let prices = server
            .mock("GET", "/api/v3/ticker/price")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let klines = server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::Any)
            .with_status(429)
            .expect(1)
            .create_async()
            .await;

        let client = BinanceClient::new(server.url(), 1200).unwrap();
        let started = std::time::Instant::now();
        let price_result = client.fetch_recent_prices().await;
        let kline_result = client.fetch_historical_bars("BTCUSDT", "1m", 10).await;

        prices.assert_async().await;
        klines.assert_async().await;
        assert!(matches!(price_result, Err(MarketDataError::Api { status: 503, .. })));
        assert!(matches!(kline_result, Err(MarketDataError::Api { status: 429, .. })));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_fetch_universe_joins_and_sorts() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/exchangeInfo")
            .with_status(200)
            .with_body(
                r#"{"symbols":[
                    {"symbol":"ETHUSDT","status":"TRADING","baseAsset":"ETH","quoteAsset":"USDT",
                     "filters":[{"filterType":"PRICE_FILTER","tickSize":"0.01"},{"filterType":"LOT_SIZE","minQty":"0.0001"}]},
                    {"symbol":"BTCUSDT","status":"TRADING","baseAsset":"BTC","quoteAsset":"USDT",
                     "filters":[{"filterType":"PRICE_FILTER","tickSize":"0.1"},{"filterType":"LOT_SIZE","minQty":"0.00001"}]},
                    {"symbol":"OLDUSDT","status":"BREAK","baseAsset":"OLD","quoteAsset":"USDT","filters":[]},
                    {"symbol":"ETHBTC","status":"TRADING","baseAsset":"ETH","quoteAsset":"BTC","filters":[]}
                ]}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/v3/ticker/24hr")
            .with_status(200)
            .with_body(
                r#"[
                    {"symbol":"ETHUSDT","openPrice":"3000","lastPrice":"3100","quoteVolume":"5000000"},
                    {"symbol":"BTCUSDT","openPrice":"60000","lastPrice":"64000","quoteVolume":"9000000"},
                    {"symbol":"OLDUSDT","openPrice":"1","lastPrice":"1","quoteVolume":"99999999"},
                    {"symbol":"ETHBTC","openPrice":"0.05","lastPrice":"0.05","quoteVolume":"10"}
                ]"#,
            )
            .create_async()
            .await;

        let client = BinanceClient::new(server.url(), 1200).unwrap();
        let universe = client.fetch_universe("USDT").await.unwrap();

        let symbols: Vec<&str> = universe.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(universe[0].tick_size, 0.1);
        assert_eq!(universe[1].min_qty, 0.0001);
        assert_eq!(universe[1].opening_price, 3000.0);
        assert_eq!(universe[1].base_asset, "ETH");
    }
}
