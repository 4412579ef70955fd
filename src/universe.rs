// Shared asset universe
// Only ingestion and refresh write series; everything else reads snapshots

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::api::AssetInfo;
use crate::config::BotConfig;
use crate::error::KlineError;
use crate::execution::kline_store::Series;
use crate::execution::kline_updater::{apply_tick, TickOutcome};
use crate::indicators::moving_average::is_uptrend;
use crate::indicators::price_movement::PriceMovement;
use crate::indicators::volatility::{find_outliers_zscore, volatility_factor};
use crate::models::{Kline, SeriesKey, TestResults, Timeframe, MS_IN_MINUTE};

pub const STABLECOIN_TAG: &str = "stablecoin";

/// One tradable symbol and its two series
#[derive(Debug, Clone)]
pub struct Asset {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub tick_size: f64,
    pub min_qty: f64,
    pub opening_price: f64,
    pub current_price: f64,
    /// Last cover bar volume valued at the current price
    pub last_volume: f64,
    pub klines_1m: Arc<Series>,
    pub klines_cover: Arc<Series>,
    pub blacklisted: bool,
    pub is_unusual_volatility: bool,
    pub tags: Vec<String>,
    pub test_results: TestResults,
    pub price_movement: PriceMovement,
    pub last_price_change_pct: f64,
}

impl Asset {
    pub fn new(info: AssetInfo, tags: Vec<String>, capacity: usize, cover_interval_ms: i64) -> Self {
        let price_movement = PriceMovement {
            last_price: Some(info.current_price),
            ..PriceMovement::default()
        };
        Self {
            symbol: info.symbol,
            base_asset: info.base_asset,
            quote_asset: info.quote_asset,
            tick_size: info.tick_size,
            min_qty: info.min_qty,
            opening_price: info.opening_price,
            current_price: info.current_price,
            last_volume: 0.0,
            klines_1m: Arc::new(Series::new(capacity, MS_IN_MINUTE)),
            klines_cover: Arc::new(Series::new(capacity, cover_interval_ms)),
            blacklisted: false,
            is_unusual_volatility: false,
            tags,
            test_results: TestResults::new(),
            price_movement,
            last_price_change_pct: 0.0,
        }
    }

    pub fn series(&self, timeframe: Timeframe) -> &Arc<Series> {
        match timeframe {
            Timeframe::OneMinute => &self.klines_1m,
            Timeframe::Cover => &self.klines_cover,
        }
    }

    fn series_mut(&mut self, timeframe: Timeframe) -> &mut Arc<Series> {
        match timeframe {
            Timeframe::OneMinute => &mut self.klines_1m,
            Timeframe::Cover => &mut self.klines_cover,
        }
    }

    pub fn volatility_factor(&self, timeframe: Timeframe) -> Option<f64> {
        volatility_factor(self.series(timeframe).klines())
    }

    /// Price change since the 24h open, in percent
    pub fn price_change_pct(&self) -> Option<f64> {
        if self.opening_price == 0.0 {
            return None;
        }
        Some((self.current_price - self.opening_price) / self.opening_price * 100.0)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    fn refresh_last_volume(&mut self) {
        if let Some(last) = self.klines_cover.latest() {
            self.last_volume = last.volume * self.current_price;
        }
    }
}

/// Per-tag aggregate for display
#[derive(Debug, Clone, PartialEq)]
pub struct TagSummary {
    pub tag: String,
    pub asset_count: usize,
    pub uptrend_pct: f64,
    pub avg_price_change_pct: f64,
}

/// Process-wide symbol -> Asset map
///
/// Cloneable handle; every clone sees the same assets.
#[derive(Debug, Clone, Default)]
pub struct Universe {
    assets: Arc<RwLock<HashMap<String, Asset>>>,
}

impl Universe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from exchange metadata, skipping stablecoins and honouring the size limit
    pub fn from_infos(infos: Vec<AssetInfo>, config: &BotConfig) -> Self {
        let capacity = config.market.kline_limit;
        let cover_ms = config.market.cover_interval_ms();
        let limit = config.market.universe_limit.unwrap_or(usize::MAX);

        let universe = Self::new();
        {
            let mut assets = universe.write();
            for info in infos {
                if assets.len() >= limit {
                    break;
                }
                let tags = config.tags_for(&info.symbol).to_vec();
                let mut asset = Asset::new(info, tags, capacity, cover_ms);
                if asset.has_tag(STABLECOIN_TAG) {
                    tracing::debug!(symbol = %asset.symbol, "Skipping stablecoin");
                    continue;
                }
                asset.blacklisted = config.is_blacklisted(&asset.symbol);
                assets.insert(asset.symbol.clone(), asset);
            }
        }
        universe
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Asset>> {
        self.assets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Asset>> {
        self.assets.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, asset: Asset) {
        self.write().insert(asset.symbol.clone(), asset);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Sorted for deterministic iteration
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Copy of one asset; its series are shared, not copied
    pub fn get(&self, symbol: &str) -> Option<Asset> {
        self.read().get(symbol).cloned()
    }

    /// Copy of every asset, sorted by symbol
    pub fn snapshot(&self) -> Vec<Asset> {
        let mut assets: Vec<Asset> = self.read().values().cloned().collect();
        assets.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        assets
    }

    pub fn latest(&self, key: &SeriesKey) -> Option<Kline> {
        self.read()
            .get(&key.symbol)?
            .series(key.timeframe)
            .latest()
            .copied()
    }

    /// Append a closed bar to one series
    pub fn append(&self, key: &SeriesKey, kline: Kline) -> Result<(), KlineError> {
        self.with_series_mut(key, |series| series.append(kline))
    }

    /// Overwrite the live bar of one series
    pub fn replace_live(&self, key: &SeriesKey, kline: Kline) -> Result<(), KlineError> {
        self.with_series_mut(key, |series| series.replace_live(kline))
    }

    /// Install a freshly fetched series in one step
    pub fn swap_series(&self, key: &SeriesKey, series: Series) -> Result<(), KlineError> {
        let mut assets = self.write();
        let asset = assets
            .get_mut(&key.symbol)
            .ok_or_else(|| KlineError::UnknownSeries(key.to_string()))?;
        *asset.series_mut(key.timeframe) = Arc::new(series);
        Ok(())
    }

    fn with_series_mut<F>(&self, key: &SeriesKey, f: F) -> Result<(), KlineError>
    where
        F: FnOnce(&mut Series) -> Result<(), KlineError>,
    {
        let mut assets = self.write();
        let asset = assets
            .get_mut(&key.symbol)
            .ok_or_else(|| KlineError::UnknownSeries(key.to_string()))?;
        // Copy-on-write: readers holding the old Arc keep their snapshot
        f(Arc::make_mut(asset.series_mut(key.timeframe)))
    }

    /// Feed one price into both series of a symbol. None if the symbol is unknown.
    pub fn apply_tick(&self, symbol: &str, price: f64, now_ms: i64) -> Option<[TickOutcome; 2]> {
        let mut assets = self.write();
        let asset = assets.get_mut(symbol)?;
        Some(tick_asset(asset, price, now_ms))
    }

    /// Feed a bulk price poll; returns how many known symbols were updated
    pub fn apply_prices(&self, prices: &HashMap<String, f64>, now_ms: i64) -> usize {
        let mut assets = self.write();
        let mut updated = 0;
        for (symbol, &price) in prices {
            if let Some(asset) = assets.get_mut(symbol) {
                let outcomes = tick_asset(asset, price, now_ms);
                for (timeframe, outcome) in Timeframe::ALL.iter().zip(outcomes) {
                    if outcome == TickOutcome::Stale {
                        tracing::debug!(symbol = %symbol, "Stale {} tick ignored", timeframe);
                    }
                }
                updated += 1;
            }
        }
        updated
    }

    /// Flag a symbol so nomination skips it; false if unknown
    pub fn blacklist(&self, symbol: &str) -> bool {
        match self.write().get_mut(symbol) {
            Some(asset) => {
                asset.blacklisted = true;
                true
            }
            None => false,
        }
    }

    pub fn set_test_results(&self, symbol: &str, results: TestResults) {
        if let Some(asset) = self.write().get_mut(symbol) {
            asset.test_results = results;
        }
    }

    /// Recompute `last_volume` for every asset from its cover series
    pub fn refresh_last_volumes(&self) {
        for asset in self.write().values_mut() {
            asset.refresh_last_volume();
        }
    }

    /// Re-flag cross-sectional volatility outliers on both timeframes.
    ///
    /// Returns the symbols flagged this cycle.
    pub fn refresh_unusual_volatility(&self, zscore_threshold: f64) -> Vec<String> {
        let factors: Vec<(String, Option<f64>, Option<f64>)> = self
            .read()
            .values()
            .map(|a| {
                (
                    a.symbol.clone(),
                    a.volatility_factor(Timeframe::OneMinute),
                    a.volatility_factor(Timeframe::Cover),
                )
            })
            .collect();

        let one_m = outlier_symbols(factors.iter().map(|(s, v, _)| (s, *v)), zscore_threshold);
        let cover = outlier_symbols(factors.iter().map(|(s, _, v)| (s, *v)), zscore_threshold);

        let mut flagged = Vec::new();
        let mut assets = self.write();
        for asset in assets.values_mut() {
            let unusual = one_m.contains(&asset.symbol) || cover.contains(&asset.symbol);
            asset.is_unusual_volatility = unusual;
            if unusual {
                flagged.push(asset.symbol.clone());
            }
        }
        flagged.sort();
        flagged
    }

    /// Per tag: asset count, share in a 1m uptrend and mean change since open
    pub fn tag_summaries(&self, short_period: usize, long_period: usize) -> Vec<TagSummary> {
        let mut groups: BTreeMap<String, Vec<Asset>> = BTreeMap::new();
        for asset in self.read().values() {
            for tag in &asset.tags {
                groups.entry(tag.clone()).or_default().push(asset.clone());
            }
        }

        groups
            .into_iter()
            .map(|(tag, assets)| {
                let asset_count = assets.len();
                let uptrends = assets
                    .iter()
                    .filter(|a| is_uptrend(&a.klines_1m.closes(), short_period, long_period))
                    .count();
                let changes: Vec<f64> = assets.iter().filter_map(Asset::price_change_pct).collect();
                let avg_price_change_pct = if changes.is_empty() {
                    0.0
                } else {
                    changes.iter().sum::<f64>() / changes.len() as f64
                };

                TagSummary {
                    tag,
                    asset_count,
                    uptrend_pct: uptrends as f64 / asset_count as f64 * 100.0,
                    avg_price_change_pct,
                }
            })
            .collect()
    }
}

fn tick_asset(asset: &mut Asset, price: f64, now_ms: i64) -> [TickOutcome; 2] {
    let (pct_change, movement) = asset.price_movement.transition(price);
    asset.price_movement = movement;
    asset.last_price_change_pct = pct_change;
    asset.current_price = price;

    Timeframe::ALL.map(|timeframe| {
        let series = asset.series_mut(timeframe);
        if series.is_empty() {
            return TickOutcome::Dropped;
        }
        apply_tick(Arc::make_mut(series), price, now_ms)
    })
}

/// Symbols whose value is a z-score outlier among the symbols that have one
fn outlier_symbols<'a, I>(values: I, threshold: f64) -> Vec<String>
where
    I: Iterator<Item = (&'a String, Option<f64>)>,
{
    let (symbols, values): (Vec<&String>, Vec<f64>) =
        values.filter_map(|(s, v)| Some((s, v?))).unzip();

    find_outliers_zscore(&values, threshold)
        .into_iter()
        .zip(symbols)
        .filter(|(is_outlier, _)| *is_outlier)
        .map(|(_, symbol)| symbol.clone())
        .collect()
}
