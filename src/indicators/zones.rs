use serde::{Deserialize, Serialize};

use crate::models::{Kline, Zone, ZoneKind};

/// Width of a zone relative to its anchor price
const ZONE_BUFFER: f64 = 0.01;
/// Bars at the end of the series not yet trusted for structure
const UNCONFIRMED_BARS: usize = 2;
/// Bars before the pivot kept as zone context
const SOURCE_LOOKBACK: usize = 3;

const MIN_STREAK: usize = 3;
const WICK_RATIO: f64 = 4.0;
const MIN_STREAK_GAIN_PCT: f64 = 1.0;

/// All zones derived from one series, freshness evaluated against that series
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ZoneReport {
    pub demand_zone: Option<Zone>,
    pub supply_zone: Option<Zone>,
    pub immediate_demand_zone: Option<Zone>,
    pub prior_supply_zone: Option<Zone>,
    pub structure_broken: bool,
}

impl ZoneReport {
    pub fn compute(klines: &[Kline], base_candle_count: usize) -> Self {
        let immediate_demand_zone = find_streak_demand_zone(klines, base_candle_count);
        let prior_supply_zone = immediate_demand_zone
            .as_ref()
            .and_then(|demand| find_prior_supply_zone(klines, demand));
        let structure_broken = is_structure_broken(klines, prior_supply_zone.as_ref());

        let mut report = Self {
            demand_zone: find_demand_zone(klines),
            supply_zone: find_supply_zone(klines),
            immediate_demand_zone,
            prior_supply_zone,
            structure_broken,
        };
        report.revalidate(klines);
        report
    }

    /// Recompute every zone's freshness against `klines`
    pub fn revalidate(&mut self, klines: &[Kline]) {
        for zone in [
            &mut self.demand_zone,
            &mut self.supply_zone,
            &mut self.immediate_demand_zone,
            &mut self.prior_supply_zone,
        ]
        .into_iter()
        .flatten()
        {
            zone.revalidate(klines);
        }
    }
}

/// Most recent confirmed bar whose low undercuts both neighbours (drop-base-rally)
pub fn find_demand_zone(klines: &[Kline]) -> Option<Zone> {
    let i = find_pivot(klines, |prev, cur, next| cur.low < prev.low && cur.low < next.low)?;
    let pivot = &klines[i];
    Some(Zone::new(
        ZoneKind::Demand,
        pivot.low,
        pivot.low * (1.0 + ZONE_BUFFER),
        pivot.open_time,
        source_candles(klines, i),
    ))
}

/// Most recent confirmed bar whose high tops both neighbours (rally-base-drop)
pub fn find_supply_zone(klines: &[Kline]) -> Option<Zone> {
    let i = find_pivot(klines, |prev, cur, next| cur.high > prev.high && cur.high > next.high)?;
    let pivot = &klines[i];
    Some(Zone::new(
        ZoneKind::Supply,
        pivot.high * (1.0 - ZONE_BUFFER),
        pivot.high,
        pivot.open_time,
        source_candles(klines, i),
    ))
}

fn find_pivot<F>(klines: &[Kline], is_pivot: F) -> Option<usize>
where
    F: Fn(&Kline, &Kline, &Kline) -> bool,
{
    let last = klines.len().checked_sub(UNCONFIRMED_BARS + 1)?;
    (2..=last)
        .rev()
        .find(|&i| is_pivot(&klines[i - 1], &klines[i], &klines[i + 1]))
}

fn source_candles(klines: &[Kline], i: usize) -> Vec<Kline> {
    klines[i.saturating_sub(SOURCE_LOOKBACK)..=i].to_vec()
}

/// Bullish bar with small wicks on both sides and at least a 1% gain
pub fn is_solid_green(kline: &Kline) -> bool {
    if !kline.is_bullish() || kline.open <= 0.0 {
        return false;
    }
    let body = kline.body();
    let gain_pct = (kline.close - kline.open) / kline.open * 100.0;

    kline.upper_wick() <= body / WICK_RATIO
        && kline.lower_wick() <= body / WICK_RATIO
        && gain_pct >= MIN_STREAK_GAIN_PCT
}

/// Start index of the most recent run of at least three solid green bars
fn last_streak_start(klines: &[Kline]) -> Option<usize> {
    let mut found = None;
    let mut run_start = 0;
    let mut run_len = 0;

    for (i, kline) in klines.iter().enumerate() {
        if is_solid_green(kline) {
            if run_len == 0 {
                run_start = i;
            }
            run_len += 1;
            if run_len >= MIN_STREAK {
                found = Some(run_start);
            }
        } else {
            run_len = 0;
        }
    }

    found
}

/// Demand zone under the base that launched the most recent solid green streak
pub fn find_streak_demand_zone(klines: &[Kline], base_candle_count: usize) -> Option<Zone> {
    if base_candle_count == 0 {
        return None;
    }
    let start = last_streak_start(klines)?;
    if start < base_candle_count {
        return None;
    }

    let base = &klines[start - base_candle_count..start];
    let base_low = base.iter().map(|k| k.low).reduce(f64::min)?;
    let creation_time = base.last()?.open_time;

    Some(Zone::new(
        ZoneKind::Demand,
        base_low,
        base_low * (1.0 + ZONE_BUFFER),
        creation_time,
        base.to_vec(),
    ))
}

/// Most recent bar whose high clears the demand zone, as a supply zone
pub fn find_prior_supply_zone(klines: &[Kline], demand: &Zone) -> Option<Zone> {
    let bar = klines.iter().rev().find(|k| k.high > demand.high)?;
    Some(Zone::new(
        ZoneKind::Supply,
        bar.high * (1.0 - ZONE_BUFFER),
        bar.high,
        bar.open_time,
        vec![*bar],
    ))
}

/// Any close above the prior supply zone's high
pub fn is_structure_broken(klines: &[Kline], prior_supply: Option<&Zone>) -> bool {
    match prior_supply {
        Some(zone) => klines.iter().any(|k| k.close > zone.high),
        None => false,
    }
}
