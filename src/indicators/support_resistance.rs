use crate::error::SignalError;
use crate::models::{Kline, Level, Timeframe};

/// Minimum number of bars the detector accepts
pub const MIN_BARS: usize = 4;

/// Absolute tolerance added to the relative closeness band when counting touches
const TOUCH_ATOL: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LevelKind {
    Support,
    Resistance,
}

impl LevelKind {
    /// True if `candidate` is a more extreme level than `current`
    fn more_extreme(self, candidate: f64, current: f64) -> bool {
        match self {
            LevelKind::Support => candidate < current,
            LevelKind::Resistance => candidate > current,
        }
    }

    /// True if `candidate` has left `current`'s closeness band on the far side
    fn breaks_away(self, candidate: f64, current: f64, threshold_pct: f64) -> bool {
        match self {
            LevelKind::Support => candidate > current * (1.0 + threshold_pct / 100.0),
            LevelKind::Resistance => candidate < current * (1.0 - threshold_pct / 100.0),
        }
    }

    fn extreme(self, a: f64, b: f64) -> f64 {
        match self {
            LevelKind::Support => a.min(b),
            LevelKind::Resistance => a.max(b),
        }
    }
}

/// Swing shift for a timeframe; longer bars need a wider neighbourhood
pub fn swing_shift(timeframe: Timeframe) -> usize {
    match timeframe {
        Timeframe::Cover => 2,
        Timeframe::OneMinute => 1,
    }
}

/// Detect support and resistance levels from swing points.
///
/// Returns `(supports, resistances)` in discovery order. Levels of the same
/// kind never lie within each other's closeness band.
pub fn find_support_resistance(
    klines: &[Kline],
    timeframe: Timeframe,
    support_threshold_pct: f64,
    resistance_threshold_pct: f64,
) -> Result<(Vec<Level>, Vec<Level>), SignalError> {
    if klines.len() < MIN_BARS {
        return Err(SignalError::InsufficientBars {
            required: MIN_BARS,
            actual: klines.len(),
        });
    }

    let shift = swing_shift(timeframe);
    let highs: Vec<f64> = klines.iter().map(|k| k.high).collect();
    let lows: Vec<f64> = klines.iter().map(|k| k.low).collect();
    let closes: Vec<f64> = klines.iter().map(|k| k.close).collect();

    let resistances = levels_for(
        &highs,
        &closes,
        shift,
        resistance_threshold_pct,
        LevelKind::Resistance,
    );
    let supports = levels_for(&lows, &closes, shift, support_threshold_pct, LevelKind::Support);

    Ok((supports, resistances))
}

fn levels_for(
    values: &[f64],
    closes: &[f64],
    shift: usize,
    threshold_pct: f64,
    kind: LevelKind,
) -> Vec<Level> {
    let swings = swing_values(values, shift, kind);

    if swings.is_empty() {
        // Flat series: nothing stands out, the whole series is one level
        return match values.first() {
            Some(&first) if values.iter().all(|&v| v == first) => {
                vec![level_at(first, closes, threshold_pct)]
            }
            _ => Vec::new(),
        };
    }

    let mut emitted: Vec<Level> = Vec::new();
    let mut current: Option<f64> = None;

    for value in swings {
        match current {
            None => current = Some(value),
            Some(level) if kind.more_extreme(value, level) => current = Some(value),
            Some(level) if kind.breaks_away(value, level, threshold_pct) => {
                close_out(&mut emitted, level, closes, threshold_pct, kind);
                current = Some(value);
            }
            // absorbed by the current candidate
            Some(_) => {}
        }
    }

    if let Some(level) = current {
        close_out(&mut emitted, level, closes, threshold_pct, kind);
    }

    emitted
}

/// Values at interior indices that stand out from both neighbours `shift` bars away
fn swing_values(values: &[f64], shift: usize, kind: LevelKind) -> Vec<f64> {
    let n = values.len();
    if shift == 0 || n <= 2 * shift {
        return Vec::new();
    }

    (shift..n - shift)
        .filter(|&i| {
            kind.more_extreme(values[i], values[i - shift])
                && kind.more_extreme(values[i], values[i + shift])
        })
        .map(|i| values[i])
        .collect()
}

/// Emit a finished candidate, folding it into any earlier level inside its band
fn close_out(emitted: &mut Vec<Level>, price: f64, closes: &[f64], threshold_pct: f64, kind: LevelKind) {
    let mut price = price;
    let mut position: Option<usize> = None;

    while let Some(j) = emitted
        .iter()
        .position(|l| within_band(l.price, price, threshold_pct))
    {
        let existing = emitted.remove(j);
        price = kind.extreme(price, existing.price);
        position = Some(position.map_or(j, |p| p.min(j)));
    }

    let level = level_at(price, closes, threshold_pct);
    match position {
        Some(p) => emitted.insert(p.min(emitted.len()), level),
        None => emitted.push(level),
    }
}

fn level_at(price: f64, closes: &[f64], threshold_pct: f64) -> Level {
    Level {
        price,
        strength: touch_count(closes, price, threshold_pct),
    }
}

/// Number of closes within `threshold_pct` of `level`
pub fn touch_count(closes: &[f64], level: f64, threshold_pct: f64) -> usize {
    let tolerance = TOUCH_ATOL + threshold_pct / 100.0 * level.abs();
    closes
        .iter()
        .filter(|&&close| (close - level).abs() <= tolerance)
        .count()
}

/// Two prices sit inside one closeness band
pub fn within_band(a: f64, b: f64, threshold_pct: f64) -> bool {
    (a - b).abs() <= threshold_pct / 100.0 * a.abs().max(b.abs())
}

/// Highest-strength support and resistance; first seen wins ties
pub fn strongest_support_resistance(supports: &[Level], resistances: &[Level]) -> Option<(f64, f64)> {
    Some((strongest(supports)?.price, strongest(resistances)?.price))
}

fn strongest(levels: &[Level]) -> Option<&Level> {
    levels.iter().fold(None, |best: Option<&Level>, level| match best {
        Some(b) if level.strength <= b.strength => Some(b),
        _ => Some(level),
    })
}

/// Strongest support paired with the second-highest-priced resistance.
///
/// `None` when either side has fewer than two levels or a strongest level is zero.
pub fn next_support_resistance(supports: &[Level], resistances: &[Level]) -> Option<(f64, f64)> {
    if supports.len() < 2 || resistances.len() < 2 {
        return None;
    }

    let (support, strongest_resistance) = strongest_support_resistance(supports, resistances)?;
    if support == 0.0 || strongest_resistance == 0.0 {
        return None;
    }

    let mut prices: Vec<f64> = resistances.iter().map(|l| l.price).collect();
    prices.sort_by(|a, b| b.total_cmp(a));

    Some((support, prices[1]))
}

/// Gap between the next support and resistance as a percentage of the support
pub fn support_resistance_range_pct(next: Option<(f64, f64)>) -> f64 {
    match next {
        Some((support, resistance)) if support != 0.0 && resistance != 0.0 => {
            (resistance - support) / support * 100.0
        }
        _ => 0.0,
    }
}

pub fn lowest_support(supports: &[Level]) -> Option<f64> {
    supports.iter().map(|l| l.price).reduce(f64::min)
}
