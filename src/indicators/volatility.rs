use crate::models::Kline;

/// Floor applied to a zero cross-sectional standard deviation
const STD_EPSILON: f64 = 1e-10;

/// Percentage spread between the highest high and lowest low of a series.
///
/// `None` for an empty series, `0` when the lowest low is zero.
pub fn volatility_factor(klines: &[Kline]) -> Option<f64> {
    let high = klines.iter().map(|k| k.high).reduce(f64::max)?;
    let low = klines.iter().map(|k| k.low).reduce(f64::min)?;

    if low == 0.0 {
        return Some(0.0);
    }
    Some((high - low) / low * 100.0)
}

/// Flag every value whose z-score against the population mean exceeds `threshold`
pub fn find_outliers_zscore(values: &[f64], threshold: f64) -> Vec<bool> {
    if values.is_empty() {
        return Vec::new();
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let mut std = variance.sqrt();
    if std == 0.0 {
        std = STD_EPSILON;
    }

    values
        .iter()
        .map(|v| ((v - mean) / std).abs() > threshold)
        .collect()
}

/// Within the inclusive band
pub fn in_band(value: f64, low: f64, high: f64) -> bool {
    low <= value && value <= high
}
