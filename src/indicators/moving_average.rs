/// Calculate Simple Moving Average (SMA) over the last `period` values
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate Exponential Moving Average (EMA), seeded with the SMA of the first `period` values
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    calculate_ema_series(prices, period).last().copied()
}

/// EMA at every index from `period - 1` onwards.
///
/// The returned vector is `prices.len() - period + 1` long, so
/// `result[k]` lines up with `prices[k + period - 1]`.
pub fn calculate_ema_series(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    // Start with SMA
    let mut ema = prices[..period].iter().sum::<f64>() / period as f64;
    let mut series = Vec::with_capacity(prices.len() - period + 1);
    series.push(ema);

    for price in &prices[period..] {
        ema = (price - ema) * multiplier + ema;
        series.push(ema);
    }

    series
}

/// Short SMA strictly above long SMA; false when either is unavailable
pub fn is_uptrend(prices: &[f64], short_period: usize, long_period: usize) -> bool {
    match (
        calculate_sma(prices, short_period),
        calculate_sma(prices, long_period),
    ) {
        (Some(short), Some(long)) => short > long,
        _ => false,
    }
}
