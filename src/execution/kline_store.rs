use crate::error::KlineError;
use crate::models::Kline;

/// Default number of bars kept per series
pub const DEFAULT_CAPACITY: usize = 200;
/// Exchange fetch limit, the largest capacity we accept
pub const MAX_CAPACITY: usize = 500;

/// Bounded, chronologically ordered kline series for one (symbol, timeframe).
///
/// The last bar is the live bar; everything before it is closed.
/// When full, appending evicts the oldest bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    bars: Vec<Kline>,
    capacity: usize,
    interval_ms: i64,
}

impl Series {
    /// Create an empty series
    ///
    /// # Arguments
    /// * `capacity` - Maximum bars to keep (clamped to 1..=MAX_CAPACITY)
    /// * `interval_ms` - Bar duration in milliseconds
    pub fn new(capacity: usize, interval_ms: i64) -> Self {
        let capacity = capacity.clamp(1, MAX_CAPACITY);
        Self {
            bars: Vec::with_capacity(capacity),
            capacity,
            interval_ms,
        }
    }

    /// Build a series from fetched bars, keeping the most recent `capacity`
    pub fn from_klines(
        klines: Vec<Kline>,
        capacity: usize,
        interval_ms: i64,
    ) -> Result<Self, KlineError> {
        let mut series = Self::new(capacity, interval_ms);
        for kline in klines {
            series.append(kline)?;
        }
        Ok(series)
    }

    /// Add a bar after the current live bar
    ///
    /// If the series is full, removes the oldest bar
    pub fn append(&mut self, kline: Kline) -> Result<(), KlineError> {
        if let Some(last) = self.bars.last() {
            if kline.open_time <= last.open_time {
                return Err(KlineError::NonMonotonic {
                    previous: last.open_time,
                    next: kline.open_time,
                });
            }
        }

        self.bars.push(kline);

        // Remove oldest if exceeds capacity
        if self.bars.len() > self.capacity {
            let excess = self.bars.len() - self.capacity;
            self.bars.drain(..excess);
        }

        Ok(())
    }

    /// Overwrite the live bar in place
    pub fn replace_live(&mut self, kline: Kline) -> Result<(), KlineError> {
        let len = self.bars.len();
        if len == 0 {
            return Err(KlineError::EmptySeries);
        }
        if len >= 2 {
            let previous = self.bars[len - 2].open_time;
            if kline.open_time <= previous {
                return Err(KlineError::NonMonotonic {
                    previous,
                    next: kline.open_time,
                });
            }
        }
        self.bars[len - 1] = kline;
        Ok(())
    }

    pub fn latest(&self) -> Option<&Kline> {
        self.bars.last()
    }

    pub(crate) fn latest_mut(&mut self) -> Option<&mut Kline> {
        self.bars.last_mut()
    }

    /// All bars, oldest first
    pub fn klines(&self) -> &[Kline] {
        &self.bars
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|k| k.close).collect()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MS_IN_MINUTE;

    fn create_test_kline(open_time: i64, price: f64) -> Kline {
        Kline {
            open_time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1000.0,
            close_time: open_time + MS_IN_MINUTE - 1,
            quote_volume: 0.0,
            trade_count: 0,
            taker_buy_base: 0.0,
            taker_buy_quote: 0.0,
        }
    }

    #[test]
    fn test_new_series() {
        let series = Series::new(100, MS_IN_MINUTE);
        assert_eq!(series.capacity(), 100);
        assert!(series.is_empty());
        assert!(series.latest().is_none());
    }

    #[test]
    fn test_capacity_is_clamped_to_fetch_limit() {
        assert_eq!(Series::new(10_000, MS_IN_MINUTE).capacity(), MAX_CAPACITY);
        assert_eq!(Series::new(0, MS_IN_MINUTE).capacity(), 1);
    }

    #[test]
    fn test_append_and_latest() {
        let mut series = Series::new(100, MS_IN_MINUTE);
        series.append(create_test_kline(0, 100.0)).unwrap();
        series.append(create_test_kline(MS_IN_MINUTE, 101.0)).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.latest().unwrap().close, 101.0);
    }

    #[test]
    fn test_max_capacity_evicts_oldest() {
        let mut series = Series::new(5, MS_IN_MINUTE);

        for i in 0..10 {
            series
                .append(create_test_kline(i * MS_IN_MINUTE, 100.0 + i as f64))
                .unwrap();
        }

        let closes = series.closes();
        assert_eq!(closes.len(), 5);
        assert_eq!(closes[0], 105.0);
        assert_eq!(closes[4], 109.0);
    }

    #[test]
    fn test_append_rejects_non_monotonic_open_time() {
        let mut series = Series::new(10, MS_IN_MINUTE);
        series.append(create_test_kline(MS_IN_MINUTE, 100.0)).unwrap();

        let result = series.append(create_test_kline(MS_IN_MINUTE, 101.0));
        assert_eq!(
            result,
            Err(KlineError::NonMonotonic {
                previous: MS_IN_MINUTE,
                next: MS_IN_MINUTE
            })
        );
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_replace_live_overwrites_last_bar() {
        let mut series = Series::new(10, MS_IN_MINUTE);
        series.append(create_test_kline(0, 100.0)).unwrap();
        series.append(create_test_kline(MS_IN_MINUTE, 101.0)).unwrap();

        series
            .replace_live(create_test_kline(MS_IN_MINUTE, 99.0))
            .unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.latest().unwrap().close, 99.0);
    }

    #[test]
    fn test_replace_live_on_empty_series_fails() {
        let mut series = Series::new(10, MS_IN_MINUTE);
        assert_eq!(
            series.replace_live(create_test_kline(0, 1.0)),
            Err(KlineError::EmptySeries)
        );
    }

    #[test]
    fn test_from_klines_keeps_most_recent() {
        let klines: Vec<Kline> = (0..8)
            .map(|i| create_test_kline(i * MS_IN_MINUTE, i as f64 + 1.0))
            .collect();
        let series = Series::from_klines(klines, 3, MS_IN_MINUTE).unwrap();

        let bars = series.klines();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].close, 6.0);
        assert_eq!(bars[2].close, 8.0);
    }
}
