use super::kline_store::Series;
use crate::models::Kline;

/// What a tick did to a series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Series is empty; nothing to seed from until a backfill lands
    Dropped,
    /// Tick is older than the live bar
    Stale,
    /// Live bar's high/low/close updated in place
    Updated,
    /// Live bar closed and a new live bar appended
    RolledOver,
}

/// Merge a price tick into the live bar, or roll over to a new bar once the
/// live bar's interval has elapsed.
///
/// A rolled-over bar opens at the previous close with
/// `open_time = previous open_time + interval`, high = low = close = price
/// and zero volume.
pub fn apply_tick(series: &mut Series, price: f64, now_ms: i64) -> TickOutcome {
    let interval_ms = series.interval_ms();

    let live = match series.latest_mut() {
        Some(live) => live,
        None => return TickOutcome::Dropped,
    };

    if now_ms < live.open_time {
        return TickOutcome::Stale;
    }

    if now_ms - live.open_time < interval_ms {
        live.high = live.high.max(price);
        live.low = live.low.min(price);
        live.close = price;
        return TickOutcome::Updated;
    }

    let next = rollover_bar(live, price, interval_ms);
    match series.append(next) {
        Ok(()) => TickOutcome::RolledOver,
        // open_time strictly increases by construction
        Err(_) => TickOutcome::Stale,
    }
}

fn rollover_bar(previous: &Kline, price: f64, interval_ms: i64) -> Kline {
    let open_time = previous.open_time + interval_ms;
    Kline {
        open_time,
        open: previous.close,
        high: price,
        low: price,
        close: price,
        volume: 0.0,
        close_time: open_time + interval_ms - 1,
        quote_volume: 0.0,
        trade_count: 0,
        taker_buy_base: 0.0,
        taker_buy_quote: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MS_IN_MINUTE;

    const T0: i64 = 1_700_000_000_000;

    fn live_bar(open_time: i64, open: f64, close: f64) -> Kline {
        Kline {
            open_time,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 12.0,
            close_time: open_time + MS_IN_MINUTE - 1,
            quote_volume: 1200.0,
            trade_count: 7,
            taker_buy_base: 6.0,
            taker_buy_quote: 600.0,
        }
    }

    fn seeded_series() -> Series {
        let mut series = Series::new(200, MS_IN_MINUTE);
        series.append(live_bar(T0 - MS_IN_MINUTE, 99.0, 100.0)).unwrap();
        series.append(live_bar(T0, 100.0, 101.0)).unwrap();
        series
    }

    #[test]
    fn test_tick_on_empty_series_is_dropped() {
        let mut series = Series::new(200, MS_IN_MINUTE);
        assert_eq!(apply_tick(&mut series, 100.0, T0), TickOutcome::Dropped);
        assert!(series.is_empty());
    }

    #[test]
    fn test_tick_within_bucket_updates_in_place() {
        let mut series = seeded_series();

        // 59 seconds into a 60 second bar
        let outcome = apply_tick(&mut series, 105.0, T0 + 59_000);

        assert_eq!(outcome, TickOutcome::Updated);
        assert_eq!(series.len(), 2);
        let live = series.latest().unwrap();
        assert_eq!(live.open_time, T0);
        assert_eq!(live.high, 105.0);
        assert_eq!(live.low, 100.0);
        assert_eq!(live.close, 105.0);
        assert_eq!(live.volume, 12.0);
    }

    #[test]
    fn test_tick_lowers_low() {
        let mut series = seeded_series();
        apply_tick(&mut series, 95.5, T0 + 10_000);

        let live = series.latest().unwrap();
        assert_eq!(live.low, 95.5);
        assert_eq!(live.high, 101.0);
        assert_eq!(live.close, 95.5);
    }

    #[test]
    fn test_tick_past_boundary_rolls_over() {
        let mut series = seeded_series();

        // 61 seconds after the live bar opened
        let outcome = apply_tick(&mut series, 103.0, T0 + 61_000);

        assert_eq!(outcome, TickOutcome::RolledOver);
        assert_eq!(series.len(), 3);

        let closed = series.klines()[1];
        assert_eq!(closed.close, 101.0);

        let live = series.latest().unwrap();
        assert_eq!(live.open_time, T0 + MS_IN_MINUTE);
        assert_eq!(live.open, 101.0);
        assert_eq!(live.high, 103.0);
        assert_eq!(live.low, 103.0);
        assert_eq!(live.close, 103.0);
        assert_eq!(live.volume, 0.0);
        assert_eq!(live.trade_count, 0);
    }

    #[test]
    fn test_stale_tick_is_ignored() {
        let mut series = seeded_series();
        let before = series.clone();

        assert_eq!(apply_tick(&mut series, 50.0, T0 - 1), TickOutcome::Stale);
        assert_eq!(series, before);
    }

    #[test]
    fn test_rollover_respects_capacity() {
        let mut series = Series::new(2, MS_IN_MINUTE);
        series.append(live_bar(T0 - MS_IN_MINUTE, 99.0, 100.0)).unwrap();
        series.append(live_bar(T0, 100.0, 101.0)).unwrap();

        apply_tick(&mut series, 102.0, T0 + MS_IN_MINUTE);

        assert_eq!(series.len(), 2);
        assert_eq!(series.klines()[0].open_time, T0);
    }

    #[test]
    fn test_streamed_ticks_match_appending_closed_bar() {
        // Ticks: live bar opens at 100 via rollover, trades 102, 98, 101,
        // then the next tick crosses into the following bucket.
        let mut streamed = Series::new(200, MS_IN_MINUTE);
        streamed.append(live_bar(T0, 99.0, 100.0)).unwrap();

        apply_tick(&mut streamed, 100.5, T0 + MS_IN_MINUTE);
        for (offset, price) in [(10_000, 102.0), (20_000, 98.0), (50_000, 101.0)] {
            apply_tick(&mut streamed, price, T0 + MS_IN_MINUTE + offset);
        }
        apply_tick(&mut streamed, 101.5, T0 + 2 * MS_IN_MINUTE + 1_000);

        let mut direct = Series::new(200, MS_IN_MINUTE);
        direct.append(live_bar(T0, 99.0, 100.0)).unwrap();
        direct
            .append(Kline {
                open_time: T0 + MS_IN_MINUTE,
                open: 100.0,
                high: 102.0,
                low: 98.0,
                close: 101.0,
                volume: 0.0,
                close_time: T0 + 2 * MS_IN_MINUTE - 1,
                quote_volume: 0.0,
                trade_count: 0,
                taker_buy_base: 0.0,
                taker_buy_quote: 0.0,
            })
            .unwrap();

        let streamed_closed = &streamed.klines()[..2];
        for (a, b) in streamed_closed.iter().zip(direct.klines()) {
            assert_eq!(a.open_time, b.open_time);
            assert_eq!(a.close_time, b.close_time);
            assert!((a.open - b.open).abs() < 1e-9);
            assert!((a.high - b.high).abs() < 1e-9);
            assert!((a.low - b.low).abs() < 1e-9);
            assert!((a.close - b.close).abs() < 1e-9);
            assert_eq!(a.volume, b.volume);
        }
        assert_eq!(streamed.latest().unwrap().open, 101.0);
    }
}
