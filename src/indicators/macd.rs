use serde::{Deserialize, Serialize};

use super::moving_average::calculate_ema_series;

pub const FAST_PERIOD: usize = 12;
pub const SLOW_PERIOD: usize = 26;
pub const SIGNAL_PERIOD: usize = 9;

/// Direction of a MACD/signal line cross on the most recent bar
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Crossover {
    Bullish,
    Bearish,
}

/// MACD and signal lines, aligned on their last element
#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
}

impl Macd {
    pub fn histogram(&self) -> Option<f64> {
        Some(self.macd.last()? - self.signal.last()?)
    }
}

pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    if fast >= slow {
        return None;
    }

    let fast_ema = calculate_ema_series(closes, fast);
    let slow_ema = calculate_ema_series(closes, slow);
    if slow_ema.is_empty() {
        return None;
    }

    // fast EMA starts (slow - fast) bars earlier
    let offset = slow - fast;
    let macd: Vec<f64> = slow_ema
        .iter()
        .zip(&fast_ema[offset..])
        .map(|(slow, fast)| fast - slow)
        .collect();

    let signal_line = calculate_ema_series(&macd, signal);
    if signal_line.is_empty() {
        return None;
    }

    Some(Macd {
        macd,
        signal: signal_line,
    })
}

/// Crossover between the last two MACD/signal points with the standard 12/26/9 setup
pub fn macd_crossover(closes: &[f64]) -> Option<Crossover> {
    let macd = calculate_macd(closes, FAST_PERIOD, SLOW_PERIOD, SIGNAL_PERIOD)?;
    crossover_of(&macd)
}

fn crossover_of(macd: &Macd) -> Option<Crossover> {
    let m = &macd.macd;
    let s = &macd.signal;
    if m.len() < 2 || s.len() < 2 {
        return None;
    }

    let (m_prev, m_last) = (m[m.len() - 2], m[m.len() - 1]);
    let (s_prev, s_last) = (s[s.len() - 2], s[s.len() - 1]);

    if m_prev < s_prev && m_last > s_last {
        Some(Crossover::Bullish)
    } else if m_prev > s_prev && m_last < s_last {
        Some(Crossover::Bearish)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_needs_enough_data() {
        let closes: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert!(calculate_macd(&closes, 12, 26, 9).is_none());
        assert!(macd_crossover(&closes).is_none());
    }

    #[test]
    fn test_macd_lines_are_aligned() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let macd = calculate_macd(&closes, 12, 26, 9).unwrap();

        assert_eq!(macd.macd.len(), 60 - 26 + 1);
        assert_eq!(macd.signal.len(), macd.macd.len() - 9 + 1);
        assert!(macd.histogram().is_some());
    }

    #[test]
    fn test_crossover_detection() {
        let bullish = Macd {
            macd: vec![-1.0, 1.0],
            signal: vec![0.0, 0.0],
        };
        let bearish = Macd {
            macd: vec![1.0, -1.0],
            signal: vec![0.0, 0.0],
        };
        let flat = Macd {
            macd: vec![1.0, 2.0],
            signal: vec![0.0, 0.0],
        };

        assert_eq!(crossover_of(&bullish), Some(Crossover::Bullish));
        assert_eq!(crossover_of(&bearish), Some(Crossover::Bearish));
        assert_eq!(crossover_of(&flat), None);
    }

    #[test]
    fn test_steady_trend_has_no_crossover() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        assert_eq!(macd_crossover(&closes), None);
    }
}
