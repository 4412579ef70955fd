use crate::error::KlineError;
use crate::models::Kline;

/// Validates fetched klines before they replace a live series
pub struct KlineValidator;

impl KlineValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a single kline
    pub fn validate(&self, kline: &Kline) -> Result<(), KlineError> {
        self.validate_prices(kline)?;
        self.validate_times(kline)?;
        self.validate_ohlc_relationship(kline)?;
        Ok(())
    }

    /// Validate every kline and require strictly increasing open times
    pub fn validate_series(&self, klines: &[Kline]) -> Result<(), KlineError> {
        for kline in klines {
            self.validate(kline)?;
        }
        for pair in klines.windows(2) {
            if pair[1].open_time <= pair[0].open_time {
                return Err(KlineError::NonMonotonic {
                    previous: pair[0].open_time,
                    next: pair[1].open_time,
                });
            }
        }
        Ok(())
    }

    fn validate_prices(&self, kline: &Kline) -> Result<(), KlineError> {
        for (name, value) in [
            ("open", kline.open),
            ("high", kline.high),
            ("low", kline.low),
            ("close", kline.close),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(kline, format!("invalid {} price: {}", name, value)));
            }
        }
        // Zero volume is normal on quiet pairs
        if kline.volume < 0.0 {
            return Err(invalid(kline, format!("invalid volume: {}", kline.volume)));
        }
        Ok(())
    }

    fn validate_times(&self, kline: &Kline) -> Result<(), KlineError> {
        if kline.open_time >= kline.close_time {
            return Err(invalid(
                kline,
                format!(
                    "close_time {} is not after open_time {}",
                    kline.close_time, kline.open_time
                ),
            ));
        }
        Ok(())
    }

    fn validate_ohlc_relationship(&self, kline: &Kline) -> Result<(), KlineError> {
        if kline.high < kline.low {
            return Err(invalid(
                kline,
                format!("high ({}) is less than low ({})", kline.high, kline.low),
            ));
        }
        if kline.high < kline.open.max(kline.close) {
            return Err(invalid(
                kline,
                format!("high ({}) is below the body", kline.high),
            ));
        }
        if kline.low > kline.open.min(kline.close) {
            return Err(invalid(
                kline,
                format!("low ({}) is above the body", kline.low),
            ));
        }
        Ok(())
    }
}

impl Default for KlineValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(kline: &Kline, reason: String) -> KlineError {
    KlineError::InvalidOhlc {
        open_time: kline.open_time,
        reason,
    }
}
