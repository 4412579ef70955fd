use thiserror::Error;

/// Signal derivation could not run on the supplied data
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("insufficient bars: need at least {required}, got {actual}")]
    InsufficientBars { required: usize, actual: usize },
}

/// A kline or series violates its shape or ordering invariants
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KlineError {
    #[error("malformed kline: {0}")]
    Malformed(String),
    #[error("non-monotonic open_time: {next} does not follow {previous}")]
    NonMonotonic { previous: i64, next: i64 },
    #[error("invalid OHLC at {open_time}: {reason}")]
    InvalidOhlc { open_time: i64, reason: String },
    #[error("series is empty")]
    EmptySeries,
    #[error("unknown series {0}")]
    UnknownSeries(String),
}

/// Transient failures talking to the market data source
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(String),
    #[error(transparent)]
    Kline(#[from] KlineError),
}

/// Failures reported by the order execution collaborator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    /// Transient, worth retrying
    #[error("network error: {0}")]
    Network(String),
    /// The exchange refuses this symbol for good (blacklist, never retry)
    #[error("domain rule violation: {0}")]
    DomainRule(String),
    #[error("order rejected: {0}")]
    Rejected(String),
}

impl OrderError {
    /// Classify a raw exchange error message
    pub fn from_exchange_message(message: &str) -> Self {
        if message.contains("Filter failure: NOTIONAL")
            || message.contains("This symbol is not permitted for this account")
        {
            OrderError::DomainRule(message.to_string())
        } else {
            OrderError::Rejected(message.to_string())
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, OrderError::Network(_))
    }
}
