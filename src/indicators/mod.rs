// Technical indicators module
// Levels, zones, volatility and the moving-average family used by nomination

pub mod macd;
pub mod moving_average;
pub mod price_movement;
pub mod rsi;
pub mod support_resistance;
pub mod volatility;
pub mod zones;

pub use macd::{macd_crossover, Crossover};
pub use moving_average::{calculate_ema, calculate_ema_series, calculate_sma, is_uptrend};
pub use price_movement::{Direction, PriceMovement};
pub use rsi::calculate_rsi;
pub use support_resistance::{
    find_support_resistance, lowest_support, next_support_resistance,
    strongest_support_resistance, support_resistance_range_pct,
};
pub use volatility::{find_outliers_zscore, volatility_factor};
pub use zones::ZoneReport;
