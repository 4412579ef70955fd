// Market data ingestion and order placement
pub mod active_orders;
pub mod kline_store;
pub mod kline_updater;
pub mod order_placer;
pub mod price_feed;

pub use active_orders::ActiveOrders;
pub use kline_store::Series;
pub use kline_updater::{apply_tick, TickOutcome};
pub use order_placer::{DryRunExecutor, OrderExecutor, OrderPlacer};
pub use price_feed::{IngestStats, PriceFeed};
