pub mod binance;

pub use binance::{AssetInfo, BinanceClient, MarketDataSource};
