// Core modules
pub mod api;
pub mod backfill;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod scheduler;
pub mod strategy;
pub mod universe;

// Re-export commonly used types
pub use api::*;
pub use models::*;
pub use strategy::TradingStrategy;
