use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::api::MarketDataSource;
use crate::config::BotConfig;
use crate::execution::active_orders::ActiveOrders;
use crate::execution::order_placer::{OrderExecutor, OrderPlacer};
use crate::universe::Universe;

/// Cooperative cancellation shared by every loop
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a task needs, built once at startup and cloned into each task
#[derive(Clone)]
pub struct BotContext {
    pub config: Arc<BotConfig>,
    pub universe: Universe,
    pub active_orders: ActiveOrders,
    pub shutdown: ShutdownFlag,
    pub market_data: Arc<dyn MarketDataSource>,
    pub executor: Arc<dyn OrderExecutor>,
}

impl BotContext {
    pub fn new(
        config: BotConfig,
        universe: Universe,
        market_data: Arc<dyn MarketDataSource>,
        executor: Arc<dyn OrderExecutor>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            universe,
            active_orders: ActiveOrders::new(),
            shutdown: ShutdownFlag::new(),
            market_data,
            executor,
        }
    }

    pub fn order_placer(&self) -> OrderPlacer {
        OrderPlacer::new(
            self.executor.clone(),
            self.universe.clone(),
            self.active_orders.clone(),
            self.config.trading.order_max_attempts,
            Duration::from_millis(self.config.trading.order_initial_backoff_ms),
        )
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_flag_is_shared() {
        let flag = ShutdownFlag::new();
        let other = flag.clone();
        assert!(!other.is_set());

        flag.trigger();
        assert!(other.is_set());
    }
}
