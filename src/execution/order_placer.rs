use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::{sleep, Duration};
use uuid::Uuid;

use super::active_orders::ActiveOrders;
use crate::error::OrderError;
use crate::models::{OrderHandle, OrderRequest, OrderSide, OrderType, ORDER_HANDLE_VERSION};
use crate::universe::Universe;

/// The exchange side of order placement
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderHandle, OrderError>;

    /// Free balance of one asset (e.g. the quote asset)
    async fn available_balance(&self, asset: &str) -> Result<f64, OrderError>;
}

/// Places orders with bounded retries and a market-order fallback
pub struct OrderPlacer {
    executor: Arc<dyn OrderExecutor>,
    universe: Universe,
    active_orders: ActiveOrders,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl OrderPlacer {
    pub fn new(
        executor: Arc<dyn OrderExecutor>,
        universe: Universe,
        active_orders: ActiveOrders,
        max_attempts: u32,
        initial_backoff: Duration,
    ) -> Self {
        Self {
            executor,
            universe,
            active_orders,
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// Place `request`, retrying network failures with exponential backoff.
    ///
    /// A limit order that still fails after the last attempt is resubmitted
    /// once as a market order. Domain-rule rejections blacklist the symbol and
    /// are never retried.
    pub async fn place(&self, request: &OrderRequest) -> Result<OrderHandle, OrderError> {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.submit(request).await {
                Ok(handle) => {
                    if attempt > 1 {
                        tracing::info!(
                            symbol = %request.symbol,
                            "✓ Order placed after {} attempts",
                            attempt
                        );
                    }
                    return Ok(handle);
                }
                Err(e) if e.is_transient() => {
                    if attempt < self.max_attempts {
                        let backoff = self
                            .initial_backoff
                            .saturating_mul(2_u32.saturating_pow(attempt - 1));
                        tracing::warn!(
                            symbol = %request.symbol,
                            "Attempt {}/{} failed: {}. Retrying in {:?}...",
                            attempt,
                            self.max_attempts,
                            e,
                            backoff
                        );
                        sleep(backoff).await;
                    }
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        if request.order_type == OrderType::Limit {
            tracing::warn!(
                symbol = %request.symbol,
                "Limit order failed {} times, falling back to market",
                self.max_attempts
            );
            let market = OrderRequest {
                order_type: OrderType::Market,
                price: None,
                ..request.clone()
            };
            return self.submit(&market).await;
        }

        Err(last_error
            .unwrap_or_else(|| OrderError::Network("all retry attempts failed".to_string())))
    }

    async fn submit(&self, request: &OrderRequest) -> Result<OrderHandle, OrderError> {
        match self.executor.place_order(request).await {
            Ok(handle) => {
                // A symbol stays live only while its buy is still working
                if handle.is_terminal() {
                    self.active_orders.remove(&request.symbol);
                } else if request.side == OrderSide::Buy {
                    self.active_orders.insert(&request.symbol);
                }
                tracing::info!(
                    symbol = %request.symbol,
                    order_id = %handle.id,
                    "📝 {:?} {:?} order accepted ({:?})",
                    request.side,
                    request.order_type,
                    handle.status
                );
                Ok(handle)
            }
            Err(OrderError::DomainRule(reason)) => {
                tracing::warn!(
                    symbol = %request.symbol,
                    "Exchange refuses symbol, blacklisting: {}",
                    reason
                );
                self.universe.blacklist(&request.symbol);
                Err(OrderError::DomainRule(reason))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn available_balance(&self, asset: &str) -> Result<f64, OrderError> {
        self.executor.available_balance(asset).await
    }
}

/// Simulated exchange: fills every order immediately against a quote balance
pub struct DryRunExecutor {
    quote_asset: String,
    balance: Mutex<f64>,
    universe: Universe,
}

impl DryRunExecutor {
    pub fn new(quote_asset: impl Into<String>, balance: f64, universe: Universe) -> Self {
        Self {
            quote_asset: quote_asset.into(),
            balance: Mutex::new(balance),
            universe,
        }
    }

    fn fill_price(&self, request: &OrderRequest) -> Result<f64, OrderError> {
        match (request.order_type, request.price) {
            (OrderType::Limit, Some(price)) => Ok(price),
            _ => self
                .universe
                .get(&request.symbol)
                .map(|a| a.current_price)
                .filter(|p| *p > 0.0)
                .ok_or_else(|| OrderError::Rejected(format!("no price for {}", request.symbol))),
        }
    }
}

#[async_trait]
impl OrderExecutor for DryRunExecutor {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderHandle, OrderError> {
        let price = self.fill_price(request)?;
        let notional = price * request.amount;

        {
            let mut balance = self.balance.lock().unwrap_or_else(PoisonError::into_inner);
            match request.side {
                OrderSide::Buy if notional > *balance => {
                    return Err(OrderError::Rejected(
                        "Account has insufficient balance".to_string(),
                    ));
                }
                OrderSide::Buy => *balance -= notional,
                OrderSide::Sell => *balance += notional,
            }
        }

        Ok(OrderHandle {
            version: ORDER_HANDLE_VERSION,
            id: Uuid::new_v4().to_string(),
            symbol: Some(request.symbol.clone()),
            side: Some(format!("{:?}", request.side).to_lowercase()),
            status: Some("closed".to_string()),
            average_fill_price: Some(price),
            filled_amount: Some(request.amount),
        })
    }

    async fn available_balance(&self, asset: &str) -> Result<f64, OrderError> {
        if asset.eq_ignore_ascii_case(&self.quote_asset) {
            Ok(*self.balance.lock().unwrap_or_else(PoisonError::into_inner))
        } else {
            Ok(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AssetInfo;
    use crate::universe::Asset;
    use std::collections::VecDeque;

    /// Replays scripted outcomes and records what it was asked to do
    struct ScriptedExecutor {
        outcomes: Mutex<VecDeque<Result<(), OrderError>>>,
        requests: Mutex<Vec<OrderRequest>>,
    }

    impl ScriptedExecutor {
        fn new(outcomes: Vec<Result<(), OrderError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<OrderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OrderExecutor for ScriptedExecutor {
        async fn place_order(&self, request: &OrderRequest) -> Result<OrderHandle, OrderError> {
            self.requests.lock().unwrap().push(request.clone());
            let outcome = self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()));
            outcome.map(|_| OrderHandle {
                version: ORDER_HANDLE_VERSION,
                id: "1".to_string(),
                symbol: Some(request.symbol.clone()),
                side: None,
                status: Some("open".to_string()),
                average_fill_price: None,
                filled_amount: None,
            })
        }

        async fn available_balance(&self, _asset: &str) -> Result<f64, OrderError> {
            Ok(100.0)
        }
    }

    fn universe_with(symbol: &str, price: f64) -> Universe {
        let universe = Universe::new();
        universe.insert(Asset::new(
            AssetInfo {
                symbol: symbol.to_string(),
                base_asset: "X".to_string(),
                quote_asset: "USDT".to_string(),
                tick_size: 0.01,
                min_qty: 0.001,
                opening_price: price,
                current_price: price,
                quote_volume: 0.0,
            },
            vec![],
            200,
            900_000,
        ));
        universe
    }

    fn limit_buy(symbol: &str) -> OrderRequest {
        OrderRequest {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            price: Some(2.0),
            amount: 5.0,
        }
    }

    fn placer(executor: Arc<ScriptedExecutor>, universe: Universe, active: ActiveOrders) -> OrderPlacer {
        OrderPlacer::new(executor, universe, active, 3, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_success_marks_active_order() {
        let executor = ScriptedExecutor::new(vec![Ok(())]);
        let active = ActiveOrders::new();
        let placer = placer(executor.clone(), universe_with("AUSDT", 2.0), active.clone());

        let handle = placer.place(&limit_buy("AUSDT")).await.unwrap();

        assert_eq!(handle.id, "1");
        assert!(active.contains("AUSDT"));
        assert_eq!(executor.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_filled_dry_run_buy_releases_symbol() {
        let universe = universe_with("AUSDT", 2.0);
        let active = ActiveOrders::new();
        let executor = Arc::new(DryRunExecutor::new("USDT", 100.0, universe.clone()));
        let placer = OrderPlacer::new(executor, universe, active.clone(), 3, Duration::ZERO);

        let handle = placer.place(&limit_buy("AUSDT")).await.unwrap();

        assert!(handle.is_terminal());
        assert!(!active.contains("AUSDT"));
        assert!(!active.snapshot().contains("AUSDT"));
    }

    #[tokio::test]
    async fn test_large_attempt_count_does_not_overflow_backoff() {
        let network = || Err(OrderError::Network("timeout".to_string()));
        let executor = ScriptedExecutor::new((0..40).map(|_| network()).collect());
        let placer = OrderPlacer::new(
            executor.clone(),
            universe_with("AUSDT", 2.0),
            ActiveOrders::new(),
            40,
            Duration::ZERO,
        );

        placer.place(&limit_buy("AUSDT")).await.unwrap();
        assert_eq!(executor.requests().len(), 41);
    }

    #[tokio::test]
    async fn test_network_errors_retry_then_fall_back_to_market() {
        let network = || Err(OrderError::Network("timeout".to_string()));
        let executor = ScriptedExecutor::new(vec![network(), network(), network(), Ok(())]);
        let placer = placer(executor.clone(), universe_with("AUSDT", 2.0), ActiveOrders::new());

        placer.place(&limit_buy("AUSDT")).await.unwrap();

        let requests = executor.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests[..3].iter().all(|r| r.order_type == OrderType::Limit));
        assert_eq!(requests[3].order_type, OrderType::Market);
        assert_eq!(requests[3].price, None);
    }

    #[tokio::test]
    async fn test_domain_rule_blacklists_without_retry() {
        let executor = ScriptedExecutor::new(vec![Err(OrderError::from_exchange_message(
            "Filter failure: NOTIONAL",
        ))]);
        let universe = universe_with("AUSDT", 2.0);
        let active = ActiveOrders::new();
        let placer = placer(executor.clone(), universe.clone(), active.clone());

        let result = placer.place(&limit_buy("AUSDT")).await;

        assert!(matches!(result, Err(OrderError::DomainRule(_))));
        assert_eq!(executor.requests().len(), 1);
        assert!(universe.get("AUSDT").unwrap().blacklisted);
        assert!(!active.contains("AUSDT"));
    }

    #[tokio::test]
    async fn test_rejection_is_returned_immediately() {
        let executor = ScriptedExecutor::new(vec![Err(OrderError::Rejected("nope".to_string()))]);
        let placer = placer(executor.clone(), universe_with("AUSDT", 2.0), ActiveOrders::new());

        assert!(placer.place(&limit_buy("AUSDT")).await.is_err());
        assert_eq!(executor.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_fills_and_tracks_balance() {
        let universe = universe_with("AUSDT", 3.0);
        let executor = DryRunExecutor::new("USDT", 20.0, universe);

        let handle = executor.place_order(&limit_buy("AUSDT")).await.unwrap();
        assert_eq!(handle.average_fill_price, Some(2.0));
        assert_eq!(handle.filled_amount, Some(5.0));
        assert_eq!(executor.available_balance("USDT").await.unwrap(), 10.0);
        assert_eq!(executor.available_balance("BTC").await.unwrap(), 0.0);

        let market_sell = OrderRequest {
            side: OrderSide::Sell,
            order_type: OrderType::Market,
            price: None,
            ..limit_buy("AUSDT")
        };
        let handle = executor.place_order(&market_sell).await.unwrap();
        assert_eq!(handle.average_fill_price, Some(3.0));
        assert_eq!(executor.available_balance("USDT").await.unwrap(), 25.0);
    }

    #[test]
    fn test_dry_run_rejects_overspend() {
        let executor = DryRunExecutor::new("USDT", 5.0, universe_with("AUSDT", 2.0));
        let result = tokio_test::block_on(executor.place_order(&limit_buy("AUSDT")));
        assert!(matches!(result, Err(OrderError::Rejected(_))));
    }
}
