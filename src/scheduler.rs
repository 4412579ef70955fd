// Long-running tasks spawned by main
// Each loop polls the shutdown flag on every tick and after every await

use std::collections::HashSet;
use tokio::time::{interval, sleep, Duration, Interval, MissedTickBehavior};

use crate::backfill::{backfill_universe, BackfillStats};
use crate::context::{BotContext, ShutdownFlag};
use crate::execution::order_placer::OrderPlacer;
use crate::execution::price_feed::PriceFeed;
use crate::models::{realized_pnl, OrderHandle, TradeRecord};
use crate::strategy::order_plan::affordable_order_count;
use crate::strategy::{NominationEngine, OrderPlan, TradingStrategy};

/// Longest a sleeping loop goes without looking at the shutdown flag
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Log target of the per-trade JSON records
pub const TRADE_LOG_TARGET: &str = "srbot::trade_log";

/// What one nomination cycle did
#[derive(Debug, Clone, Default)]
pub struct TradeCycleReport {
    pub nominated: usize,
    pub planned: usize,
    pub placed: Vec<TradeRecord>,
    pub failed: usize,
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Wait for the next tick. False once shutdown is requested.
pub async fn next_tick(ticker: &mut Interval, shutdown: &ShutdownFlag) -> bool {
    loop {
        if shutdown.is_set() {
            return false;
        }
        tokio::select! {
            _ = ticker.tick() => return !shutdown.is_set(),
            _ = sleep(SHUTDOWN_POLL) => {}
        }
    }
}

// ============================================================================
// Price ingestion
// ============================================================================

pub async fn price_loop(ctx: BotContext) {
    tracing::info!("🔄 Price loop starting...");
    let feed = PriceFeed::new(
        ctx.market_data.clone(),
        ctx.universe.clone(),
        ctx.config.signals.outlier_zscore_threshold,
    );
    let mut ticker = ticker(Duration::from_secs(ctx.config.schedule.price_update_interval_secs));

    while next_tick(&mut ticker, &ctx.shutdown).await {
        if let Err(e) = feed.ingest().await {
            tracing::warn!("Price poll failed, keeping previous state: {}", e);
        }
    }
    tracing::info!("Price loop stopped");
}

// ============================================================================
// Kline refresh
// ============================================================================

pub async fn kline_refresh_loop(ctx: BotContext) {
    tracing::info!("🔄 Kline refresh loop starting...");
    let mut ticker = ticker(Duration::from_secs(
        ctx.config.schedule.kline_refresh_interval_secs,
    ));
    // The startup backfill already ran; skip the immediate first tick
    ticker.reset();

    while next_tick(&mut ticker, &ctx.shutdown).await {
        refresh_klines(&ctx).await;
    }
    tracing::info!("Kline refresh loop stopped");
}

pub async fn refresh_klines(ctx: &BotContext) -> BackfillStats {
    backfill_universe(ctx.market_data.clone(), &ctx.universe, &ctx.config.market).await
}

// ============================================================================
// Nomination and order placement
// ============================================================================

pub async fn nomination_loop(ctx: BotContext) {
    let strategy = ctx.config.trading.strategy;
    tracing::info!("💹 Nomination loop starting (strategy: {})", strategy);

    let engine = NominationEngine::new(ctx.config.signals.clone());
    let mut placed_quote = 0.0;
    let mut ticker = ticker(Duration::from_secs(ctx.config.schedule.nomination_interval_secs));

    while next_tick(&mut ticker, &ctx.shutdown).await {
        let report = trade_once(&ctx, &engine, strategy, &mut placed_quote).await;
        tracing::info!(
            "Cycle: {} nominated, {} planned, {} placed, {} failed (placed so far {:.2} {})",
            report.nominated,
            report.planned,
            report.placed.len(),
            report.failed,
            placed_quote,
            ctx.config.market.quote_asset
        );
    }
    tracing::info!("Nomination loop stopped");
}

/// Nominate, then plan and place as many buys as the balance allows.
///
/// `placed_quote` accumulates the quote committed across cycles.
pub async fn trade_once(
    ctx: &BotContext,
    engine: &NominationEngine,
    strategy: TradingStrategy,
    placed_quote: &mut f64,
) -> TradeCycleReport {
    let active: HashSet<String> = ctx.active_orders.snapshot();
    let nominees = engine.run_cycle(&ctx.universe, strategy, &active);

    let mut report = TradeCycleReport {
        nominated: nominees.len(),
        ..TradeCycleReport::default()
    };

    if strategy == TradingStrategy::Suspend {
        tracing::info!("Trading is suspended, results recorded only");
        return report;
    }
    if nominees.is_empty() {
        return report;
    }

    let placer = ctx.order_placer();
    let quote = &ctx.config.market.quote_asset;
    let balance = match placer.available_balance(quote).await {
        Ok(balance) => balance,
        Err(e) => {
            tracing::warn!("Balance check failed, skipping cycle: {}", e);
            return report;
        }
    };

    let affordable = affordable_order_count(balance, *placed_quote, &ctx.config.trading);
    if affordable == 0 {
        tracing::info!(
            "Balance or limits check failed ({:.2} {}, placed {:.2}). Skipping order creation.",
            balance,
            quote,
            placed_quote
        );
        return report;
    }

    for (nominee, signals) in nominees.into_iter().take(affordable) {
        if ctx.is_shutting_down() {
            break;
        }
        let Some(plan) = OrderPlan::for_nominee(strategy, &signals, &nominee, &ctx.config.trading)
        else {
            continue;
        };
        report.planned += 1;

        tracing::info!(
            symbol = %plan.symbol,
            "Buy {} @ {} (sell {}, stop {})",
            plan.quantity,
            plan.buy_price,
            plan.sell_price,
            plan.stop_loss
        );

        match placer.place(&plan.buy_request()).await {
            Ok(handle) => {
                *placed_quote += plan.notional();
                let pnl =
                    close_filled_buy(&placer, &plan, &handle, ctx.config.trading.exchange_cost_pct)
                        .await;
                let record = TradeRecord::authorized(
                    signals.snapshot(nominee.test_results.clone()),
                    Some(handle),
                )
                .with_pnl(pnl);
                match serde_json::to_string(&record) {
                    Ok(json) => tracing::info!(target: TRADE_LOG_TARGET, "{}", json),
                    Err(e) => tracing::warn!("Failed to serialize trade record: {}", e),
                }
                report.placed.push(record);
            }
            Err(e) => {
                tracing::warn!(symbol = %plan.symbol, "Order failed: {}", e);
                report.failed += 1;
            }
        }
    }

    report
}

/// Sell a filled buy at the plan's target and return the realized P&L.
///
/// None while the buy is still working or when the sell does not fill.
async fn close_filled_buy(
    placer: &OrderPlacer,
    plan: &OrderPlan,
    buy: &OrderHandle,
    cost_pct: f64,
) -> Option<f64> {
    let (buy_price, bought) = buy.fill()?;
    match placer.place(&plan.sell_request(bought)).await {
        Ok(sell) => {
            let (sell_price, sold) = sell.fill()?;
            let pnl = realized_pnl(buy_price, bought, sell_price, sold, cost_pct);
            tracing::info!(symbol = %plan.symbol, "💰 Trade closed, P&L {:+.6}", pnl);
            Some(pnl)
        }
        Err(e) => {
            tracing::warn!(symbol = %plan.symbol, "Sell failed: {}", e);
            None
        }
    }
}
