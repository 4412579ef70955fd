use anyhow::{Context, Result};
use clap::Parser;
use srbot::api::{BinanceClient, MarketDataSource};
use srbot::config::BotConfig;
use srbot::context::BotContext;
use srbot::execution::order_placer::{DryRunExecutor, OrderExecutor};
use srbot::scheduler::{kline_refresh_loop, nomination_loop, price_loop, refresh_klines};
use srbot::strategy::TradingStrategy;
use srbot::universe::Universe;
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_LOG_FILTER: &str = "srbot=info";

#[derive(Parser, Debug)]
#[command(author, version, about = "Support/resistance trading bot", long_about = None)]
struct Args {
    /// TOML config file (defaults to ./srbot.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override trading.strategy (test, support_resistance, flash, suspend)
    #[arg(long)]
    strategy: Option<TradingStrategy>,

    /// tracing filter directive; RUST_LOG wins when set
    #[arg(long)]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    setup_logging(args.log_filter.as_deref());

    tracing::info!("🚀 srbot starting");

    let mut config = BotConfig::load(args.config.as_deref())?;
    if let Some(strategy) = args.strategy {
        config.trading.strategy = strategy;
    }

    let client = BinanceClient::new(
        config.market.base_url.clone(),
        config.market.requests_per_minute,
    )
    .context("Failed to build market data client")?;
    let market_data: Arc<dyn MarketDataSource> = Arc::new(client);

    // ========================================================================
    // Universe (fatal on failure)
    // ========================================================================
    tracing::info!("🔍 Loading {} universe...", config.market.quote_asset);
    let infos = market_data
        .fetch_universe(&config.market.quote_asset)
        .await
        .context("Failed to load asset universe")?;
    let universe = Universe::from_infos(infos, &config);
    if universe.is_empty() {
        anyhow::bail!("No tradable {} symbols found", config.market.quote_asset);
    }
    tracing::info!("✅ Universe loaded: {} symbols", universe.len());

    let executor = build_executor(&config, &universe)?;
    let ctx = BotContext::new(config, universe, market_data, executor);

    refresh_klines(&ctx).await;
    log_configuration(&ctx);

    // ========================================================================
    // Loops
    // ========================================================================
    tracing::info!("🔄 Spawning loops...");
    let tasks = vec![
        ("price", tokio::spawn(price_loop(ctx.clone()))),
        ("kline refresh", tokio::spawn(kline_refresh_loop(ctx.clone()))),
        ("nomination", tokio::spawn(nomination_loop(ctx.clone()))),
    ];
    tracing::info!("Press Ctrl+C to stop...");

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("⚠️  Received Ctrl+C, shutting down..."),
        Err(e) => tracing::error!("Failed to listen for Ctrl+C, shutting down: {}", e),
    }
    ctx.shutdown.trigger();

    for (name, task) in tasks {
        if let Err(e) = task.await {
            tracing::error!("{} loop panicked: {}", name, e);
        }
    }

    tracing::info!("👋 srbot stopped");
    Ok(())
}

fn setup_logging(filter: Option<&str>) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter.unwrap_or(DEFAULT_LOG_FILTER)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_executor(config: &BotConfig, universe: &Universe) -> Result<Arc<dyn OrderExecutor>> {
    if !config.trading.dry_run {
        anyhow::bail!("Live order execution is not available; set trading.dry_run = true");
    }
    Ok(Arc::new(DryRunExecutor::new(
        config.market.quote_asset.clone(),
        config.trading.dry_run_balance,
        universe.clone(),
    )))
}

fn log_configuration(ctx: &BotContext) {
    let config = &ctx.config;
    tracing::info!("📊 Configuration:");
    tracing::info!("  Strategy: {}", config.trading.strategy);
    tracing::info!("  Cover interval: {}", config.market.cover_interval);
    tracing::info!("  Bars per series: {}", config.market.kline_limit);
    tracing::info!(
        "  Order size: {} {} (cap {})",
        config.trading.order_quote_amount,
        config.market.quote_asset,
        config.trading.max_quote_to_place
    );
    tracing::info!("  Dry run: {}", config.trading.dry_run);
    for summary in ctx
        .universe
        .tag_summaries(config.signals.short_ma_period, config.signals.long_ma_period)
    {
        tracing::info!(
            "    {} - {} assets, {:.0}% uptrend, {:+.2}% since open",
            summary.tag,
            summary.asset_count,
            summary.uptrend_pct,
            summary.avg_price_change_pct
        );
    }
}
