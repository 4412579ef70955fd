use anyhow::{Context, Result};
use clap::Parser;
use srbot::api::BinanceClient;
use srbot::backfill::fetch_series;
use srbot::config::BotConfig;
use srbot::indicators::support_resistance::{
    find_support_resistance, lowest_support, next_support_resistance,
    strongest_support_resistance, support_resistance_range_pct,
};
use srbot::indicators::volatility::volatility_factor;
use srbot::indicators::zones::ZoneReport;
use srbot::models::{interval_to_ms, Kline, Timeframe, Zone};

/// Fetch one series and print its levels, derived metrics and zones
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long)]
    symbol: String,

    /// Exchange interval label; "1m" uses the one-minute swing shift
    #[arg(long, default_value = "1m")]
    interval: String,

    #[arg(long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("srbot=warn")
        .init();

    let args = Args::parse();
    let config = BotConfig::load(None)?;
    let symbol = args.symbol.to_uppercase();
    let interval_ms = interval_to_ms(&args.interval)
        .with_context(|| format!("Unsupported interval: {}", args.interval))?;
    let limit = args.limit.unwrap_or(config.market.kline_limit);
    let timeframe = if args.interval == "1m" {
        Timeframe::OneMinute
    } else {
        Timeframe::Cover
    };

    let client = BinanceClient::new(config.market.base_url.clone(), config.market.requests_per_minute)?;
    let series = fetch_series(&client, &symbol, &args.interval, interval_ms, limit).await?;
    let klines = series.klines();

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║  {:<14} {:>4} x {:<4}                            ║", symbol, klines.len(), args.interval);
    println!("╚═══════════════════════════════════════════════════════╝");

    let signals = &config.signals;
    let (supports, resistances) = find_support_resistance(
        klines,
        timeframe,
        signals.support_closeness_threshold_pct,
        signals.resistance_closeness_threshold_pct,
    )?;

    println!("\n📉 Supports ({}):", supports.len());
    for level in &supports {
        println!("   {:>14.8}  strength {}", level.price, level.strength);
    }
    println!("\n📈 Resistances ({}):", resistances.len());
    for level in &resistances {
        println!("   {:>14.8}  strength {}", level.price, level.strength);
    }

    let next = next_support_resistance(&supports, &resistances);
    println!("\n📊 Metrics:");
    println!("   Strongest:   {}", pair(strongest_support_resistance(&supports, &resistances)));
    println!("   Next:        {}", pair(next));
    println!("   Range:       {:.2}%", support_resistance_range_pct(next));
    println!("   Lowest:      {}", option(lowest_support(&supports)));
    println!("   Volatility:  {}", option(volatility_factor(klines)));

    let zones = ZoneReport::compute(klines, signals.base_candle_count);
    println!("\n🧱 Zones:");
    println!("   Demand:           {}", zone(zones.demand_zone.as_ref(), klines));
    println!("   Supply:           {}", zone(zones.supply_zone.as_ref(), klines));
    println!("   Immediate demand: {}", zone(zones.immediate_demand_zone.as_ref(), klines));
    println!("   Prior supply:     {}", zone(zones.prior_supply_zone.as_ref(), klines));
    println!("   Structure broken: {}", zones.structure_broken);

    // Buy the top of demand, target the bottom of supply, stop under demand
    if let (Some(demand), Some(supply)) = (&zones.demand_zone, &zones.supply_zone) {
        println!(
            "   Demand -> supply R:R >= 3: {}",
            Zone::has_valid_risk_to_reward(demand.high, supply.low, demand.low)
        );
    }

    Ok(())
}

fn pair(value: Option<(f64, f64)>) -> String {
    match value {
        Some((support, resistance)) => format!("{:.8} / {:.8}", support, resistance),
        None => "-".to_string(),
    }
}

fn option(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.8}", v))
}

fn zone(zone: Option<&Zone>, klines: &[Kline]) -> String {
    match zone {
        Some(z) => format!(
            "{:.8} - {:.8} (fresh: {}, strength {:.2})",
            z.low,
            z.high,
            z.fresh,
            z.strength(klines)
        ),
        None => "-".to_string(),
    }
}
