use serde::{Deserialize, Serialize};

use super::signals::AssetSignals;
use super::TradingStrategy;
use crate::config::TradingConfig;
use crate::models::{NominationResult, OrderRequest, OrderSide, OrderType};

/// Share of the nominated channel kept between a level and the order price
const CHANNEL_OFFSET_RATIO: f64 = 0.02;
const FLASH_BUY_MULTIPLIER: f64 = 8.0;
const FLASH_STOP_MULTIPLIER: f64 = 4.0;

/// Prices and size for one buy, with the exits that would follow it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlan {
    pub symbol: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub stop_loss: f64,
    pub quantity: f64,
}

impl OrderPlan {
    /// Build a plan for a nominee, or None when the strategy places nothing
    /// or the signals lack the levels it prices from.
    pub fn for_nominee(
        strategy: TradingStrategy,
        signals: &AssetSignals,
        nominee: &NominationResult,
        config: &TradingConfig,
    ) -> Option<Self> {
        let (buy, sell, stop) = match strategy {
            TradingStrategy::Test | TradingStrategy::Flash => {
                flash_prices(signals.current_price, config.flash_pct)
            }
            TradingStrategy::SupportResistance => {
                let (support, resistance) = signals.strongest_support_resistance?;
                let lowest = signals.lowest_support?;
                let offset =
                    CHANNEL_OFFSET_RATIO * (nominee.resistance_level - nominee.support_level);
                (support + offset, resistance - offset, lowest - offset)
            }
            TradingStrategy::Suspend => return None,
        };

        let buy_price = round_up_to_nearest(buy, signals.tick_size);
        if buy_price <= 0.0 {
            tracing::warn!(symbol = %signals.symbol, "Non-positive buy price {}, skipping", buy_price);
            return None;
        }

        Some(Self {
            symbol: signals.symbol.clone(),
            buy_price,
            sell_price: round_up_to_nearest(sell, signals.tick_size),
            stop_loss: round_up_to_nearest(stop, signals.tick_size),
            quantity: order_quantity(
                config.order_quote_amount,
                buy_price,
                config.exchange_cost_pct,
                signals.min_qty,
            ),
        })
    }

    /// Quote committed by the buy
    pub fn notional(&self) -> f64 {
        self.buy_price * self.quantity
    }

    pub fn buy_request(&self) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol.clone(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            price: Some(self.buy_price),
            amount: self.quantity,
        }
    }

    /// Take-profit sell of `amount` at the planned target
    pub fn sell_request(&self, amount: f64) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol.clone(),
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            price: Some(self.sell_price),
            amount,
        }
    }
}

fn flash_prices(price: f64, flash_pct: f64) -> (f64, f64, f64) {
    (
        price * (1.0 + FLASH_BUY_MULTIPLIER * flash_pct / 100.0),
        price * (1.0 + flash_pct / 100.0),
        price * (1.0 - FLASH_STOP_MULTIPLIER * flash_pct / 100.0),
    )
}

/// Round `value` up to a multiple of `step`, trimming float noise to the
/// step's decimal places. A non-positive step leaves the value unchanged.
pub fn round_up_to_nearest(value: f64, step: f64) -> f64 {
    if step <= 0.0 || !step.is_finite() {
        return value;
    }
    // 1e-9 keeps exact multiples like 0.3/0.1 from stepping up
    let rounded = ((value / step) - 1e-9).ceil() * step;
    let decimals = decimal_places(step);
    let factor = 10_f64.powi(decimals);
    (rounded * factor).round() / factor
}

fn decimal_places(step: f64) -> i32 {
    let mut decimals = 0;
    let mut scaled = step;
    while decimals < 12 && (scaled - scaled.round()).abs() > 1e-9 {
        scaled *= 10.0;
        decimals += 1;
    }
    decimals
}

/// Base quantity bought for `quote_amount`, net of fees, never below `min_qty`
pub fn order_quantity(quote_amount: f64, buy_price: f64, cost_pct: f64, min_qty: f64) -> f64 {
    if buy_price <= 0.0 {
        return min_qty;
    }
    let quantity = quote_amount / buy_price * (1.0 - cost_pct / 100.0);
    quantity.max(min_qty)
}

/// How many orders the balance can fund this cycle.
///
/// Zero when the balance can't cover one order, or when `placed_quote`
/// already reached a non-zero `max_quote_to_place`.
pub fn affordable_order_count(balance: f64, placed_quote: f64, config: &TradingConfig) -> usize {
    if config.order_quote_amount <= 0.0 || balance < config.order_quote_amount {
        return 0;
    }
    if config.max_quote_to_place > 0.0 && placed_quote >= config.max_quote_to_place {
        return 0;
    }
    (balance / config.order_quote_amount).floor() as usize
}
