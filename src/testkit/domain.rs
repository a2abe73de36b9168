//! Builders for domain values used across the test suites.

use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::{
    Balance, CrossMetrics, CrossOpportunity, ExecutedOrder, LegQuote, LegSide, OrderSide,
    OrderStatus, PriceTick, Symbol, TriangularOpportunity, Venue,
};
use crate::exchange::{Levels, MarketEvent};

pub fn sym(s: &str) -> Symbol {
    Symbol::parse(s).expect("test symbol")
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn tick(venue: Venue, symbol: &str, last: Decimal, timestamp_ms: i64) -> PriceTick {
    let spread = last * Decimal::new(1, 4); // 1 bp
    PriceTick {
        venue,
        symbol: sym(symbol),
        last,
        bid: last - spread,
        ask: last + spread,
        volume_24h: Decimal::from(1000),
        timestamp_ms,
    }
}

pub fn snapshot_event(
    venue: Venue,
    symbol: &str,
    bids: Levels,
    asks: Levels,
    last_update_id: u64,
    timestamp_ms: i64,
) -> MarketEvent {
    MarketEvent::BookSnapshot {
        venue,
        symbol: sym(symbol),
        bids,
        asks,
        last_update_id,
        timestamp_ms,
    }
}

/// A closed, fully filled order with fee at the venue's taker rate.
pub fn filled_order(
    venue: Venue,
    symbol: &str,
    side: OrderSide,
    amount: Decimal,
    price: Decimal,
) -> ExecutedOrder {
    let cost = price * amount;
    ExecutedOrder {
        order_id: uuid::Uuid::new_v4().to_string(),
        venue,
        symbol: sym(symbol),
        side,
        status: OrderStatus::Closed,
        amount,
        filled: amount,
        average_price: price,
        cost,
        fee: cost * venue.taker_fee(),
        timestamp_ms: now_ms(),
    }
}

/// The same order in a non-terminal state with nothing filled yet.
pub fn open_order(order: &ExecutedOrder) -> ExecutedOrder {
    ExecutedOrder {
        status: OrderStatus::Open,
        filled: Decimal::ZERO,
        cost: Decimal::ZERO,
        fee: Decimal::ZERO,
        average_price: Decimal::ZERO,
        ..order.clone()
    }
}

pub fn balance(venue: Venue, currency: &str, free: Decimal) -> Balance {
    Balance {
        venue,
        currency: currency.to_string(),
        free,
        used: Decimal::ZERO,
        total: free,
        last_update_ms: now_ms(),
    }
}

pub fn cross_opportunity(
    symbol: &str,
    buy_venue: Venue,
    sell_venue: Venue,
    trade_size: Decimal,
    buy_price: Decimal,
    sell_price: Decimal,
) -> CrossOpportunity {
    let net_profit = (sell_price - buy_price) * trade_size;
    let invested = buy_price * trade_size;
    CrossOpportunity {
        id: uuid::Uuid::new_v4().to_string(),
        symbol: sym(symbol),
        buy_venue,
        sell_venue,
        buy_price,
        sell_price,
        trade_size,
        net_profit,
        net_profit_percent: if invested.is_zero() {
            Decimal::ZERO
        } else {
            net_profit / invested * Decimal::ONE_HUNDRED
        },
        created_at_ms: now_ms(),
        metrics: CrossMetrics {
            effective_buy_price: buy_price,
            effective_sell_price: sell_price,
            buy_slippage_percent: Decimal::ZERO,
            sell_slippage_percent: Decimal::ZERO,
            fees: Decimal::ZERO,
            available_liquidity: Decimal::from(30_000),
            confidence: 80.0,
            liquidity_score: 100.0,
            spread_impact: 0.01,
        },
    }
}

pub fn triangular_opportunity(
    venue: Venue,
    start_amount: Decimal,
    end_amount: Decimal,
) -> TriangularOpportunity {
    let leg = |symbol: &str, side: LegSide, price: Decimal| LegQuote {
        symbol: sym(symbol),
        side,
        price,
        effective_price: price,
        fee: Decimal::ZERO,
        slippage_percent: Decimal::ZERO,
    };
    TriangularOpportunity {
        id: uuid::Uuid::new_v4().to_string(),
        venue,
        legs: [
            leg("BTC/USDT", LegSide::Buy, Decimal::from(60_000)),
            leg("ETH/BTC", LegSide::Buy, Decimal::new(5, 2)),
            leg("ETH/USDT", LegSide::Sell, Decimal::from(3_030)),
        ],
        start_amount,
        end_amount,
        confidence: 80.0,
        execution_hint_ms: 900,
        created_at_ms: now_ms(),
        valid: true,
    }
}
