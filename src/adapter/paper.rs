//! Paper trading API for `TEST_MODE`.
//!
//! Fills orders against the live book replicas with the venue's taker fee,
//! so the whole pipeline (locks, execution, reconciliation, journal) runs
//! end to end without credentials or real orders.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::{
    Balance, BookSide, ExecutedOrder, OrderSide, OrderStatus, Symbol, Venue,
};
use crate::error::{Error, Result};
use crate::exchange::TradingApi;
use crate::registry::BookRegistry;

#[derive(Default)]
struct PaperState {
    /// Free funds per (venue, currency).
    funds: HashMap<(Venue, String), Decimal>,
    orders: HashMap<String, ExecutedOrder>,
}

pub struct PaperTradingApi {
    books: Arc<BookRegistry>,
    state: Mutex<PaperState>,
}

impl PaperTradingApi {
    pub fn new(books: Arc<BookRegistry>) -> Self {
        Self {
            books,
            state: Mutex::new(PaperState::default()),
        }
    }

    pub fn seed_balance(&self, venue: Venue, currency: &str, amount: Decimal) {
        self.state
            .lock()
            .funds
            .insert((venue, currency.to_string()), amount);
    }

    fn fill(
        &self,
        venue: Venue,
        symbol: &Symbol,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
    ) -> ExecutedOrder {
        let cost = price * amount;
        let fee = cost * venue.taker_fee();
        let order = ExecutedOrder {
            order_id: uuid::Uuid::new_v4().to_string(),
            venue,
            symbol: symbol.clone(),
            side,
            status: OrderStatus::Closed,
            amount,
            filled: amount,
            average_price: price,
            cost,
            fee,
            timestamp_ms: Utc::now().timestamp_millis(),
        };

        let mut state = self.state.lock();
        let base = symbol.base().to_string();
        let quote = symbol.quote().to_string();
        match side {
            OrderSide::Buy => {
                *state.funds.entry((venue, quote)).or_default() -= cost + fee;
                *state.funds.entry((venue, base)).or_default() += amount;
            }
            OrderSide::Sell => {
                *state.funds.entry((venue, base)).or_default() -= amount;
                *state.funds.entry((venue, quote)).or_default() += cost - fee;
            }
        }
        state.orders.insert(order.order_id.clone(), order.clone());
        debug!(
            venue = %venue,
            symbol = %symbol,
            side = ?side,
            %amount,
            %price,
            "Paper fill"
        );
        order
    }

    fn reject(
        &self,
        venue: Venue,
        symbol: &Symbol,
        side: OrderSide,
        amount: Decimal,
        reason: &str,
    ) -> ExecutedOrder {
        let order = ExecutedOrder {
            order_id: uuid::Uuid::new_v4().to_string(),
            venue,
            symbol: symbol.clone(),
            side,
            status: OrderStatus::Rejected,
            amount,
            filled: Decimal::ZERO,
            average_price: Decimal::ZERO,
            cost: Decimal::ZERO,
            fee: Decimal::ZERO,
            timestamp_ms: Utc::now().timestamp_millis(),
        };
        debug!(venue = %venue, symbol = %symbol, reason, "Paper order rejected");
        self.state
            .lock()
            .orders
            .insert(order.order_id.clone(), order.clone());
        order
    }
}

#[async_trait]
impl TradingApi for PaperTradingApi {
    async fn create_market_order(
        &self,
        venue: Venue,
        symbol: &Symbol,
        side: OrderSide,
        amount: Decimal,
    ) -> Result<ExecutedOrder> {
        let walk_side = match side {
            OrderSide::Buy => BookSide::Ask,
            OrderSide::Sell => BookSide::Bid,
        };
        let fill = self.books.walk_depth(venue, symbol, walk_side, amount);
        match fill {
            Some(fill) if fill.feasible => {
                Ok(self.fill(venue, symbol, side, amount, fill.effective_price))
            }
            _ => Ok(self.reject(venue, symbol, side, amount, "insufficient depth")),
        }
    }

    async fn create_limit_order(
        &self,
        venue: Venue,
        symbol: &Symbol,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
    ) -> Result<ExecutedOrder> {
        let top = self.books.top_of_book(venue, symbol);
        let marketable = match (side, top) {
            (OrderSide::Buy, Some(top)) => price >= top.ask,
            (OrderSide::Sell, Some(top)) => price <= top.bid,
            (_, None) => false,
        };
        if marketable {
            Ok(self.fill(venue, symbol, side, amount, price))
        } else {
            // Rests open; paper orders never fill passively.
            let order = ExecutedOrder {
                order_id: uuid::Uuid::new_v4().to_string(),
                venue,
                symbol: symbol.clone(),
                side,
                status: OrderStatus::Open,
                amount,
                filled: Decimal::ZERO,
                average_price: Decimal::ZERO,
                cost: Decimal::ZERO,
                fee: Decimal::ZERO,
                timestamp_ms: Utc::now().timestamp_millis(),
            };
            self.state
                .lock()
                .orders
                .insert(order.order_id.clone(), order.clone());
            Ok(order)
        }
    }

    async fn fetch_order(
        &self,
        _venue: Venue,
        order_id: &str,
        _symbol: &Symbol,
    ) -> Result<ExecutedOrder> {
        self.state
            .lock()
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| Error::Execution(format!("unknown paper order {order_id}")))
    }

    async fn cancel_order(&self, _venue: Venue, order_id: &str, _symbol: &Symbol) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(order) = state.orders.get_mut(order_id) {
            if order.status == OrderStatus::Open {
                order.status = OrderStatus::Canceled;
            }
        }
        Ok(())
    }

    async fn fetch_balances(&self, venue: Venue) -> Result<Vec<Balance>> {
        let state = self.state.lock();
        let now_ms = Utc::now().timestamp_millis();
        Ok(state
            .funds
            .iter()
            .filter(|((v, _), _)| *v == venue)
            .map(|((_, currency), &free)| Balance {
                venue,
                currency: currency.clone(),
                free,
                used: Decimal::ZERO,
                total: free,
                last_update_ms: now_ms,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MarketEvent;
    use rust_decimal_macros::dec;

    fn sym() -> Symbol {
        Symbol::parse("BTC/USDT").unwrap()
    }

    fn seeded_books() -> Arc<BookRegistry> {
        let books = Arc::new(BookRegistry::new());
        books.apply(
            &MarketEvent::BookSnapshot {
                venue: Venue::Binance,
                symbol: sym(),
                bids: vec![(dec!(59990), dec!(1))],
                asks: vec![(dec!(60000), dec!(1))],
                last_update_id: 1,
                timestamp_ms: 1,
            },
            1,
        );
        books
    }

    #[tokio::test]
    async fn market_buy_fills_at_book_price_with_fee() {
        let api = PaperTradingApi::new(seeded_books());
        api.seed_balance(Venue::Binance, "USDT", dec!(10000));

        let order = api
            .create_market_order(Venue::Binance, &sym(), OrderSide::Buy, dec!(0.1))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Closed);
        assert_eq!(order.average_price, dec!(60000));
        assert_eq!(order.cost, dec!(6000));
        assert_eq!(order.fee, dec!(6000) * dec!(0.001));

        let balances = api.fetch_balances(Venue::Binance).await.unwrap();
        let btc = balances.iter().find(|b| b.currency == "BTC").unwrap();
        assert_eq!(btc.free, dec!(0.1));
    }

    #[tokio::test]
    async fn market_order_without_depth_rejects() {
        let api = PaperTradingApi::new(Arc::new(BookRegistry::new()));
        let order = api
            .create_market_order(Venue::Binance, &sym(), OrderSide::Buy, dec!(1))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Rejected);
    }

    #[tokio::test]
    async fn unmarketable_limit_rests_then_cancels() {
        let api = PaperTradingApi::new(seeded_books());
        let order = api
            .create_limit_order(Venue::Binance, &sym(), OrderSide::Buy, dec!(0.1), dec!(59000))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Open);

        api.cancel_order(Venue::Binance, &order.order_id, &sym())
            .await
            .unwrap();
        let fetched = api
            .fetch_order(Venue::Binance, &order.order_id, &sym())
            .await
            .unwrap();
        assert_eq!(fetched.status, OrderStatus::Canceled);

        // Cancel is idempotent and terminal states stick.
        api.cancel_order(Venue::Binance, &order.order_id, &sym())
            .await
            .unwrap();
    }
}
