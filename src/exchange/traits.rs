//! Venue integration seams: streaming market data and the trading API.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{Balance, ExecutedOrder, OrderSide, Symbol, Venue};
use crate::error::Result;

use super::events::MarketEvent;

/// Real-time market data stream for one venue.
///
/// Implementations own connection management, subscription framing, and
/// message parsing for their venue's protocol, including per-symbol book
/// reconstruction state.
#[async_trait]
pub trait VenueStream: Send {
    /// Connect to the venue's streaming endpoint.
    async fn connect(&mut self) -> Result<()>;

    /// Subscribe to ticker and depth topics for the given symbols,
    /// chunking frames when the venue caps topics per message.
    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<()>;

    /// Receive the next normalized event. Returns `None` when the stream
    /// has permanently ended.
    async fn next_event(&mut self) -> Option<MarketEvent>;

    fn venue(&self) -> Venue;
}

#[async_trait]
impl VenueStream for Box<dyn VenueStream> {
    async fn connect(&mut self) -> Result<()> {
        (**self).connect().await
    }

    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<()> {
        (**self).subscribe(symbols).await
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        (**self).next_event().await
    }

    fn venue(&self) -> Venue {
        (**self).venue()
    }
}

/// Uniform trading operations across venues.
///
/// The signed wire clients behind this trait are external collaborators;
/// inside the engine everything trades through this contract. The paper
/// implementation in [`crate::adapter::paper`] backs `TEST_MODE`.
#[async_trait]
pub trait TradingApi: Send + Sync {
    async fn create_market_order(
        &self,
        venue: Venue,
        symbol: &Symbol,
        side: OrderSide,
        amount: Decimal,
    ) -> Result<ExecutedOrder>;

    async fn create_limit_order(
        &self,
        venue: Venue,
        symbol: &Symbol,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
    ) -> Result<ExecutedOrder>;

    async fn fetch_order(
        &self,
        venue: Venue,
        order_id: &str,
        symbol: &Symbol,
    ) -> Result<ExecutedOrder>;

    /// Best-effort cancel; canceling an already-terminal order is not an
    /// error.
    async fn cancel_order(&self, venue: Venue, order_id: &str, symbol: &Symbol) -> Result<()>;

    async fn fetch_balances(&self, venue: Venue) -> Result<Vec<Balance>>;
}
