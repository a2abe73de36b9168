//! Order submission and fill monitoring.
//!
//! Thin, policy-free surface over the trading API: submit, poll, cancel,
//! and wait for a terminal state. Retries are composed by callers.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::domain::{ExecutedOrder, OrderRequest, OrderType, Symbol, Venue};
use crate::error::{Error, Result};
use crate::exchange::TradingApi;

pub struct OrderExecutor {
    api: Arc<dyn TradingApi>,
}

impl OrderExecutor {
    pub fn new(api: Arc<dyn TradingApi>) -> Self {
        Self { api }
    }

    /// Submit an order. Market orders are polled once immediately so the
    /// caller sees the freshest state the venue will report.
    pub async fn place(&self, request: &OrderRequest) -> Result<ExecutedOrder> {
        match request.order_type {
            OrderType::Market => {
                let order = self
                    .api
                    .create_market_order(
                        request.venue,
                        &request.symbol,
                        request.side,
                        request.amount,
                    )
                    .await?;
                debug!(
                    venue = %request.venue,
                    symbol = %request.symbol,
                    order_id = %order.order_id,
                    "Market order submitted"
                );
                match self
                    .poll(request.venue, &order.order_id, &request.symbol)
                    .await
                {
                    Ok(latest) => Ok(latest),
                    Err(_) => Ok(order),
                }
            }
            OrderType::Limit => {
                let price = request
                    .price
                    .ok_or_else(|| Error::Execution("limit order requires a price".into()))?;
                self.api
                    .create_limit_order(
                        request.venue,
                        &request.symbol,
                        request.side,
                        request.amount,
                        price,
                    )
                    .await
            }
        }
    }

    pub async fn poll(
        &self,
        venue: Venue,
        order_id: &str,
        symbol: &Symbol,
    ) -> Result<ExecutedOrder> {
        self.api.fetch_order(venue, order_id, symbol).await
    }

    /// Best-effort cancel; callers tolerate the order filling anyway.
    pub async fn cancel(&self, venue: Venue, order_id: &str, symbol: &Symbol) -> Result<()> {
        self.api.cancel_order(venue, order_id, symbol).await
    }

    /// Poll until the order reaches `closed`, `canceled`, or `rejected`.
    ///
    /// # Errors
    ///
    /// [`Error::OrderTimeout`] when the deadline passes first; the caller
    /// decides whether to cancel.
    pub async fn wait_for_terminal(
        &self,
        venue: Venue,
        order_id: &str,
        symbol: &Symbol,
        timeout_ms: u64,
        poll_ms: u64,
    ) -> Result<ExecutedOrder> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let order = self.poll(venue, order_id, symbol).await?;
            if order.status.is_terminal() {
                return Ok(order);
            }
            if Instant::now() >= deadline {
                return Err(Error::OrderTimeout {
                    order_id: order_id.to_string(),
                    timeout_ms,
                });
            }
            sleep(Duration::from_millis(poll_ms)).await;
        }
    }
}
