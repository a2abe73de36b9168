//! Trade orchestration: the state machine that turns an approved
//! opportunity into venue orders and a journaled outcome.

pub mod cross;
pub mod triangular;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use crate::domain::{
    Opportunity, OpportunityKind, OrderRequest, OrderType, TradeAttempt, TradeStatus,
};
use crate::executor::OrderExecutor;
use crate::service::{BalanceLedger, RiskManager, TransactionJournal};

pub use cross::CrossOrchestrator;
pub use triangular::TriangularOrchestrator;

/// Execution tuning shared by both strategies.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_order_type")]
    pub order_type: OrderType,
    #[serde(default = "default_order_timeout_ms")]
    pub order_timeout_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_order_retry_attempts")]
    pub order_retry_attempts: u32,
}

fn default_order_type() -> OrderType {
    OrderType::Market
}
fn default_order_timeout_ms() -> u64 {
    30_000
}
fn default_poll_ms() -> u64 {
    500
}
fn default_order_retry_attempts() -> u32 {
    1
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_type: default_order_type(),
            order_timeout_ms: default_order_timeout_ms(),
            poll_ms: default_poll_ms(),
            order_retry_attempts: default_order_retry_attempts(),
        }
    }
}

/// The explicitly owned services every orchestrator needs; wired once in
/// `main` and shared by reference.
#[derive(Clone)]
pub struct TradeServices {
    pub risk: Arc<RiskManager>,
    pub balances: Arc<BalanceLedger>,
    pub executor: Arc<OrderExecutor>,
    pub journal: TransactionJournal,
}

impl TradeServices {
    /// Advance the trade state machine one step and journal the transition.
    pub(crate) async fn transition(&self, trade: &mut TradeAttempt, status: TradeStatus) {
        trade.status = status;
        if status.is_terminal() {
            trade.ended_at_ms = Some(Utc::now().timestamp_millis());
        }
        self.journal.record(trade).await;
    }

    /// Terminal step with an error string attached.
    pub(crate) async fn terminate(
        &self,
        trade: &mut TradeAttempt,
        status: TradeStatus,
        error: impl Into<String>,
    ) {
        trade.error = Some(error.into());
        self.transition(trade, status).await;
    }

    /// Submit an order, retrying placement failures up to the configured
    /// attempt count. Retries apply to submission only, never to an order
    /// that reached the venue.
    pub(crate) async fn place_with_retry(
        &self,
        request: &OrderRequest,
        attempts: u32,
    ) -> crate::error::Result<crate::domain::ExecutedOrder> {
        let mut last_err = None;
        for attempt in 0..attempts.max(1) {
            match self.executor.place(request).await {
                Ok(order) => return Ok(order),
                Err(e) => {
                    warn!(
                        venue = %request.venue,
                        symbol = %request.symbol,
                        attempt = attempt + 1,
                        error = %e,
                        "Order placement failed"
                    );
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| crate::error::Error::Execution("no attempts made".into())))
    }

    /// Flag realized results wildly outside expectation; they almost always
    /// mean an accounting bug upstream.
    pub(crate) fn check_realized_sanity(&self, trade: &TradeAttempt, realized: Decimal) {
        let bound = trade.expected_profit.abs() * Decimal::TWO;
        if !bound.is_zero() && realized.abs() > bound {
            warn!(
                trade_id = %trade.id,
                expected = %trade.expected_profit,
                realized = %realized,
                "Realized profit outside sanity bound"
            );
        }
    }
}

/// Strategy seam: one implementation per opportunity family.
#[async_trait]
pub trait TradeStrategy: Send + Sync {
    fn kind(&self) -> OpportunityKind;

    /// Run the full pipeline for one opportunity and return the terminal
    /// trade attempt. Never panics across this boundary; every outcome is
    /// journaled before it returns.
    async fn execute(&self, opportunity: &Opportunity) -> TradeAttempt;
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// A market-order request in the configured order type.
pub(crate) fn order_request(
    venue: crate::domain::Venue,
    symbol: crate::domain::Symbol,
    side: crate::domain::OrderSide,
    amount: Decimal,
    price: Option<Decimal>,
    config: &ExecutionConfig,
) -> OrderRequest {
    OrderRequest {
        venue,
        symbol,
        side,
        order_type: config.order_type,
        amount,
        price: match config.order_type {
            OrderType::Market => None,
            OrderType::Limit => price,
        },
    }
}
