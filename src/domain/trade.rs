//! Orders, trade attempts, and balance bookkeeping types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::opportunity::OpportunityKind;
use super::symbol::Symbol;
use super::venue::Venue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

/// Venue-reported order lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Closed,
    Canceled,
    Rejected,
}

impl OrderStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Canceled | Self::Rejected)
    }
}

/// An order to submit through the trading API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub venue: Venue,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Base-currency amount.
    pub amount: Decimal,
    /// Required for limit orders; ignored for market orders.
    pub price: Option<Decimal>,
}

/// The venue's view of a submitted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedOrder {
    pub order_id: String,
    pub venue: Venue,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub status: OrderStatus,
    /// Requested base amount.
    pub amount: Decimal,
    /// Base amount filled so far.
    pub filled: Decimal,
    pub average_price: Decimal,
    /// Quote-currency value of the filled portion.
    pub cost: Decimal,
    /// Fee charged, in quote currency.
    pub fee: Decimal,
    pub timestamp_ms: i64,
}

impl ExecutedOrder {
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Closed && self.filled >= self.amount
    }
}

/// Trade attempt lifecycle.
///
/// The happy path runs `Validating → Approved → Executing → Monitoring →
/// Completed`; everything else is a terminal branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Validating,
    Approved,
    Executing,
    Monitoring,
    Completed,
    Rejected,
    Failed,
    Partial,
    RolledBack,
}

impl TradeStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Rejected | Self::Failed | Self::Partial | Self::RolledBack
        )
    }
}

/// One pass through the trade pipeline for a single opportunity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeAttempt {
    pub id: String,
    pub opportunity_id: String,
    pub kind: OpportunityKind,
    pub status: TradeStatus,
    /// Venue-side order states, in leg order.
    pub orders: Vec<ExecutedOrder>,
    pub expected_profit: Decimal,
    pub realized_profit: Option<Decimal>,
    pub error: Option<String>,
    pub started_at_ms: i64,
    pub ended_at_ms: Option<i64>,
}

impl TradeAttempt {
    #[must_use]
    pub fn new(
        opportunity_id: impl Into<String>,
        kind: OpportunityKind,
        expected_profit: Decimal,
        now_ms: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            opportunity_id: opportunity_id.into(),
            kind,
            status: TradeStatus::Validating,
            orders: Vec::new(),
            expected_profit,
            realized_profit: None,
            error: None,
            started_at_ms: now_ms,
            ended_at_ms: None,
        }
    }

    /// Wall-clock execution time, once terminal.
    #[must_use]
    pub fn execution_ms(&self) -> Option<i64> {
        self.ended_at_ms.map(|end| (end - self.started_at_ms).max(0))
    }
}

/// A venue balance for one currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub venue: Venue,
    pub currency: String,
    pub free: Decimal,
    pub used: Decimal,
    pub total: Decimal,
    pub last_update_ms: i64,
}

/// A process-local soft reservation of funds for an in-flight trade.
///
/// Locks never reach the venue; the venue's order engine remains the
/// authority at execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundsLock {
    pub trade_id: String,
    pub venue: Venue,
    pub currency: String,
    pub amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn terminal_statuses() {
        assert!(TradeStatus::Completed.is_terminal());
        assert!(TradeStatus::Rejected.is_terminal());
        assert!(TradeStatus::Partial.is_terminal());
        assert!(!TradeStatus::Monitoring.is_terminal());
        assert!(!TradeStatus::Validating.is_terminal());
    }

    #[test]
    fn execution_ms_requires_end() {
        let mut attempt =
            TradeAttempt::new("opp-1", OpportunityKind::CrossExchange, dec!(1), 1_000);
        assert_eq!(attempt.execution_ms(), None);
        attempt.ended_at_ms = Some(1_750);
        assert_eq!(attempt.execution_ms(), Some(750));
    }

    #[test]
    fn status_serializes_screaming() {
        let json = serde_json::to_string(&TradeStatus::RolledBack).unwrap();
        assert_eq!(json, "\"ROLLED_BACK\"");
    }
}
