//! Detected arbitrage opportunities.
//!
//! Both detectors produce value objects here. Each record is split into a
//! small identity/outcome core plus a metrics struct carrying the
//! observational fields used for scoring and reporting.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::symbol::Symbol;
use super::venue::Venue;

/// The two opportunity families the engine trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    CrossExchange,
    Triangular,
}

impl OpportunityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            OpportunityKind::CrossExchange => "cross_exchange",
            OpportunityKind::Triangular => "triangular",
        }
    }
}

/// Direction of a single conversion leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegSide {
    Buy,
    Sell,
}

/// A cross-venue price dislocation: buy on one venue, sell on another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossOpportunity {
    pub id: String,
    pub symbol: Symbol,
    pub buy_venue: Venue,
    pub sell_venue: Venue,
    /// Last-trade reference prices at detection time.
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    /// Recommended base-currency trade size.
    pub trade_size: Decimal,
    pub net_profit: Decimal,
    pub net_profit_percent: Decimal,
    pub created_at_ms: i64,
    pub metrics: CrossMetrics,
}

/// Depth and scoring observations backing a [`CrossOpportunity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossMetrics {
    /// Size-weighted prices from walking both books at `trade_size`.
    pub effective_buy_price: Decimal,
    pub effective_sell_price: Decimal,
    pub buy_slippage_percent: Decimal,
    pub sell_slippage_percent: Decimal,
    /// Combined taker fees for both legs, in quote currency.
    pub fees: Decimal,
    /// Quote-currency liquidity available across both books.
    pub available_liquidity: Decimal,
    pub confidence: f64,
    pub liquidity_score: f64,
    pub spread_impact: f64,
}

impl CrossOpportunity {
    /// Deduplication key: one live opportunity per directed venue pair.
    #[must_use]
    pub fn key(&self) -> (Symbol, Venue, Venue) {
        (self.symbol.clone(), self.buy_venue, self.sell_venue)
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms - self.created_at_ms > ttl_ms
    }

    /// Quote-currency value committed on the buy leg.
    #[must_use]
    pub fn trade_value(&self) -> Decimal {
        self.trade_size * self.metrics.effective_buy_price
    }
}

/// Priced view of one triangular leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegQuote {
    pub symbol: Symbol,
    pub side: LegSide,
    /// Top-of-book reference price for the leg.
    pub price: Decimal,
    /// Depth-walked (or estimated) execution price.
    pub effective_price: Decimal,
    /// Fee deducted from the leg output, in output currency.
    pub fee: Decimal,
    pub slippage_percent: Decimal,
}

/// A closed three-leg conversion cycle on a single venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangularOpportunity {
    pub id: String,
    pub venue: Venue,
    pub legs: [LegQuote; 3],
    /// Amount committed in the start currency.
    pub start_amount: Decimal,
    /// Simulated amount returned after all three legs and fees.
    pub end_amount: Decimal,
    pub confidence: f64,
    /// Rough sequential-execution time estimate.
    pub execution_hint_ms: u64,
    pub created_at_ms: i64,
    pub valid: bool,
}

impl TriangularOpportunity {
    #[must_use]
    pub fn profit(&self) -> Decimal {
        self.end_amount - self.start_amount
    }

    #[must_use]
    pub fn profit_percent(&self) -> Decimal {
        if self.start_amount.is_zero() {
            return Decimal::ZERO;
        }
        self.profit() / self.start_amount * Decimal::ONE_HUNDRED
    }

    /// Deduplication key: the path symbols plus their directions.
    #[must_use]
    pub fn key(&self) -> (Venue, Vec<(Symbol, LegSide)>) {
        (
            self.venue,
            self.legs
                .iter()
                .map(|l| (l.symbol.clone(), l.side))
                .collect(),
        )
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms - self.created_at_ms > ttl_ms
    }

    #[must_use]
    pub fn total_slippage_percent(&self) -> Decimal {
        self.legs.iter().map(|l| l.slippage_percent).sum()
    }
}

/// Tagged variant handed to the trade pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Opportunity {
    CrossExchange(CrossOpportunity),
    Triangular(TriangularOpportunity),
}

impl Opportunity {
    #[must_use]
    pub fn kind(&self) -> OpportunityKind {
        match self {
            Opportunity::CrossExchange(_) => OpportunityKind::CrossExchange,
            Opportunity::Triangular(_) => OpportunityKind::Triangular,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Opportunity::CrossExchange(o) => &o.id,
            Opportunity::Triangular(o) => &o.id,
        }
    }
}
