//! Venue-agnostic domain types.

pub mod book;
pub mod opportunity;
pub mod symbol;
pub mod tick;
pub mod trade;
pub mod venue;

pub use book::{BookSide, DepthFill, OrderBookReplica, TopOfBook};
pub use opportunity::{
    CrossMetrics, CrossOpportunity, LegQuote, LegSide, Opportunity, OpportunityKind,
    TriangularOpportunity,
};
pub use symbol::Symbol;
pub use tick::PriceTick;
pub use trade::{
    Balance, ExecutedOrder, FundsLock, OrderRequest, OrderSide, OrderStatus, OrderType,
    TradeAttempt, TradeStatus,
};
pub use venue::Venue;
