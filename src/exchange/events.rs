//! Normalized events emitted by venue stream adapters.

use rust_decimal::Decimal;

use crate::domain::{PriceTick, Symbol, Venue};

/// Absolute price levels carried by a book event, `(price, size)` pairs.
pub type Levels = Vec<(Decimal, Decimal)>;

/// Everything the rest of the engine sees from a venue connection.
///
/// Adapters translate venue-specific frames into these; downstream code
/// never touches wire formats.
#[derive(Debug, Clone)]
pub enum MarketEvent {
    /// Ticker update; replaces the prior tick for its (venue, symbol).
    Tick(PriceTick),
    /// Full book state; replaces the replica entirely.
    BookSnapshot {
        venue: Venue,
        symbol: Symbol,
        bids: Levels,
        asks: Levels,
        last_update_id: u64,
        timestamp_ms: i64,
    },
    /// Incremental book update, already validated by the adapter's
    /// per-venue sequencing rules.
    BookDelta {
        venue: Venue,
        symbol: Symbol,
        bids: Levels,
        asks: Levels,
        first_update_id: u64,
        last_update_id: u64,
        timestamp_ms: i64,
    },
    /// The in-memory replica for this symbol is no longer trustworthy and
    /// must not be read until the next snapshot arrives.
    BookInvalidate { venue: Venue, symbol: Symbol },
    /// Stream (re)connected.
    Connected { venue: Venue },
    /// Stream dropped; the adapter will attempt reconnection.
    Disconnected { venue: Venue, reason: String },
    /// Reconnect budget exhausted; the adapter has given up and restart is
    /// operator-initiated.
    ConnectionLost { venue: Venue },
}

impl MarketEvent {
    /// The symbol this event carries market data for, if any.
    #[must_use]
    pub fn symbol(&self) -> Option<&Symbol> {
        match self {
            MarketEvent::Tick(tick) => Some(&tick.symbol),
            MarketEvent::BookSnapshot { symbol, .. }
            | MarketEvent::BookDelta { symbol, .. }
            | MarketEvent::BookInvalidate { symbol, .. } => Some(symbol),
            _ => None,
        }
    }

    #[must_use]
    pub fn venue(&self) -> Venue {
        match self {
            MarketEvent::Tick(tick) => tick.venue,
            MarketEvent::BookSnapshot { venue, .. }
            | MarketEvent::BookDelta { venue, .. }
            | MarketEvent::BookInvalidate { venue, .. }
            | MarketEvent::Connected { venue }
            | MarketEvent::Disconnected { venue, .. }
            | MarketEvent::ConnectionLost { venue } => *venue,
        }
    }
}
