//! Last-trade ticks normalized from venue ticker feeds.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::symbol::Symbol;
use super::venue::Venue;

/// The latest ticker state for one (venue, symbol).
///
/// Replaces the prior tick for the same key on every ticker message.
/// Consumers judge staleness against their own TTL: the triangular detector
/// uses 2 s, the cross-venue book guard 10 s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    pub venue: Venue,
    pub symbol: Symbol,
    pub last: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub volume_24h: Decimal,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

impl PriceTick {
    /// Age of this tick relative to `now_ms`, saturating at zero.
    #[must_use]
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.timestamp_ms).max(0)
    }

    #[must_use]
    pub fn is_stale(&self, now_ms: i64, ttl_ms: i64) -> bool {
        self.age_ms(now_ms) > ttl_ms
    }

    /// Bid/ask spread as a percentage of the mid price. Zero when the
    /// quotes are missing or degenerate.
    #[must_use]
    pub fn spread_percent(&self) -> Decimal {
        let mid = (self.bid + self.ask) / Decimal::TWO;
        if mid.is_zero() || self.ask < self.bid {
            return Decimal::ZERO;
        }
        (self.ask - self.bid) / mid * Decimal::ONE_HUNDRED
    }
}
