//! The codec seam between raw venue frames and normalized events.
//!
//! Codecs are synchronous and own all per-symbol book reconstruction state,
//! which keeps the venue protocol rules unit-testable without sockets. The
//! one asynchronous need (binance's REST depth snapshot) is expressed as a
//! [`FetchSnapshot`](Emit::FetchSnapshot) request that the surrounding
//! adapter fulfills through a [`SnapshotFetcher`].

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{Symbol, Venue};
use crate::error::Result;
use crate::exchange::{Levels, MarketEvent};

/// What a codec wants done after decoding a frame.
#[derive(Debug, Clone)]
pub enum Emit {
    Event(MarketEvent),
    /// Fetch a REST depth snapshot for this symbol and feed it back via
    /// [`VenueCodec::on_snapshot`].
    FetchSnapshot(Symbol),
}

/// A REST depth snapshot.
#[derive(Debug, Clone)]
pub struct DepthSnapshot {
    pub last_update_id: u64,
    pub bids: Levels,
    pub asks: Levels,
}

/// Venue protocol translation: subscription framing, keep-alive, and frame
/// decoding including the venue's snapshot/delta consistency rules.
pub trait VenueCodec: Send {
    fn venue(&self) -> Venue;

    /// Subscription frames for these symbols, chunked to the venue's
    /// per-frame topic cap.
    fn subscribe_frames(&mut self, symbols: &[Symbol]) -> Vec<String>;

    /// Client-initiated keep-alive frame and interval, when the venue
    /// requires one.
    fn keepalive(&self) -> Option<(String, Duration)> {
        None
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// [`crate::error::Error::Wire`] for malformed frames; the adapter logs
    /// and drops them while keeping the connection.
    fn decode(&mut self, text: &str) -> Result<Vec<Emit>>;

    /// Feed a previously requested REST snapshot. May request another fetch
    /// when the snapshot turned out stale.
    fn on_snapshot(&mut self, _symbol: &Symbol, _snapshot: DepthSnapshot) -> Vec<Emit> {
        Vec::new()
    }

    /// Drop per-connection state after a disconnect; book reconstruction
    /// starts over on the next connection.
    fn reset(&mut self);
}

/// Fetches REST depth snapshots for codecs that need them.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch(&self, symbol: &Symbol) -> Result<DepthSnapshot>;
}

/// Parse venue level arrays (`[["price","size",..], ..]`) into decimals,
/// ignoring rows that fail to parse.
#[must_use]
pub fn parse_levels(raw: &[Vec<String>]) -> Levels {
    raw.iter()
        .filter_map(|row| {
            let price: Decimal = row.first()?.parse().ok()?;
            let size: Decimal = row.get(1)?.parse().ok()?;
            Some((price, size))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_levels_skips_bad_rows() {
        let raw = vec![
            vec!["100.5".to_string(), "2".to_string()],
            vec!["bogus".to_string(), "2".to_string()],
            vec!["101".to_string()],
            vec!["102".to_string(), "0".to_string(), "extra".to_string()],
        ];
        let levels = parse_levels(&raw);
        assert_eq!(levels, vec![(dec!(100.5), dec!(2)), (dec!(102), dec!(0))]);
    }
}
