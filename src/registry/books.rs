//! Registry of order-book replicas per (venue, symbol).
//!
//! Adapters are the single writer for their venue's replicas; detectors are
//! readers. Reads take the map lock once, so a detector always observes a
//! point-in-time book, never one mid-update.

use std::collections::HashMap;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::domain::{BookSide, DepthFill, OrderBookReplica, Symbol, TopOfBook, Venue};
use crate::exchange::MarketEvent;

/// What applying a book event did to the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Dropped: replica uninitialized or the update was older than the
    /// replica's state.
    Ignored,
    /// Sequence gap slipped past the adapter; the replica was discarded and
    /// awaits a fresh snapshot.
    Gap,
}

/// Fitness of a replica for detection reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookHealth {
    Ready,
    /// Best bid above best ask; unusable until the next update resolves it.
    Crossed,
    Stale,
    Missing,
}

pub struct BookRegistry {
    books: RwLock<HashMap<(Venue, Symbol), OrderBookReplica>>,
}

impl BookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
        }
    }

    /// Apply a normalized book event. Non-book events are ignored.
    pub fn apply(&self, event: &MarketEvent, now_ms: i64) -> ApplyOutcome {
        match event {
            MarketEvent::BookSnapshot {
                venue,
                symbol,
                bids,
                asks,
                last_update_id,
                timestamp_ms,
            } => {
                let mut books = self.books.write();
                let replica = books
                    .entry((*venue, symbol.clone()))
                    .or_insert_with(|| OrderBookReplica::new(*venue, symbol.clone()));
                let ts = if *timestamp_ms > 0 { *timestamp_ms } else { now_ms };
                replica.apply_snapshot(bids, asks, *last_update_id, ts);
                ApplyOutcome::Applied
            }
            MarketEvent::BookDelta {
                venue,
                symbol,
                bids,
                asks,
                first_update_id,
                last_update_id,
                timestamp_ms,
            } => {
                let mut books = self.books.write();
                let Some(replica) = books.get_mut(&(*venue, symbol.clone())) else {
                    debug!(venue = %venue, symbol = %symbol, "Delta for unknown book dropped");
                    return ApplyOutcome::Ignored;
                };
                if !replica.is_initialized() {
                    return ApplyOutcome::Ignored;
                }
                if *last_update_id != 0 && *last_update_id <= replica.last_update_id() {
                    return ApplyOutcome::Ignored;
                }
                // The adapter validates sequencing; this is the safety net
                // for anything that slips through.
                if *first_update_id != 0 && *first_update_id > replica.last_update_id() + 1 {
                    warn!(
                        venue = %venue,
                        symbol = %symbol,
                        expected = replica.last_update_id() + 1,
                        got = first_update_id,
                        "Update-id gap reached the registry, discarding replica"
                    );
                    replica.invalidate();
                    return ApplyOutcome::Gap;
                }
                let ts = if *timestamp_ms > 0 { *timestamp_ms } else { now_ms };
                replica.apply_delta(bids, asks, *last_update_id, ts);
                ApplyOutcome::Applied
            }
            MarketEvent::BookInvalidate { venue, symbol } => {
                self.invalidate(*venue, symbol);
                ApplyOutcome::Applied
            }
            _ => ApplyOutcome::Ignored,
        }
    }

    pub fn invalidate(&self, venue: Venue, symbol: &Symbol) {
        if let Some(replica) = self.books.write().get_mut(&(venue, symbol.clone())) {
            replica.invalidate();
        }
    }

    /// Drop every replica for a venue (connection-level invalidation).
    pub fn invalidate_venue(&self, venue: Venue) {
        for ((v, _), replica) in self.books.write().iter_mut() {
            if *v == venue {
                replica.invalidate();
            }
        }
    }

    /// Run `f` against the replica under the read lock, yielding a
    /// point-in-time view.
    pub fn with_book<T>(
        &self,
        venue: Venue,
        symbol: &Symbol,
        f: impl FnOnce(&OrderBookReplica) -> T,
    ) -> Option<T> {
        let books = self.books.read();
        books.get(&(venue, symbol.clone())).map(f)
    }

    /// Whether the replica is initialized, uncrossed, and younger than
    /// `max_age_ms`.
    #[must_use]
    pub fn usable(&self, venue: Venue, symbol: &Symbol, now_ms: i64, max_age_ms: i64) -> bool {
        self.health(venue, symbol, now_ms, max_age_ms) == BookHealth::Ready
    }

    /// Why a replica can (or cannot) feed detection right now. Crossed
    /// books are reported distinctly because detectors must skip them
    /// rather than fall back to estimation.
    #[must_use]
    pub fn health(
        &self,
        venue: Venue,
        symbol: &Symbol,
        now_ms: i64,
        max_age_ms: i64,
    ) -> BookHealth {
        self.with_book(venue, symbol, |b| {
            if !b.is_initialized() {
                BookHealth::Missing
            } else if b.is_crossed() {
                BookHealth::Crossed
            } else if b.age_ms(now_ms) > max_age_ms {
                BookHealth::Stale
            } else {
                BookHealth::Ready
            }
        })
        .unwrap_or(BookHealth::Missing)
    }

    #[must_use]
    pub fn top_of_book(&self, venue: Venue, symbol: &Symbol) -> Option<TopOfBook> {
        self.with_book(venue, symbol, |b| b.top_of_book()).flatten()
    }

    #[must_use]
    pub fn walk_depth(
        &self,
        venue: Venue,
        symbol: &Symbol,
        side: BookSide,
        base_amount: Decimal,
    ) -> Option<DepthFill> {
        self.with_book(venue, symbol, |b| b.walk_depth(side, base_amount))
    }

    #[must_use]
    pub fn side_volume(&self, venue: Venue, symbol: &Symbol, side: BookSide) -> Option<Decimal> {
        self.with_book(venue, symbol, |b| b.side_volume(side))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.books.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sym() -> Symbol {
        Symbol::parse("BTC/USDT").unwrap()
    }

    fn snapshot(last_update_id: u64) -> MarketEvent {
        MarketEvent::BookSnapshot {
            venue: Venue::Binance,
            symbol: sym(),
            bids: vec![(dec!(59990), dec!(1))],
            asks: vec![(dec!(60000), dec!(1))],
            last_update_id,
            timestamp_ms: 1_000,
        }
    }

    fn delta(first: u64, last: u64) -> MarketEvent {
        MarketEvent::BookDelta {
            venue: Venue::Binance,
            symbol: sym(),
            bids: vec![(dec!(59995), dec!(2))],
            asks: vec![],
            first_update_id: first,
            last_update_id: last,
            timestamp_ms: 1_100,
        }
    }

    #[test]
    fn snapshot_then_delta_applies() {
        let registry = BookRegistry::new();
        assert_eq!(registry.apply(&snapshot(100), 1_000), ApplyOutcome::Applied);
        assert_eq!(registry.apply(&delta(101, 101), 1_100), ApplyOutcome::Applied);
        let top = registry.top_of_book(Venue::Binance, &sym()).unwrap();
        assert_eq!(top.bid, dec!(59995));
    }

    #[test]
    fn delta_before_snapshot_ignored() {
        let registry = BookRegistry::new();
        assert_eq!(registry.apply(&delta(1, 1), 1_000), ApplyOutcome::Ignored);
    }

    #[test]
    fn stale_delta_ignored() {
        let registry = BookRegistry::new();
        registry.apply(&snapshot(100), 1_000);
        assert_eq!(registry.apply(&delta(99, 100), 1_100), ApplyOutcome::Ignored);
    }

    #[test]
    fn gap_discards_replica() {
        let registry = BookRegistry::new();
        registry.apply(&snapshot(100), 1_000);
        assert_eq!(registry.apply(&delta(103, 104), 1_100), ApplyOutcome::Gap);
        assert!(!registry.usable(Venue::Binance, &sym(), 1_200, 10_000));
    }

    #[test]
    fn invalidate_event_clears_book() {
        let registry = BookRegistry::new();
        registry.apply(&snapshot(100), 1_000);
        registry.apply(
            &MarketEvent::BookInvalidate {
                venue: Venue::Binance,
                symbol: sym(),
            },
            1_100,
        );
        assert!(registry.top_of_book(Venue::Binance, &sym()).is_none());
    }

    #[test]
    fn usable_rejects_old_books() {
        let registry = BookRegistry::new();
        registry.apply(&snapshot(100), 1_000);
        assert!(registry.usable(Venue::Binance, &sym(), 5_000, 10_000));
        assert!(!registry.usable(Venue::Binance, &sym(), 20_000, 10_000));
    }
}
