//! Local order-book replicas.
//!
//! One replica is maintained per (venue, symbol) from the venue's
//! snapshot/delta stream. The replica is the depth source for the detectors:
//! top-of-book reads and slippage-aware depth walks both come from here.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::symbol::Symbol;
use super::venue::Venue;

/// Which ladder of the book an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookSide {
    Bid,
    Ask,
}

/// Best prices and the sizes resting at them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopOfBook {
    pub bid: Decimal,
    pub ask: Decimal,
    pub bid_qty: Decimal,
    pub ask_qty: Decimal,
}

/// Result of consuming depth from the best level inward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthFill {
    /// Size-weighted average price over the consumed levels.
    pub effective_price: Decimal,
    /// Base amount actually available; equals the request when feasible.
    pub filled: Decimal,
    /// False when the ladder ran out before the requested amount.
    pub feasible: bool,
}

/// Price-keyed bid/ask ladders for one (venue, symbol).
///
/// Sizes are absolute: applying a level replaces whatever was at that price,
/// and a zero size removes the level. Update-id bookkeeping lives here, but
/// the per-venue consistency rules (buffering, bracketing, re-snapshot) are
/// the adapter's job.
#[derive(Debug, Clone)]
pub struct OrderBookReplica {
    venue: Venue,
    symbol: Symbol,
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    last_update_id: u64,
    last_event_ms: i64,
    initialized: bool,
}

impl OrderBookReplica {
    #[must_use]
    pub fn new(venue: Venue, symbol: Symbol) -> Self {
        Self {
            venue,
            symbol,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_id: 0,
            last_event_ms: 0,
            initialized: false,
        }
    }

    #[must_use]
    pub fn venue(&self) -> Venue {
        self.venue
    }

    #[must_use]
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    #[must_use]
    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Milliseconds since the last applied event, saturating at zero.
    #[must_use]
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.last_event_ms).max(0)
    }

    /// Replace the entire book state from a snapshot.
    pub fn apply_snapshot(
        &mut self,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
        last_update_id: u64,
        timestamp_ms: i64,
    ) {
        self.bids.clear();
        self.asks.clear();
        for &(price, size) in bids {
            if size > Decimal::ZERO {
                self.bids.insert(price, size);
            }
        }
        for &(price, size) in asks {
            if size > Decimal::ZERO {
                self.asks.insert(price, size);
            }
        }
        self.last_update_id = last_update_id;
        self.last_event_ms = timestamp_ms;
        self.initialized = true;
    }

    /// Apply incremental level changes. A zero size removes the level.
    pub fn apply_delta(
        &mut self,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
        last_update_id: u64,
        timestamp_ms: i64,
    ) {
        for &(price, size) in bids {
            if size.is_zero() {
                self.bids.remove(&price);
            } else {
                self.bids.insert(price, size);
            }
        }
        for &(price, size) in asks {
            if size.is_zero() {
                self.asks.remove(&price);
            } else {
                self.asks.insert(price, size);
            }
        }
        if last_update_id > self.last_update_id {
            self.last_update_id = last_update_id;
        }
        self.last_event_ms = timestamp_ms;
    }

    /// Drop all state; the replica must be re-seeded by a snapshot.
    pub fn invalidate(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.last_update_id = 0;
        self.initialized = false;
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<(Decimal, Decimal)> {
        self.bids.iter().next_back().map(|(p, s)| (*p, *s))
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<(Decimal, Decimal)> {
        self.asks.iter().next().map(|(p, s)| (*p, *s))
    }

    /// A momentarily crossed book (best bid above best ask) must not feed
    /// detection until the next update resolves it.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => bid > ask,
            _ => false,
        }
    }

    #[must_use]
    pub fn top_of_book(&self) -> Option<TopOfBook> {
        let (bid, bid_qty) = self.best_bid()?;
        let (ask, ask_qty) = self.best_ask()?;
        Some(TopOfBook {
            bid,
            ask,
            bid_qty,
            ask_qty,
        })
    }

    /// Total base size resting on one side of the book.
    #[must_use]
    pub fn side_volume(&self, side: BookSide) -> Decimal {
        match side {
            BookSide::Bid => self.bids.values().sum(),
            BookSide::Ask => self.asks.values().sum(),
        }
    }

    /// Consume levels from the best price inward until `base_amount` is
    /// filled, returning the size-weighted effective price. When the ladder
    /// exhausts first, `feasible` is false and `filled` reports what was
    /// available.
    #[must_use]
    pub fn walk_depth(&self, side: BookSide, base_amount: Decimal) -> DepthFill {
        let mut remaining = base_amount;
        let mut cost = Decimal::ZERO;
        let mut filled = Decimal::ZERO;

        let mut consume = |price: Decimal, size: Decimal| {
            if remaining <= Decimal::ZERO {
                return false;
            }
            let take = size.min(remaining);
            cost += price * take;
            filled += take;
            remaining -= take;
            true
        };

        match side {
            BookSide::Ask => {
                for (&price, &size) in self.asks.iter() {
                    if !consume(price, size) {
                        break;
                    }
                }
            }
            BookSide::Bid => {
                for (&price, &size) in self.bids.iter().rev() {
                    if !consume(price, size) {
                        break;
                    }
                }
            }
        }

        let effective_price = if filled.is_zero() {
            Decimal::ZERO
        } else {
            cost / filled
        };

        DepthFill {
            effective_price,
            filled,
            feasible: remaining <= Decimal::ZERO && base_amount > Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn replica() -> OrderBookReplica {
        OrderBookReplica::new(Venue::Binance, Symbol::parse("BTC/USDT").unwrap())
    }

    fn seeded() -> OrderBookReplica {
        let mut book = replica();
        book.apply_snapshot(
            &[(dec!(59990), dec!(1)), (dec!(59980), dec!(2))],
            &[(dec!(60000), dec!(0.5)), (dec!(60010), dec!(2))],
            100,
            1_000,
        );
        book
    }

    #[test]
    fn snapshot_replaces_state() {
        let mut book = seeded();
        book.apply_snapshot(&[(dec!(100), dec!(1))], &[(dec!(101), dec!(1))], 200, 2_000);
        assert_eq!(book.best_bid(), Some((dec!(100), dec!(1))));
        assert_eq!(book.best_ask(), Some((dec!(101), dec!(1))));
        assert_eq!(book.last_update_id(), 200);
    }

    #[test]
    fn zero_size_removes_level() {
        let mut book = seeded();
        book.apply_delta(&[(dec!(59990), dec!(0))], &[], 101, 1_100);
        assert_eq!(book.best_bid(), Some((dec!(59980), dec!(2))));
    }

    #[test]
    fn crossed_book_detected() {
        let mut book = replica();
        book.apply_snapshot(&[(dec!(60100), dec!(1))], &[(dec!(60000), dec!(1))], 1, 0);
        assert!(book.is_crossed());
    }

    #[test]
    fn single_level_fill_has_no_slippage() {
        let book = seeded();
        let fill = book.walk_depth(BookSide::Ask, dec!(0.5));
        assert!(fill.feasible);
        assert_eq!(fill.effective_price, dec!(60000));
    }

    #[test]
    fn multi_level_fill_is_size_weighted() {
        let book = seeded();
        let fill = book.walk_depth(BookSide::Ask, dec!(1.5));
        assert!(fill.feasible);
        // 0.5 @ 60000 + 1.0 @ 60010
        let expected = (dec!(0.5) * dec!(60000) + dec!(1.0) * dec!(60010)) / dec!(1.5);
        assert_eq!(fill.effective_price, expected);
    }

    #[test]
    fn exhausted_book_is_infeasible() {
        let book = seeded();
        let fill = book.walk_depth(BookSide::Ask, dec!(10));
        assert!(!fill.feasible);
        assert_eq!(fill.filled, dec!(2.5));
    }

    #[test]
    fn bid_walk_descends() {
        let book = seeded();
        let fill = book.walk_depth(BookSide::Bid, dec!(2));
        let expected = (dec!(1) * dec!(59990) + dec!(1) * dec!(59980)) / dec!(2);
        assert_eq!(fill.effective_price, expected);
    }

    #[test]
    fn invalidate_drops_state() {
        let mut book = seeded();
        book.invalidate();
        assert!(!book.is_initialized());
        assert!(book.top_of_book().is_none());
    }

    #[test]
    fn side_volume_sums_sizes() {
        let book = seeded();
        assert_eq!(book.side_volume(BookSide::Ask), dec!(2.5));
        assert_eq!(book.side_volume(BookSide::Bid), dec!(3));
    }
}
