//! Per-(venue, symbol) emission throttle.
//!
//! Bounds downstream load to one tick and one book event per symbol per
//! window (default 100 ms) without losing information: events arriving
//! inside the window are coalesced, and the merged state goes out as soon
//! as the window reopens. Deltas merge losslessly because level sizes are
//! absolute.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;

use crate::domain::{Symbol, Venue};
use crate::exchange::{Levels, MarketEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Channel {
    Tick,
    Book,
}

type Key = (Venue, Symbol, Channel);

struct Slot {
    last_emit: Instant,
    pending: Option<MarketEvent>,
}

pub struct EmitGate {
    min_interval: Duration,
    slots: HashMap<Key, Slot>,
}

impl EmitGate {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            slots: HashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Offer an event for emission. Returns the event (possibly merged with
    /// a pending one) when the window allows, or stashes it otherwise.
    /// Events without a throttle channel pass straight through.
    pub fn offer(&mut self, event: MarketEvent, now: Instant) -> Option<MarketEvent> {
        let Some(key) = throttle_key(&event) else {
            if let MarketEvent::BookInvalidate { venue, symbol } = &event {
                // Pending book state for an invalidated symbol is garbage.
                self.slots
                    .remove(&(*venue, symbol.clone(), Channel::Book));
            }
            return Some(event);
        };

        match self.slots.get_mut(&key) {
            None => {
                self.slots.insert(
                    key,
                    Slot {
                        last_emit: now,
                        pending: None,
                    },
                );
                Some(event)
            }
            Some(slot) => {
                let merged = match slot.pending.take() {
                    Some(pending) => merge(pending, event),
                    None => event,
                };
                if now.duration_since(slot.last_emit) >= self.min_interval {
                    slot.last_emit = now;
                    Some(merged)
                } else {
                    slot.pending = Some(merged);
                    None
                }
            }
        }
    }

    /// Earliest instant at which a pending event becomes emittable.
    #[must_use]
    pub fn next_due(&self) -> Option<Instant> {
        self.slots
            .values()
            .filter(|s| s.pending.is_some())
            .map(|s| s.last_emit + self.min_interval)
            .min()
    }

    /// Emit every pending event whose window has reopened.
    pub fn drain_due(&mut self, now: Instant) -> Vec<MarketEvent> {
        let mut out = Vec::new();
        for slot in self.slots.values_mut() {
            if slot.pending.is_some() && now.duration_since(slot.last_emit) >= self.min_interval {
                slot.last_emit = now;
                if let Some(event) = slot.pending.take() {
                    out.push(event);
                }
            }
        }
        out
    }
}

fn throttle_key(event: &MarketEvent) -> Option<Key> {
    match event {
        MarketEvent::Tick(tick) => Some((tick.venue, tick.symbol.clone(), Channel::Tick)),
        MarketEvent::BookSnapshot { venue, symbol, .. }
        | MarketEvent::BookDelta { venue, symbol, .. } => {
            Some((*venue, symbol.clone(), Channel::Book))
        }
        _ => None,
    }
}

/// Coalesce two same-channel events into one carrying the latest state.
fn merge(pending: MarketEvent, incoming: MarketEvent) -> MarketEvent {
    match (pending, incoming) {
        // Latest tick wins outright.
        (MarketEvent::Tick(_), incoming @ MarketEvent::Tick(_)) => incoming,
        // A snapshot resets everything that came before it.
        (_, incoming @ MarketEvent::BookSnapshot { .. }) => incoming,
        // Delta onto snapshot: fold the level changes into the snapshot.
        (
            MarketEvent::BookSnapshot {
                venue,
                symbol,
                mut bids,
                mut asks,
                last_update_id: _,
                timestamp_ms: _,
            },
            MarketEvent::BookDelta {
                bids: delta_bids,
                asks: delta_asks,
                last_update_id,
                timestamp_ms,
                ..
            },
        ) => {
            fold_levels(&mut bids, &delta_bids, true);
            fold_levels(&mut asks, &delta_asks, true);
            MarketEvent::BookSnapshot {
                venue,
                symbol,
                bids,
                asks,
                last_update_id,
                timestamp_ms,
            }
        }
        // Delta onto delta: union of levels, later sizes win; the id range
        // spans both so downstream sequencing still holds.
        (
            MarketEvent::BookDelta {
                venue,
                symbol,
                mut bids,
                mut asks,
                first_update_id,
                last_update_id: _,
                timestamp_ms: _,
            },
            MarketEvent::BookDelta {
                bids: delta_bids,
                asks: delta_asks,
                last_update_id,
                timestamp_ms,
                ..
            },
        ) => {
            fold_levels(&mut bids, &delta_bids, false);
            fold_levels(&mut asks, &delta_asks, false);
            MarketEvent::BookDelta {
                venue,
                symbol,
                bids,
                asks,
                first_update_id,
                last_update_id,
                timestamp_ms,
            }
        }
        // Remaining combinations cannot arise from one channel; prefer the
        // newer event.
        (_, incoming) => incoming,
    }
}

/// Apply `updates` over `base` in place. With snapshot semantics a zero
/// size is a removal; in delta semantics it must be preserved so the
/// replica also removes the level.
fn fold_levels(base: &mut Levels, updates: &Levels, snapshot_semantics: bool) {
    for &(price, size) in updates {
        if let Some(entry) = base.iter_mut().find(|(p, _)| *p == price) {
            entry.1 = size;
        } else {
            base.push((price, size));
        }
    }
    if snapshot_semantics {
        base.retain(|(_, size)| *size > Decimal::ZERO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sym() -> Symbol {
        Symbol::parse("BTC/USDT").unwrap()
    }

    fn delta(first: u64, last: u64, bids: Levels) -> MarketEvent {
        MarketEvent::BookDelta {
            venue: Venue::Binance,
            symbol: sym(),
            bids,
            asks: vec![],
            first_update_id: first,
            last_update_id: last,
            timestamp_ms: 1,
        }
    }

    #[test]
    fn first_event_passes_immediately() {
        let mut gate = EmitGate::new(Duration::from_millis(100));
        let now = Instant::now();
        assert!(gate.offer(delta(1, 1, vec![]), now).is_some());
    }

    #[test]
    fn second_event_in_window_is_held() {
        let mut gate = EmitGate::new(Duration::from_millis(100));
        let now = Instant::now();
        gate.offer(delta(1, 1, vec![]), now);
        assert!(gate.offer(delta(2, 2, vec![]), now).is_none());
        assert!(gate.next_due().is_some());
    }

    #[test]
    fn deltas_coalesce_with_latest_sizes() {
        let mut gate = EmitGate::new(Duration::from_millis(100));
        let now = Instant::now();
        gate.offer(delta(1, 1, vec![]), now);
        gate.offer(delta(2, 2, vec![(dec!(100), dec!(1))]), now);
        gate.offer(delta(3, 3, vec![(dec!(100), dec!(5)), (dec!(99), dec!(2))]), now);

        let due = gate.drain_due(now + Duration::from_millis(150));
        assert_eq!(due.len(), 1);
        match &due[0] {
            MarketEvent::BookDelta {
                first_update_id,
                last_update_id,
                bids,
                ..
            } => {
                assert_eq!(*first_update_id, 2);
                assert_eq!(*last_update_id, 3);
                assert!(bids.contains(&(dec!(100), dec!(5))));
                assert!(bids.contains(&(dec!(99), dec!(2))));
            }
            other => panic!("expected coalesced delta, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_supersedes_pending_delta() {
        let mut gate = EmitGate::new(Duration::from_millis(100));
        let now = Instant::now();
        gate.offer(delta(1, 1, vec![]), now);
        gate.offer(delta(2, 2, vec![(dec!(100), dec!(1))]), now);
        gate.offer(
            MarketEvent::BookSnapshot {
                venue: Venue::Binance,
                symbol: sym(),
                bids: vec![(dec!(50), dec!(1))],
                asks: vec![],
                last_update_id: 10,
                timestamp_ms: 2,
            },
            now,
        );

        let due = gate.drain_due(now + Duration::from_millis(150));
        assert!(matches!(
            due.as_slice(),
            [MarketEvent::BookSnapshot { last_update_id: 10, .. }]
        ));
    }

    #[test]
    fn invalidate_bypasses_and_clears_pending() {
        let mut gate = EmitGate::new(Duration::from_millis(100));
        let now = Instant::now();
        gate.offer(delta(1, 1, vec![]), now);
        gate.offer(delta(2, 2, vec![(dec!(100), dec!(1))]), now);

        let passed = gate.offer(
            MarketEvent::BookInvalidate {
                venue: Venue::Binance,
                symbol: sym(),
            },
            now,
        );
        assert!(passed.is_some());
        assert!(gate.drain_due(now + Duration::from_millis(150)).is_empty());
    }

    #[test]
    fn ticks_and_books_throttle_independently() {
        let mut gate = EmitGate::new(Duration::from_millis(100));
        let now = Instant::now();
        gate.offer(delta(1, 1, vec![]), now);

        let tick = MarketEvent::Tick(crate::domain::PriceTick {
            venue: Venue::Binance,
            symbol: sym(),
            last: dec!(1),
            bid: dec!(1),
            ask: dec!(1),
            volume_24h: dec!(0),
            timestamp_ms: 0,
        });
        assert!(gate.offer(tick, now).is_some());
    }
}
