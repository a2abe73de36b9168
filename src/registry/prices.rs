//! In-memory cache of the last tick per (venue, symbol).

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::{PriceTick, Symbol, Venue};

/// Thread-safe last-tick registry.
///
/// Single writer per (venue, symbol), the venue's adapter task, and many
/// readers. Readers always see a complete tick, never a partial write.
pub struct PriceRegistry {
    ticks: RwLock<HashMap<(Venue, Symbol), PriceTick>>,
}

impl PriceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ticks: RwLock::new(HashMap::new()),
        }
    }

    pub fn update(&self, tick: PriceTick) {
        self.ticks
            .write()
            .insert((tick.venue, tick.symbol.clone()), tick);
    }

    #[must_use]
    pub fn get(&self, venue: Venue, symbol: &Symbol) -> Option<PriceTick> {
        self.ticks.read().get(&(venue, symbol.clone())).cloned()
    }

    /// The tick if present and younger than `ttl_ms`.
    #[must_use]
    pub fn fresh(&self, venue: Venue, symbol: &Symbol, now_ms: i64, ttl_ms: i64) -> Option<PriceTick> {
        self.get(venue, symbol)
            .filter(|t| !t.is_stale(now_ms, ttl_ms))
    }

    /// All venues holding a fresh tick for `symbol`, in one consistent read.
    #[must_use]
    pub fn fresh_venues(&self, symbol: &Symbol, now_ms: i64, ttl_ms: i64) -> Vec<PriceTick> {
        let ticks = self.ticks.read();
        ticks
            .iter()
            .filter(|((_, s), t)| s == symbol && !t.is_stale(now_ms, ttl_ms))
            .map(|(_, t)| t.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ticks.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PriceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick(venue: Venue, ts: i64) -> PriceTick {
        PriceTick {
            venue,
            symbol: Symbol::parse("BTC/USDT").unwrap(),
            last: dec!(60000),
            bid: dec!(59995),
            ask: dec!(60005),
            volume_24h: dec!(100),
            timestamp_ms: ts,
        }
    }

    #[test]
    fn update_replaces_prior_tick() {
        let registry = PriceRegistry::new();
        registry.update(tick(Venue::Binance, 1_000));
        registry.update(tick(Venue::Binance, 2_000));

        let sym = Symbol::parse("BTC/USDT").unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(Venue::Binance, &sym).unwrap().timestamp_ms,
            2_000
        );
    }

    #[test]
    fn fresh_filters_by_ttl() {
        let registry = PriceRegistry::new();
        registry.update(tick(Venue::Binance, 1_000));

        let sym = Symbol::parse("BTC/USDT").unwrap();
        assert!(registry.fresh(Venue::Binance, &sym, 2_000, 2_000).is_some());
        assert!(registry.fresh(Venue::Binance, &sym, 9_000, 2_000).is_none());
    }

    #[test]
    fn fresh_venues_collects_all() {
        let registry = PriceRegistry::new();
        registry.update(tick(Venue::Binance, 1_000));
        registry.update(tick(Venue::Bybit, 1_500));
        registry.update(tick(Venue::Okx, 100)); // stale

        let sym = Symbol::parse("BTC/USDT").unwrap();
        let fresh = registry.fresh_venues(&sym, 2_000, 1_000);
        assert_eq!(fresh.len(), 2);
    }
}
