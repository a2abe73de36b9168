//! Live opportunity set with deduplication and expiry.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::{CrossOpportunity, LegSide, Symbol, TriangularOpportunity, Venue};

const CROSS_TTL_MS: i64 = 5 * 60 * 1_000;
const TRIANGULAR_TTL_MS: i64 = 30 * 1_000;

type CrossKey = (Symbol, Venue, Venue);
type TriKey = (Venue, Vec<(Symbol, LegSide)>);

/// The detectors' output set.
///
/// Each detector is the single writer for its family; readers (the
/// orchestration layer, stats) take snapshots. Inserts are linearizable per
/// key: the winning record is the one later readers observe.
pub struct OpportunityStore {
    cross: RwLock<HashMap<CrossKey, CrossOpportunity>>,
    triangular: RwLock<HashMap<TriKey, TriangularOpportunity>>,
}

impl OpportunityStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cross: RwLock::new(HashMap::new()),
            triangular: RwLock::new(HashMap::new()),
        }
    }

    /// Register a cross-venue opportunity. An existing record for the same
    /// (symbol, buy venue, sell venue) is replaced only by one with strictly
    /// higher confidence. Expired entries are collected on every insert.
    pub fn insert_cross(&self, opportunity: CrossOpportunity, now_ms: i64) -> bool {
        let mut cross = self.cross.write();
        cross.retain(|_, existing| !existing.is_expired(now_ms, CROSS_TTL_MS));

        let key = opportunity.key();
        match cross.get(&key) {
            Some(existing) if existing.metrics.confidence >= opportunity.metrics.confidence => {
                false
            }
            _ => {
                cross.insert(key, opportunity);
                true
            }
        }
    }

    /// Register a triangular opportunity. A dominated newcomer (same path
    /// and directions, lower or equal profit) is discarded.
    pub fn insert_triangular(&self, opportunity: TriangularOpportunity, now_ms: i64) -> bool {
        let mut triangular = self.triangular.write();
        triangular.retain(|_, existing| !existing.is_expired(now_ms, TRIANGULAR_TTL_MS));

        let key = opportunity.key();
        match triangular.get(&key) {
            Some(existing) if existing.profit() >= opportunity.profit() => false,
            _ => {
                triangular.insert(key, opportunity);
                true
            }
        }
    }

    #[must_use]
    pub fn cross_snapshot(&self) -> Vec<CrossOpportunity> {
        self.cross.read().values().cloned().collect()
    }

    #[must_use]
    pub fn triangular_snapshot(&self) -> Vec<TriangularOpportunity> {
        self.triangular.read().values().cloned().collect()
    }

    #[must_use]
    pub fn get_cross(&self, id: &str) -> Option<CrossOpportunity> {
        self.cross.read().values().find(|o| o.id == id).cloned()
    }

    #[must_use]
    pub fn cross_len(&self) -> usize {
        self.cross.read().len()
    }

    #[must_use]
    pub fn triangular_len(&self) -> usize {
        self.triangular.read().len()
    }
}

impl Default for OpportunityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CrossMetrics;
    use rust_decimal_macros::dec;

    fn cross(confidence: f64, created_at_ms: i64) -> CrossOpportunity {
        CrossOpportunity {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: Symbol::parse("BTC/USDT").unwrap(),
            buy_venue: Venue::Binance,
            sell_venue: Venue::Bybit,
            buy_price: dec!(60000),
            sell_price: dec!(60200),
            trade_size: dec!(0.0166),
            net_profit: dec!(6.5),
            net_profit_percent: dec!(0.65),
            created_at_ms,
            metrics: CrossMetrics {
                effective_buy_price: dec!(60000),
                effective_sell_price: dec!(60200),
                buy_slippage_percent: dec!(0),
                sell_slippage_percent: dec!(0),
                fees: dec!(2),
                available_liquidity: dec!(30000),
                confidence,
                liquidity_score: 100.0,
                spread_impact: 0.02,
            },
        }
    }

    #[test]
    fn replaced_only_by_higher_confidence() {
        let store = OpportunityStore::new();
        assert!(store.insert_cross(cross(70.0, 0), 0));
        assert!(!store.insert_cross(cross(65.0, 0), 0));
        assert!(!store.insert_cross(cross(70.0, 0), 0));
        assert!(store.insert_cross(cross(71.0, 0), 0));
        assert_eq!(store.cross_len(), 1);
    }

    #[test]
    fn expired_entries_collected_on_insert() {
        let store = OpportunityStore::new();
        store.insert_cross(cross(70.0, 0), 0);
        // Five minutes later the old record is gone, so a lower-confidence
        // insert wins.
        assert!(store.insert_cross(cross(61.0, CROSS_TTL_MS + 1), CROSS_TTL_MS + 1));
    }
}
