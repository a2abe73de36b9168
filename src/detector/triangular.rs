//! Triangular cycle detector.
//!
//! Works over a fixed set of three-leg conversion paths on a single venue,
//! simulating the cycle leg by leg with depth-walked effective prices and
//! per-leg taker fees.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::domain::{
    BookSide, LegQuote, LegSide, Symbol, TriangularOpportunity, Venue,
};
use crate::registry::{BookRegistry, PriceRegistry};

use super::store::OpportunityStore;

/// One configured conversion cycle.
///
/// `symbols` and `directions` describe the legs in execution order; the
/// cycle must return to `start_currency`.
#[derive(Debug, Clone, Deserialize)]
pub struct TriPath {
    pub venue: Venue,
    pub start_currency: String,
    pub symbols: Vec<Symbol>,
    pub directions: Vec<LegSide>,
    /// Amount committed in the start currency.
    #[serde(default = "default_min_amount")]
    pub min_amount: Decimal,
}

fn default_min_amount() -> Decimal {
    Decimal::from(100)
}

impl TriPath {
    /// Whether `symbol` on `venue` participates in this path.
    #[must_use]
    pub fn touches(&self, venue: Venue, symbol: &Symbol) -> bool {
        self.venue == venue && self.symbols.contains(symbol)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriangularDetectorConfig {
    #[serde(default = "default_min_profit_percent")]
    pub min_profit_percent: Decimal,
    /// Per-leg slippage cap, percent.
    #[serde(default = "default_max_slippage_per_leg")]
    pub max_slippage_per_leg: Decimal,
    /// Whole-cycle slippage cap, percent.
    #[serde(default = "default_max_slippage_total")]
    pub max_slippage_total: Decimal,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Tick freshness guard; triangular legs go stale fast.
    #[serde(default = "default_tick_ttl_ms")]
    pub tick_ttl_ms: i64,
    #[serde(default = "default_book_ttl_ms")]
    pub book_ttl_ms: i64,
    /// Minimum interval between evaluations of the same path.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Assumed venue round-trip per leg, for the execution-time hint.
    #[serde(default = "default_leg_latency_ms")]
    pub leg_latency_ms: u64,
}

fn default_min_profit_percent() -> Decimal {
    Decimal::new(8, 1) // 0.8%
}
fn default_max_slippage_per_leg() -> Decimal {
    Decimal::new(5, 1) // 0.5%
}
fn default_max_slippage_total() -> Decimal {
    Decimal::ONE
}
fn default_min_confidence() -> f64 {
    60.0
}
fn default_tick_ttl_ms() -> i64 {
    2_000
}
fn default_book_ttl_ms() -> i64 {
    10_000
}
fn default_throttle_ms() -> u64 {
    100
}
fn default_leg_latency_ms() -> u64 {
    300
}

impl Default for TriangularDetectorConfig {
    fn default() -> Self {
        Self {
            min_profit_percent: default_min_profit_percent(),
            max_slippage_per_leg: default_max_slippage_per_leg(),
            max_slippage_total: default_max_slippage_total(),
            min_confidence: default_min_confidence(),
            tick_ttl_ms: default_tick_ttl_ms(),
            book_ttl_ms: default_book_ttl_ms(),
            throttle_ms: default_throttle_ms(),
            leg_latency_ms: default_leg_latency_ms(),
        }
    }
}

pub struct TriangularDetector {
    config: TriangularDetectorConfig,
    paths: Vec<TriPath>,
    prices: Arc<PriceRegistry>,
    books: Arc<BookRegistry>,
    store: Arc<OpportunityStore>,
    last_eval: Mutex<HashMap<usize, Instant>>,
}

impl TriangularDetector {
    pub fn new(
        config: TriangularDetectorConfig,
        paths: Vec<TriPath>,
        prices: Arc<PriceRegistry>,
        books: Arc<BookRegistry>,
        store: Arc<OpportunityStore>,
    ) -> Self {
        Self {
            config,
            paths,
            prices,
            books,
            store,
            last_eval: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate every path touched by this tick, throttled per path.
    pub fn on_tick(&self, venue: Venue, symbol: &Symbol, now_ms: i64) -> Vec<TriangularOpportunity> {
        let throttle = Duration::from_millis(self.config.throttle_ms);
        let mut registered = Vec::new();

        for (index, path) in self.paths.iter().enumerate() {
            if !path.touches(venue, symbol) {
                continue;
            }
            {
                let mut last_eval = self.last_eval.lock();
                let now = Instant::now();
                if let Some(last) = last_eval.get(&index) {
                    if now.duration_since(*last) < throttle {
                        continue;
                    }
                }
                last_eval.insert(index, now);
            }
            if let Some(opp) = self.evaluate_path(path, now_ms) {
                if self.store.insert_triangular(opp.clone(), now_ms) {
                    debug!(
                        venue = %opp.venue,
                        profit_percent = %opp.profit_percent(),
                        confidence = opp.confidence,
                        "Triangular opportunity registered"
                    );
                    registered.push(opp);
                }
            }
        }
        registered
    }

    fn evaluate_path(&self, path: &TriPath, now_ms: i64) -> Option<TriangularOpportunity> {
        if path.symbols.len() != 3 || path.directions.len() != 3 {
            return None;
        }

        let mut amount = path.min_amount;
        let start_amount = amount;
        let mut legs: Vec<LegQuote> = Vec::with_capacity(3);
        let mut total_tick_age_ms: i64 = 0;
        let mut book_penalty = 0.0_f64;
        let fee_rate = path.venue.taker_fee();

        for (symbol, &side) in path.symbols.iter().zip(path.directions.iter()) {
            let tick = self
                .prices
                .fresh(path.venue, symbol, now_ms, self.config.tick_ttl_ms)?;
            total_tick_age_ms += tick.age_ms(now_ms);

            let reference = match side {
                LegSide::Buy if !tick.ask.is_zero() => tick.ask,
                LegSide::Sell if !tick.bid.is_zero() => tick.bid,
                // No quote on the needed side: pad the last trade by 5 bps.
                LegSide::Buy => tick.last * (Decimal::ONE + Decimal::new(5, 4)),
                LegSide::Sell => tick.last * (Decimal::ONE - Decimal::new(5, 4)),
            };
            if reference.is_zero() {
                return None;
            }

            let base_amount = match side {
                LegSide::Buy => amount / reference,
                LegSide::Sell => amount,
            };

            let book_usable =
                self.books
                    .usable(path.venue, symbol, now_ms, self.config.book_ttl_ms);
            let effective = if book_usable {
                let walk_side = match side {
                    LegSide::Buy => BookSide::Ask,
                    LegSide::Sell => BookSide::Bid,
                };
                let fill = self
                    .books
                    .walk_depth(path.venue, symbol, walk_side, base_amount)?;
                let spread_percent = self
                    .books
                    .top_of_book(path.venue, symbol)
                    .map(|top| {
                        let mid = (top.bid + top.ask) / Decimal::TWO;
                        if mid.is_zero() {
                            0.0
                        } else {
                            ((top.ask - top.bid) / mid * Decimal::ONE_HUNDRED)
                                .to_f64()
                                .unwrap_or(0.0)
                        }
                    })
                    .unwrap_or(0.0);
                book_penalty += spread_percent.min(10.0);
                if fill.feasible {
                    fill.effective_price
                } else {
                    reference
                }
            } else {
                book_penalty += 5.0;
                reference
            };

            let slippage_percent =
                ((effective - reference) / reference * Decimal::ONE_HUNDRED).abs();
            if slippage_percent > self.config.max_slippage_per_leg {
                return None;
            }

            // Convert, then take the venue's taker fee from the output.
            let converted = match side {
                LegSide::Buy => amount / effective,
                LegSide::Sell => amount * effective,
            };
            let fee = converted * fee_rate;
            amount = converted - fee;

            legs.push(LegQuote {
                symbol: symbol.clone(),
                side,
                price: reference,
                effective_price: effective,
                fee,
                slippage_percent,
            });
        }

        let end_amount = amount;
        if end_amount <= start_amount {
            return None;
        }
        let profit_percent = (end_amount - start_amount) / start_amount * Decimal::ONE_HUNDRED;
        if profit_percent < self.config.min_profit_percent {
            return None;
        }

        let total_slippage: Decimal = legs.iter().map(|l| l.slippage_percent).sum();
        if total_slippage > self.config.max_slippage_total {
            return None;
        }

        let confidence = self.score(
            total_tick_age_ms / 3,
            total_slippage,
            profit_percent,
            book_penalty,
        );
        if confidence < self.config.min_confidence {
            return None;
        }

        let legs: [LegQuote; 3] = legs.try_into().ok()?;
        Some(TriangularOpportunity {
            id: uuid::Uuid::new_v4().to_string(),
            venue: path.venue,
            legs,
            start_amount,
            end_amount,
            confidence,
            execution_hint_ms: 3 * self.config.leg_latency_ms,
            created_at_ms: now_ms,
            valid: true,
        })
    }

    /// Additive confidence model, clamped to [0, 100].
    fn score(
        &self,
        avg_tick_age_ms: i64,
        total_slippage: Decimal,
        profit_percent: Decimal,
        book_penalty: f64,
    ) -> f64 {
        let mut confidence = 100.0_f64;
        confidence -= (avg_tick_age_ms as f64 / 100.0).min(20.0);

        let slippage_ratio = if self.config.max_slippage_total.is_zero() {
            0.0
        } else {
            (total_slippage / self.config.max_slippage_total)
                .to_f64()
                .unwrap_or(0.0)
        };
        confidence -= slippage_ratio * 30.0;
        confidence += (profit_percent.to_f64().unwrap_or(0.0) * 4.0).min(20.0);
        confidence -= book_penalty.min(20.0);

        confidence.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn detector() -> TriangularDetector {
        TriangularDetector::new(
            TriangularDetectorConfig::default(),
            Vec::new(),
            Arc::new(PriceRegistry::new()),
            Arc::new(BookRegistry::new()),
            Arc::new(OpportunityStore::new()),
        )
    }

    #[test]
    fn score_starts_at_100_for_clean_inputs() {
        let d = detector();
        let score = d.score(0, dec!(0), dec!(0), 0.0);
        assert!((score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn score_rewards_profit_and_punishes_slippage() {
        let d = detector();
        let base = d.score(0, dec!(0), dec!(1), 0.0);
        assert!((base - 100.0).abs() < f64::EPSILON); // clamped

        let slipped = d.score(0, dec!(0.5), dec!(1), 0.0);
        assert!(slipped < base);
    }

    #[test]
    fn age_penalty_caps_at_20() {
        let d = detector();
        let score = d.score(100_000, dec!(0), dec!(0), 0.0);
        assert!((score - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn path_touch_matches_venue_and_symbol() {
        let path = TriPath {
            venue: Venue::Binance,
            start_currency: "USDT".into(),
            symbols: vec![
                Symbol::parse("BTC/USDT").unwrap(),
                Symbol::parse("ETH/BTC").unwrap(),
                Symbol::parse("ETH/USDT").unwrap(),
            ],
            directions: vec![LegSide::Buy, LegSide::Buy, LegSide::Sell],
            min_amount: dec!(100),
        };
        assert!(path.touches(Venue::Binance, &Symbol::parse("ETH/BTC").unwrap()));
        assert!(!path.touches(Venue::Bybit, &Symbol::parse("ETH/BTC").unwrap()));
        assert!(!path.touches(Venue::Binance, &Symbol::parse("SOL/USDT").unwrap()));
    }
}
