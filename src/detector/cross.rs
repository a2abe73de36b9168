//! Cross-venue dislocation detector.
//!
//! Triggered on every tick. For the updated symbol it walks ordered venue
//! pairs with fresh data, prices both legs against the local book replicas,
//! and registers slippage- and fee-adjusted opportunities that clear the
//! confidence gates.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{
    BookSide, CrossMetrics, CrossOpportunity, PriceTick, Symbol,
};
use crate::registry::{BookHealth, BookRegistry, PriceRegistry};

use super::store::OpportunityStore;

/// Tuning knobs for cross-venue detection.
#[derive(Debug, Clone, Deserialize)]
pub struct CrossDetectorConfig {
    /// Minimum net profit percent to register an opportunity.
    #[serde(default = "default_min_profit_percent")]
    pub min_profit_percent: Decimal,
    /// Cap on quote-currency value committed per trade.
    #[serde(default = "default_max_investment")]
    pub max_investment: Decimal,
    /// Minimum combined book liquidity in quote currency.
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity: Decimal,
    /// Maximum combined slippage percent across both legs.
    #[serde(default = "default_max_slippage_percent")]
    pub max_slippage_percent: Decimal,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_min_liquidity_score")]
    pub min_liquidity_score: f64,
    /// Tick freshness guard.
    #[serde(default = "default_tick_ttl_ms")]
    pub tick_ttl_ms: i64,
    /// Book replica freshness guard.
    #[serde(default = "default_book_ttl_ms")]
    pub book_ttl_ms: i64,
    /// Fraction of available liquidity a single trade may consume.
    #[serde(default = "default_liquidity_fraction")]
    pub liquidity_fraction: Decimal,
}

fn default_min_profit_percent() -> Decimal {
    Decimal::new(5, 1) // 0.5%
}
fn default_max_investment() -> Decimal {
    Decimal::from(1000)
}
fn default_min_liquidity() -> Decimal {
    Decimal::from(1000)
}
fn default_max_slippage_percent() -> Decimal {
    Decimal::ONE
}
fn default_min_confidence() -> f64 {
    60.0
}
fn default_min_liquidity_score() -> f64 {
    50.0
}
fn default_tick_ttl_ms() -> i64 {
    10_000
}
fn default_book_ttl_ms() -> i64 {
    10_000
}
fn default_liquidity_fraction() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

impl Default for CrossDetectorConfig {
    fn default() -> Self {
        Self {
            min_profit_percent: default_min_profit_percent(),
            max_investment: default_max_investment(),
            min_liquidity: default_min_liquidity(),
            max_slippage_percent: default_max_slippage_percent(),
            min_confidence: default_min_confidence(),
            min_liquidity_score: default_min_liquidity_score(),
            tick_ttl_ms: default_tick_ttl_ms(),
            book_ttl_ms: default_book_ttl_ms(),
            liquidity_fraction: default_liquidity_fraction(),
        }
    }
}

pub struct CrossVenueDetector {
    config: CrossDetectorConfig,
    prices: Arc<PriceRegistry>,
    books: Arc<BookRegistry>,
    store: Arc<OpportunityStore>,
}

impl CrossVenueDetector {
    pub fn new(
        config: CrossDetectorConfig,
        prices: Arc<PriceRegistry>,
        books: Arc<BookRegistry>,
        store: Arc<OpportunityStore>,
    ) -> Self {
        Self {
            config,
            prices,
            books,
            store,
        }
    }

    /// Evaluate all venue pairs for `symbol` and register any opportunities
    /// that survive the gates. Returns the newly registered ones.
    pub fn on_tick(&self, symbol: &Symbol, now_ms: i64) -> Vec<CrossOpportunity> {
        let ticks = self
            .prices
            .fresh_venues(symbol, now_ms, self.config.tick_ttl_ms);
        let mut registered = Vec::new();

        for buy in &ticks {
            for sell in &ticks {
                if buy.venue == sell.venue {
                    continue;
                }
                if let Some(opp) = self.evaluate_pair(symbol, buy, sell, now_ms) {
                    if self.store.insert_cross(opp.clone(), now_ms) {
                        debug!(
                            symbol = %symbol,
                            buy = %opp.buy_venue,
                            sell = %opp.sell_venue,
                            net_profit = %opp.net_profit,
                            confidence = opp.metrics.confidence,
                            "Cross-venue opportunity registered"
                        );
                        registered.push(opp);
                    }
                }
            }
        }
        registered
    }

    fn evaluate_pair(
        &self,
        symbol: &Symbol,
        buy: &PriceTick,
        sell: &PriceTick,
        now_ms: i64,
    ) -> Option<CrossOpportunity> {
        if sell.last <= buy.last {
            return None;
        }

        let buy_health = self
            .books
            .health(buy.venue, symbol, now_ms, self.config.book_ttl_ms);
        let sell_health = self
            .books
            .health(sell.venue, symbol, now_ms, self.config.book_ttl_ms);

        // A crossed book is a transient inconsistency: skip the pair until
        // the next update resolves it, never estimate around it.
        if buy_health == BookHealth::Crossed || sell_health == BookHealth::Crossed {
            return None;
        }
        if buy_health != BookHealth::Ready || sell_health != BookHealth::Ready {
            return self.estimate_without_depth(symbol, buy, sell, now_ms);
        }

        // Quote-currency liquidity: what each side's ladder could absorb.
        let ask_volume = self
            .books
            .side_volume(buy.venue, symbol, BookSide::Ask)?;
        let bid_volume = self
            .books
            .side_volume(sell.venue, symbol, BookSide::Bid)?;
        let available_liquidity = (ask_volume * buy.last).min(bid_volume * sell.last);
        if available_liquidity < self.config.min_liquidity {
            return None;
        }

        let trade_value = self
            .config
            .max_investment
            .min(available_liquidity * self.config.liquidity_fraction);
        if buy.last.is_zero() {
            return None;
        }
        let base_amount = trade_value / buy.last;

        let buy_fill = self
            .books
            .walk_depth(buy.venue, symbol, BookSide::Ask, base_amount)?;
        let sell_fill = self
            .books
            .walk_depth(sell.venue, symbol, BookSide::Bid, base_amount)?;
        if !buy_fill.feasible || !sell_fill.feasible {
            return None;
        }

        let total_slippage_percent = ((buy_fill.effective_price - buy.last)
            + (sell.last - sell_fill.effective_price))
            / buy.last
            * Decimal::ONE_HUNDRED;
        if total_slippage_percent > self.config.max_slippage_percent {
            return None;
        }

        let buy_fee = buy_fill.effective_price * base_amount * buy.venue.taker_fee();
        let sell_fee = sell_fill.effective_price * base_amount * sell.venue.taker_fee();
        let net_profit = (sell_fill.effective_price - buy_fill.effective_price) * base_amount
            - buy_fee
            - sell_fee;
        if net_profit <= Decimal::ZERO {
            return None;
        }

        let invested = buy_fill.effective_price * base_amount;
        let net_profit_percent = if invested.is_zero() {
            Decimal::ZERO
        } else {
            net_profit / invested * Decimal::ONE_HUNDRED
        };
        if net_profit_percent < self.config.min_profit_percent {
            return None;
        }

        let avg_spread_percent = (buy.spread_percent() + sell.spread_percent())
            .to_f64()
            .unwrap_or(0.0)
            / 2.0;
        let liquidity_score = if self.config.min_liquidity.is_zero() {
            100.0
        } else {
            ((available_liquidity / self.config.min_liquidity * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0))
            .min(100.0)
        };
        let confidence = score_confidence(ScoreInputs {
            buy_age_ms: buy.age_ms(now_ms),
            sell_age_ms: sell.age_ms(now_ms),
            liquidity_score,
            profit_percent: net_profit_percent.to_f64().unwrap_or(0.0),
            avg_spread_percent,
            total_slippage_percent: total_slippage_percent.to_f64().unwrap_or(0.0),
        });

        if confidence < self.config.min_confidence
            || liquidity_score < self.config.min_liquidity_score
        {
            return None;
        }

        let buy_slippage_percent = if buy.last.is_zero() {
            Decimal::ZERO
        } else {
            (buy_fill.effective_price - buy.last) / buy.last * Decimal::ONE_HUNDRED
        };
        let sell_slippage_percent = if sell.last.is_zero() {
            Decimal::ZERO
        } else {
            (sell.last - sell_fill.effective_price) / sell.last * Decimal::ONE_HUNDRED
        };

        Some(CrossOpportunity {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.clone(),
            buy_venue: buy.venue,
            sell_venue: sell.venue,
            buy_price: buy.last,
            sell_price: sell.last,
            trade_size: base_amount,
            net_profit,
            net_profit_percent,
            created_at_ms: now_ms,
            metrics: CrossMetrics {
                effective_buy_price: buy_fill.effective_price,
                effective_sell_price: sell_fill.effective_price,
                buy_slippage_percent,
                sell_slippage_percent,
                fees: buy_fee + sell_fee,
                available_liquidity,
                confidence,
                liquidity_score,
                spread_impact: avg_spread_percent,
            },
        })
    }

    /// Fallback when either book is missing or stale: half-spread stands in
    /// for slippage, and the result carries a flat confidence of 50.
    fn estimate_without_depth(
        &self,
        symbol: &Symbol,
        buy: &PriceTick,
        sell: &PriceTick,
        now_ms: i64,
    ) -> Option<CrossOpportunity> {
        if buy.last.is_zero() {
            return None;
        }
        let buy_slip = buy.spread_percent() / Decimal::TWO;
        let sell_slip = sell.spread_percent() / Decimal::TWO;
        let effective_buy = buy.last * (Decimal::ONE + buy_slip / Decimal::ONE_HUNDRED);
        let effective_sell = sell.last * (Decimal::ONE - sell_slip / Decimal::ONE_HUNDRED);

        let base_amount = self.config.max_investment / buy.last;
        let buy_fee = effective_buy * base_amount * buy.venue.taker_fee();
        let sell_fee = effective_sell * base_amount * sell.venue.taker_fee();
        let net_profit =
            (effective_sell - effective_buy) * base_amount - buy_fee - sell_fee;
        if net_profit <= Decimal::ZERO {
            return None;
        }
        let invested = effective_buy * base_amount;
        let net_profit_percent = net_profit / invested * Decimal::ONE_HUNDRED;

        Some(CrossOpportunity {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.clone(),
            buy_venue: buy.venue,
            sell_venue: sell.venue,
            buy_price: buy.last,
            sell_price: sell.last,
            trade_size: base_amount,
            net_profit,
            net_profit_percent,
            created_at_ms: now_ms,
            metrics: CrossMetrics {
                effective_buy_price: effective_buy,
                effective_sell_price: effective_sell,
                buy_slippage_percent: buy_slip,
                sell_slippage_percent: sell_slip,
                fees: buy_fee + sell_fee,
                available_liquidity: Decimal::ZERO,
                confidence: 50.0,
                liquidity_score: 0.0,
                spread_impact: ((buy.spread_percent() + sell.spread_percent())
                    .to_f64()
                    .unwrap_or(0.0))
                    / 2.0,
            },
        })
    }
}

struct ScoreInputs {
    buy_age_ms: i64,
    sell_age_ms: i64,
    liquidity_score: f64,
    profit_percent: f64,
    avg_spread_percent: f64,
    total_slippage_percent: f64,
}

/// Weighted confidence score in [0, 100].
fn score_confidence(inputs: ScoreInputs) -> f64 {
    let age_factor =
        (100.0 - (inputs.buy_age_ms + inputs.sell_age_ms) as f64 / 200.0).max(0.0);
    let profit_factor = (inputs.profit_percent * 20.0).min(100.0);
    let spread_factor = (100.0 - inputs.avg_spread_percent * 100.0).max(0.0);
    let slippage_factor = (100.0 - inputs.total_slippage_percent * 50.0).max(0.0);

    age_factor * 0.15
        + inputs.liquidity_score * 0.30
        + profit_factor * 0.25
        + spread_factor * 0.15
        + slippage_factor * 0.15
}
