//! Cross-venue detector behavior against seeded registries.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use arbhawk::detector::{CrossDetectorConfig, CrossVenueDetector, OpportunityStore};
use arbhawk::domain::{PriceTick, Symbol, Venue};
use arbhawk::exchange::{Levels, MarketEvent};
use arbhawk::registry::{BookRegistry, PriceRegistry};

const NOW: i64 = 1_700_000_000_000;

fn sym() -> Symbol {
    Symbol::parse("BTC/USDT").unwrap()
}

struct Fixture {
    prices: Arc<PriceRegistry>,
    books: Arc<BookRegistry>,
    store: Arc<OpportunityStore>,
    detector: CrossVenueDetector,
}

fn fixture(config: CrossDetectorConfig) -> Fixture {
    let prices = Arc::new(PriceRegistry::new());
    let books = Arc::new(BookRegistry::new());
    let store = Arc::new(OpportunityStore::new());
    let detector = CrossVenueDetector::new(
        config,
        prices.clone(),
        books.clone(),
        store.clone(),
    );
    Fixture {
        prices,
        books,
        store,
        detector,
    }
}

fn tick(venue: Venue, last: Decimal) -> PriceTick {
    PriceTick {
        venue,
        symbol: sym(),
        last,
        bid: last - dec!(1),
        ask: last + dec!(1),
        volume_24h: dec!(5000),
        timestamp_ms: NOW,
    }
}

fn seed_book(fx: &Fixture, venue: Venue, bids: Levels, asks: Levels) {
    fx.books.apply(
        &MarketEvent::BookSnapshot {
            venue,
            symbol: sym(),
            bids,
            asks,
            last_update_id: 1,
            timestamp_ms: NOW,
        },
        NOW,
    );
}

/// A thin spread nets ~0.05% after fees, below the 0.5% minimum.
#[test]
fn thin_spread_is_rejected_on_min_profit() {
    let fx = fixture(CrossDetectorConfig::default());
    fx.prices.update(tick(Venue::Binance, dec!(60000)));
    fx.prices.update(tick(Venue::Bybit, dec!(60150)));
    seed_book(
        &fx,
        Venue::Binance,
        vec![(dec!(59990), dec!(1))],
        vec![(dec!(60000), dec!(0.5)), (dec!(60010), dec!(2))],
    );
    seed_book(
        &fx,
        Venue::Bybit,
        vec![(dec!(60150), dec!(0.3)), (dec!(60140), dec!(1))],
        vec![(dec!(60160), dec!(1))],
    );

    let found = fx.detector.on_tick(&sym(), NOW);
    assert!(found.is_empty());
    assert_eq!(fx.store.cross_len(), 0);
}

/// A spread wide enough to clear fees and the minimum profit emits an
/// opportunity with confidence >= 60.
#[test]
fn sufficient_spread_emits_opportunity() {
    let fx = fixture(CrossDetectorConfig::default());
    fx.prices.update(tick(Venue::Binance, dec!(59700)));
    fx.prices.update(tick(Venue::Bybit, dec!(60300)));
    seed_book(
        &fx,
        Venue::Binance,
        vec![(dec!(59690), dec!(1))],
        vec![(dec!(59700), dec!(0.5)), (dec!(59710), dec!(2))],
    );
    seed_book(
        &fx,
        Venue::Bybit,
        vec![(dec!(60300), dec!(0.5)), (dec!(60290), dec!(1))],
        vec![(dec!(60310), dec!(1))],
    );

    let found = fx.detector.on_tick(&sym(), NOW);
    assert_eq!(found.len(), 1);
    let opp = &found[0];
    assert_eq!(opp.buy_venue, Venue::Binance);
    assert_eq!(opp.sell_venue, Venue::Bybit);
    assert!(opp.net_profit > Decimal::ZERO);
    assert!(opp.net_profit_percent >= dec!(0.5));
    assert!(opp.metrics.confidence >= 60.0);
    assert!(opp.metrics.liquidity_score >= 50.0);
    // Single-level fills: no slippage on either side.
    assert_eq!(opp.metrics.buy_slippage_percent, Decimal::ZERO);
    assert_eq!(opp.metrics.sell_slippage_percent, Decimal::ZERO);
}

/// A price gap equal to the combined fee take nets nothing.
#[test]
fn fee_sized_spread_yields_no_opportunity() {
    let fx = fixture(CrossDetectorConfig {
        min_profit_percent: Decimal::ZERO,
        ..CrossDetectorConfig::default()
    });
    // binance + bybit taker fees are 0.10% each; a 0.20% gap nets <= 0.
    fx.prices.update(tick(Venue::Binance, dec!(10000)));
    fx.prices.update(tick(Venue::Bybit, dec!(10020)));
    seed_book(
        &fx,
        Venue::Binance,
        vec![(dec!(9990), dec!(5))],
        vec![(dec!(10000), dec!(5))],
    );
    seed_book(
        &fx,
        Venue::Bybit,
        vec![(dec!(10020), dec!(5))],
        vec![(dec!(10030), dec!(5))],
    );

    assert!(fx.detector.on_tick(&sym(), NOW).is_empty());
}

#[test]
fn exhausted_book_is_infeasible() {
    // Force the walk to need more than the resting depth.
    let fx = fixture(CrossDetectorConfig {
        max_investment: dec!(100000),
        liquidity_fraction: Decimal::ONE,
        min_profit_percent: Decimal::ZERO,
        max_slippage_percent: dec!(100),
        ..CrossDetectorConfig::default()
    });
    fx.prices.update(tick(Venue::Binance, dec!(59700)));
    fx.prices.update(tick(Venue::Bybit, dec!(60300)));
    seed_book(
        &fx,
        Venue::Binance,
        vec![(dec!(59690), dec!(0.5))],
        vec![(dec!(59700), dec!(0.5))],
    );
    // Bid depth is the binding side: the sized trade cannot fully sell.
    seed_book(
        &fx,
        Venue::Bybit,
        vec![(dec!(60300), dec!(0.4))],
        vec![(dec!(60310), dec!(0.5))],
    );

    assert!(fx.detector.on_tick(&sym(), NOW).is_empty());
}

#[test]
fn crossed_book_skips_the_pair_entirely() {
    let fx = fixture(CrossDetectorConfig::default());
    fx.prices.update(tick(Venue::Binance, dec!(59700)));
    fx.prices.update(tick(Venue::Bybit, dec!(60300)));
    seed_book(
        &fx,
        Venue::Binance,
        vec![(dec!(59690), dec!(1))],
        vec![(dec!(59700), dec!(1))],
    );
    // Crossed: best bid above best ask.
    seed_book(
        &fx,
        Venue::Bybit,
        vec![(dec!(60400), dec!(1))],
        vec![(dec!(60300), dec!(1))],
    );

    // No full evaluation and no estimator fallback either.
    assert!(fx.detector.on_tick(&sym(), NOW).is_empty());
}

#[test]
fn missing_books_fall_back_to_low_confidence_estimate() {
    let fx = fixture(CrossDetectorConfig::default());
    fx.prices.update(tick(Venue::Binance, dec!(59700)));
    fx.prices.update(tick(Venue::Bybit, dec!(60300)));
    // No books seeded at all.

    let found = fx.detector.on_tick(&sym(), NOW);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].metrics.confidence, 50.0);
    assert!(found[0].net_profit > Decimal::ZERO);
}

#[test]
fn stale_ticks_are_not_evaluated() {
    let fx = fixture(CrossDetectorConfig::default());
    let mut old = tick(Venue::Binance, dec!(59700));
    old.timestamp_ms = NOW - 60_000;
    fx.prices.update(old);
    fx.prices.update(tick(Venue::Bybit, dec!(60300)));

    assert!(fx.detector.on_tick(&sym(), NOW).is_empty());
}

#[test]
fn higher_confidence_replaces_existing_entry() {
    let fx = fixture(CrossDetectorConfig::default());
    fx.prices.update(tick(Venue::Binance, dec!(59700)));
    fx.prices.update(tick(Venue::Bybit, dec!(60300)));
    seed_book(
        &fx,
        Venue::Binance,
        vec![(dec!(59690), dec!(1))],
        vec![(dec!(59700), dec!(2))],
    );
    seed_book(
        &fx,
        Venue::Bybit,
        vec![(dec!(60300), dec!(2))],
        vec![(dec!(60310), dec!(1))],
    );

    let first = fx.detector.on_tick(&sym(), NOW);
    assert_eq!(first.len(), 1);

    // Same data again: equal confidence, not a replacement.
    let again = fx.detector.on_tick(&sym(), NOW);
    assert!(again.is_empty());

    // A better sell-side book widens the net and raises confidence.
    fx.prices.update(tick(Venue::Bybit, dec!(60400)));
    seed_book(
        &fx,
        Venue::Bybit,
        vec![(dec!(60400), dec!(2))],
        vec![(dec!(60410), dec!(1))],
    );
    let improved = fx.detector.on_tick(&sym(), NOW);
    assert_eq!(improved.len(), 1);
    assert!(improved[0].metrics.confidence > first[0].metrics.confidence);
    assert_eq!(fx.store.cross_len(), 1);
}
