//! Order-book replication: venue sync rules end to end through the
//! registry, including gap detection and re-snapshot.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use arbhawk::adapter::codec::{DepthSnapshot, Emit, VenueCodec};
use arbhawk::adapter::binance::BinanceCodec;
use arbhawk::domain::{Symbol, Venue};
use arbhawk::exchange::MarketEvent;
use arbhawk::registry::{ApplyOutcome, BookRegistry};

fn sym() -> Symbol {
    Symbol::parse("BTC/USDT").unwrap()
}

fn depth_frame(first: u64, last: u64, bid: Decimal, size: Decimal) -> String {
    serde_json::json!({
        "e": "depthUpdate",
        "E": 1_700_000_000_000_i64,
        "s": "BTCUSDT",
        "U": first,
        "u": last,
        "b": [[bid.to_string(), size.to_string()]],
        "a": [],
    })
    .to_string()
}

fn snapshot(last_update_id: u64) -> DepthSnapshot {
    DepthSnapshot {
        last_update_id,
        bids: vec![(dec!(59990), dec!(1))],
        asks: vec![(dec!(60000), dec!(1))],
    }
}

/// Push codec emissions into the registry, returning snapshot requests.
fn drive(registry: &BookRegistry, emits: Vec<Emit>) -> Vec<Symbol> {
    let mut fetches = Vec::new();
    for emit in emits {
        match emit {
            Emit::Event(event) => {
                registry.apply(&event, 1_700_000_000_000);
            }
            Emit::FetchSnapshot(symbol) => fetches.push(symbol),
        }
    }
    fetches
}

#[test]
fn snapshot_then_chained_deltas_build_the_replica() {
    let mut codec = BinanceCodec::new();
    let registry = BookRegistry::new();

    let fetches = drive(
        &registry,
        codec.decode(&depth_frame(101, 101, dec!(59991), dec!(2))).unwrap(),
    );
    assert_eq!(fetches, vec![sym()]);

    drive(&registry, codec.on_snapshot(&sym(), snapshot(100)));
    drive(
        &registry,
        codec.decode(&depth_frame(102, 102, dec!(59992), dec!(3))).unwrap(),
    );

    let top = registry.top_of_book(Venue::Binance, &sym()).unwrap();
    assert_eq!(top.bid, dec!(59992));
    assert_eq!(top.bid_qty, dec!(3));
    assert!(registry.usable(Venue::Binance, &sym(), 1_700_000_000_000, 10_000));
}

/// Snapshot at 100, deltas 101, 102, then 104. The dropped 103 must
/// discard the replica, surface `BookInvalidate`, and request a fresh
/// snapshot.
#[test]
fn dropped_delta_triggers_resnapshot() {
    let mut codec = BinanceCodec::new();
    let registry = BookRegistry::new();

    drive(&registry, codec.decode(&depth_frame(101, 101, dec!(59991), dec!(1))).unwrap());
    drive(&registry, codec.on_snapshot(&sym(), snapshot(100)));
    drive(&registry, codec.decode(&depth_frame(102, 102, dec!(59992), dec!(1))).unwrap());
    assert!(registry.usable(Venue::Binance, &sym(), 1_700_000_000_000, 10_000));

    let emits = codec.decode(&depth_frame(104, 104, dec!(59993), dec!(1))).unwrap();
    assert!(matches!(
        emits[0],
        Emit::Event(MarketEvent::BookInvalidate { .. })
    ));
    let fetches = drive(&registry, emits);
    assert_eq!(fetches, vec![sym()]);

    // Downstream must not read the book until the fresh snapshot lands.
    assert!(!registry.usable(Venue::Binance, &sym(), 1_700_000_000_000, 10_000));

    drive(&registry, codec.on_snapshot(&sym(), snapshot(103)));
    assert!(registry.usable(Venue::Binance, &sym(), 1_700_000_000_000, 10_000));
}

#[test]
fn zero_size_levels_are_removed() {
    let mut codec = BinanceCodec::new();
    let registry = BookRegistry::new();

    drive(&registry, codec.decode(&depth_frame(101, 101, dec!(59990), dec!(5))).unwrap());
    drive(&registry, codec.on_snapshot(&sym(), snapshot(100)));

    // Remove the 59990 level entirely.
    drive(&registry, codec.decode(&depth_frame(102, 102, dec!(59990), dec!(0))).unwrap());
    assert!(registry.top_of_book(Venue::Binance, &sym()).is_none());
}

#[test]
fn bid_never_exceeds_ask_after_applied_deltas() {
    let mut codec = BinanceCodec::new();
    let registry = BookRegistry::new();

    drive(&registry, codec.decode(&depth_frame(101, 101, dec!(59990), dec!(1))).unwrap());
    drive(&registry, codec.on_snapshot(&sym(), snapshot(100)));
    for i in 0..20_u64 {
        let price = dec!(59000) + Decimal::from(i * 10);
        drive(
            &registry,
            codec
                .decode(&depth_frame(102 + i, 102 + i, price, dec!(1)))
                .unwrap(),
        );
        let top = registry.top_of_book(Venue::Binance, &sym()).unwrap();
        assert!(top.bid <= top.ask, "crossed after delta {i}: {top:?}");
    }
}

#[test]
fn registry_rejects_gap_that_slips_past_the_adapter() {
    let registry = BookRegistry::new();
    registry.apply(
        &MarketEvent::BookSnapshot {
            venue: Venue::Okx,
            symbol: sym(),
            bids: vec![(dec!(100), dec!(1))],
            asks: vec![(dec!(101), dec!(1))],
            last_update_id: 10,
            timestamp_ms: 1,
        },
        1,
    );

    let outcome = registry.apply(
        &MarketEvent::BookDelta {
            venue: Venue::Okx,
            symbol: sym(),
            bids: vec![(dec!(100.5), dec!(1))],
            asks: vec![],
            first_update_id: 13,
            last_update_id: 13,
            timestamp_ms: 2,
        },
        2,
    );
    assert_eq!(outcome, ApplyOutcome::Gap);
    assert!(!registry.usable(Venue::Okx, &sym(), 2, 10_000));
}
