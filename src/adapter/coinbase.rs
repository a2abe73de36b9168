//! Coinbase Exchange stream codec (`level2` + `ticker` channels).
//!
//! `snapshot` seeds the book; `l2update` carries side/price/size triples
//! where size zero removes the level. The feed has no per-message sequence
//! id on level2, so the codec numbers updates itself to preserve the
//! engine-wide ordering invariants.

use std::collections::HashMap;

use chrono::DateTime;
use serde::Deserialize;
use tracing::warn;

use crate::domain::{PriceTick, Symbol, Venue};
use crate::error::{Error, Result};
use crate::exchange::{symbols, Levels, MarketEvent};

use super::codec::{parse_levels, Emit, VenueCodec};

const DEFAULT_PRODUCTS_PER_FRAME: usize = 100;

pub struct CoinbaseCodec {
    products_per_frame: usize,
    /// Self-assigned update counter per initialized symbol.
    sequences: HashMap<Symbol, u64>,
}

impl CoinbaseCodec {
    #[must_use]
    pub fn new() -> Self {
        Self {
            products_per_frame: DEFAULT_PRODUCTS_PER_FRAME,
            sequences: HashMap::new(),
        }
    }

    fn decode_snapshot(&mut self, msg: SnapshotMessage) -> Vec<Emit> {
        let Some(symbol) = symbols::from_venue(Venue::Coinbase, &msg.product_id) else {
            return Vec::new();
        };
        self.sequences.insert(symbol.clone(), 1);
        vec![Emit::Event(MarketEvent::BookSnapshot {
            venue: Venue::Coinbase,
            symbol,
            bids: parse_levels(&msg.bids),
            asks: parse_levels(&msg.asks),
            last_update_id: 1,
            timestamp_ms: 0,
        })]
    }

    fn decode_update(&mut self, msg: L2UpdateMessage) -> Vec<Emit> {
        let Some(symbol) = symbols::from_venue(Venue::Coinbase, &msg.product_id) else {
            return Vec::new();
        };
        let Some(sequence) = self.sequences.get_mut(&symbol) else {
            warn!(symbol = %symbol, "l2update before snapshot discarded");
            return Vec::new();
        };

        let mut bids: Levels = Vec::new();
        let mut asks: Levels = Vec::new();
        for change in &msg.changes {
            let [side, price, size] = change.as_slice() else {
                continue;
            };
            let (Ok(price), Ok(size)) = (price.parse(), size.parse()) else {
                continue;
            };
            match side.as_str() {
                "buy" => bids.push((price, size)),
                "sell" => asks.push((price, size)),
                _ => {}
            }
        }

        let first = *sequence + 1;
        *sequence = first;
        vec![Emit::Event(MarketEvent::BookDelta {
            venue: Venue::Coinbase,
            symbol,
            bids,
            asks,
            first_update_id: first,
            last_update_id: first,
            timestamp_ms: parse_time_ms(msg.time.as_deref()),
        })]
    }

    fn decode_ticker(&self, msg: TickerMessage) -> Result<Vec<Emit>> {
        let Some(symbol) = symbols::from_venue(Venue::Coinbase, &msg.product_id) else {
            return Ok(Vec::new());
        };
        let tick = PriceTick {
            venue: Venue::Coinbase,
            symbol,
            last: parse_decimal(&msg.price)?,
            bid: parse_decimal(&msg.best_bid)?,
            ask: parse_decimal(&msg.best_ask)?,
            volume_24h: parse_decimal(&msg.volume_24h)?,
            timestamp_ms: parse_time_ms(msg.time.as_deref()),
        };
        Ok(vec![Emit::Event(MarketEvent::Tick(tick))])
    }
}

impl Default for CoinbaseCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl VenueCodec for CoinbaseCodec {
    fn venue(&self) -> Venue {
        Venue::Coinbase
    }

    fn subscribe_frames(&mut self, symbols_in: &[Symbol]) -> Vec<String> {
        let products: Vec<String> = symbols_in
            .iter()
            .map(|s| symbols::to_venue(Venue::Coinbase, s))
            .collect();

        products
            .chunks(self.products_per_frame)
            .map(|chunk| {
                serde_json::json!({
                    "type": "subscribe",
                    "product_ids": chunk,
                    "channels": ["ticker", "level2"],
                })
                .to_string()
            })
            .collect()
    }

    fn decode(&mut self, text: &str) -> Result<Vec<Emit>> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(|e| Error::Wire {
            venue: "coinbase",
            detail: e.to_string(),
        })?;
        let Some(message_type) = value.get("type").and_then(|t| t.as_str()) else {
            return Ok(Vec::new());
        };
        match message_type {
            "snapshot" => {
                let msg: SnapshotMessage = serde_json::from_value(value).map_err(wire_error)?;
                Ok(self.decode_snapshot(msg))
            }
            "l2update" => {
                let msg: L2UpdateMessage = serde_json::from_value(value).map_err(wire_error)?;
                Ok(self.decode_update(msg))
            }
            "ticker" => {
                let msg: TickerMessage = serde_json::from_value(value).map_err(wire_error)?;
                self.decode_ticker(msg)
            }
            // subscriptions ack, heartbeats, errors
            _ => Ok(Vec::new()),
        }
    }

    fn reset(&mut self) {
        self.sequences.clear();
    }
}

fn wire_error(e: serde_json::Error) -> Error {
    Error::Wire {
        venue: "coinbase",
        detail: e.to_string(),
    }
}

fn parse_decimal(raw: &str) -> Result<rust_decimal::Decimal> {
    raw.parse().map_err(|_| Error::Wire {
        venue: "coinbase",
        detail: format!("bad decimal: {raw}"),
    })
}

fn parse_time_ms(raw: Option<&str>) -> i64 {
    raw.and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.timestamp_millis())
        .unwrap_or(0)
}

#[derive(Debug, Deserialize)]
struct SnapshotMessage {
    product_id: String,
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct L2UpdateMessage {
    product_id: String,
    time: Option<String>,
    #[serde(default)]
    changes: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TickerMessage {
    product_id: String,
    price: String,
    best_bid: String,
    best_ask: String,
    volume_24h: String,
    time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn snapshot_then_update() {
        let mut codec = CoinbaseCodec::new();
        let snapshot = serde_json::json!({
            "type": "snapshot",
            "product_id": "BTC-USD",
            "bids": [["59990", "1"]],
            "asks": [["60000", "1"]],
        })
        .to_string();
        let emits = codec.decode(&snapshot).unwrap();
        assert!(matches!(
            emits.as_slice(),
            [Emit::Event(MarketEvent::BookSnapshot { .. })]
        ));

        let update = serde_json::json!({
            "type": "l2update",
            "product_id": "BTC-USD",
            "time": "2024-05-01T10:00:00.000000Z",
            "changes": [["buy", "59995", "2"], ["sell", "60000", "0"]],
        })
        .to_string();
        let emits = codec.decode(&update).unwrap();
        match emits.as_slice() {
            [Emit::Event(MarketEvent::BookDelta { bids, asks, .. })] => {
                assert_eq!(bids, &vec![(dec!(59995), dec!(2))]);
                // zero size passes through as a removal
                assert_eq!(asks, &vec![(dec!(60000), dec!(0))]);
            }
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn update_before_snapshot_discarded() {
        let mut codec = CoinbaseCodec::new();
        let update = serde_json::json!({
            "type": "l2update",
            "product_id": "BTC-USD",
            "time": "2024-05-01T10:00:00.000000Z",
            "changes": [["buy", "59995", "2"]],
        })
        .to_string();
        assert!(codec.decode(&update).unwrap().is_empty());
    }

    #[test]
    fn self_assigned_sequence_chains() {
        let mut codec = CoinbaseCodec::new();
        let snapshot = serde_json::json!({
            "type": "snapshot",
            "product_id": "BTC-USD",
            "bids": [],
            "asks": [],
        })
        .to_string();
        codec.decode(&snapshot).unwrap();

        let update = serde_json::json!({
            "type": "l2update",
            "product_id": "BTC-USD",
            "time": null,
            "changes": [["buy", "1", "1"]],
        })
        .to_string();
        let first = codec.decode(&update).unwrap();
        let second = codec.decode(&update).unwrap();
        let ids = |emits: &[Emit]| match emits {
            [Emit::Event(MarketEvent::BookDelta {
                first_update_id,
                last_update_id,
                ..
            })] => (*first_update_id, *last_update_id),
            other => panic!("expected delta, got {other:?}"),
        };
        assert_eq!(ids(&first), (2, 2));
        assert_eq!(ids(&second), (3, 3));
    }

    #[test]
    fn ticker_decodes() {
        let mut codec = CoinbaseCodec::new();
        let frame = serde_json::json!({
            "type": "ticker",
            "product_id": "ETH-USD",
            "price": "3000.25",
            "best_bid": "3000.00",
            "best_ask": "3000.50",
            "volume_24h": "842.1",
            "time": "2024-05-01T10:00:00.000000Z",
        })
        .to_string();
        let emits = codec.decode(&frame).unwrap();
        match emits.as_slice() {
            [Emit::Event(MarketEvent::Tick(tick))] => {
                assert_eq!(tick.symbol.as_str(), "ETH/USD");
                assert_eq!(tick.last, dec!(3000.25));
                assert!(tick.timestamp_ms > 0);
            }
            other => panic!("expected tick, got {other:?}"),
        }
    }

    #[test]
    fn subscriptions_ack_ignored() {
        let mut codec = CoinbaseCodec::new();
        assert!(codec
            .decode(r#"{"type":"subscriptions","channels":[]}"#)
            .unwrap()
            .is_empty());
    }
}
