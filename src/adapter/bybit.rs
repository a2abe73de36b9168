//! Bybit v5 spot stream codec.
//!
//! Both snapshot and delta arrive on the stream (`orderbook.50` topic), so
//! no REST seeding is needed. A delta received before its snapshot is
//! logged and discarded. The venue requires a client ping every 20 s.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::domain::{PriceTick, Symbol, Venue};
use crate::error::{Error, Result};
use crate::exchange::{symbols, MarketEvent};

use super::codec::{parse_levels, Emit, VenueCodec};

const DEFAULT_TOPICS_PER_FRAME: usize = 10;
const PING_INTERVAL: Duration = Duration::from_secs(20);
const BOOK_DEPTH: u32 = 50;

pub struct BybitCodec {
    topics_per_frame: usize,
    /// Last seen `u` per initialized symbol.
    sequences: HashMap<Symbol, u64>,
}

impl BybitCodec {
    #[must_use]
    pub fn new() -> Self {
        Self {
            topics_per_frame: DEFAULT_TOPICS_PER_FRAME,
            sequences: HashMap::new(),
        }
    }

    fn decode_book(&mut self, frame: BookFrame) -> Vec<Emit> {
        let Some(symbol) = symbols::from_venue(Venue::Bybit, &frame.data.symbol) else {
            return Vec::new();
        };
        let bids = parse_levels(&frame.data.bids);
        let asks = parse_levels(&frame.data.asks);

        match frame.message_type.as_str() {
            "snapshot" => {
                self.sequences.insert(symbol.clone(), frame.data.update_id);
                vec![Emit::Event(MarketEvent::BookSnapshot {
                    venue: Venue::Bybit,
                    symbol,
                    bids,
                    asks,
                    last_update_id: frame.data.update_id,
                    timestamp_ms: frame.ts,
                })]
            }
            "delta" => {
                let Some(last) = self.sequences.get_mut(&symbol) else {
                    warn!(symbol = %symbol, "Delta before snapshot discarded");
                    return Vec::new();
                };
                if frame.data.update_id <= *last {
                    return Vec::new();
                }
                let first = *last + 1;
                *last = frame.data.update_id;
                vec![Emit::Event(MarketEvent::BookDelta {
                    venue: Venue::Bybit,
                    symbol,
                    bids,
                    asks,
                    first_update_id: first,
                    last_update_id: frame.data.update_id,
                    timestamp_ms: frame.ts,
                })]
            }
            other => {
                warn!(message_type = other, "Unknown bybit book frame type");
                Vec::new()
            }
        }
    }

    fn decode_ticker(&self, frame: TickerFrame) -> Result<Vec<Emit>> {
        let Some(symbol) = symbols::from_venue(Venue::Bybit, &frame.data.symbol) else {
            return Ok(Vec::new());
        };
        let tick = PriceTick {
            venue: Venue::Bybit,
            symbol,
            last: parse_decimal(&frame.data.last_price)?,
            bid: parse_decimal(&frame.data.bid_price)?,
            ask: parse_decimal(&frame.data.ask_price)?,
            volume_24h: parse_decimal(&frame.data.volume_24h)?,
            timestamp_ms: frame.ts,
        };
        Ok(vec![Emit::Event(MarketEvent::Tick(tick))])
    }
}

impl Default for BybitCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl VenueCodec for BybitCodec {
    fn venue(&self) -> Venue {
        Venue::Bybit
    }

    fn subscribe_frames(&mut self, symbols_in: &[Symbol]) -> Vec<String> {
        let topics: Vec<String> = symbols_in
            .iter()
            .flat_map(|s| {
                let code = symbols::to_venue(Venue::Bybit, s);
                [
                    format!("tickers.{code}"),
                    format!("orderbook.{BOOK_DEPTH}.{code}"),
                ]
            })
            .collect();

        topics
            .chunks(self.topics_per_frame)
            .map(|chunk| {
                serde_json::json!({
                    "op": "subscribe",
                    "args": chunk,
                })
                .to_string()
            })
            .collect()
    }

    fn keepalive(&self) -> Option<(String, Duration)> {
        Some((r#"{"op":"ping"}"#.to_string(), PING_INTERVAL))
    }

    fn decode(&mut self, text: &str) -> Result<Vec<Emit>> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(|e| Error::Wire {
            venue: "bybit",
            detail: e.to_string(),
        })?;
        // Op acks and pong replies carry no topic.
        let Some(topic) = value.get("topic").and_then(|t| t.as_str()) else {
            return Ok(Vec::new());
        };

        if topic.starts_with("orderbook.") {
            let frame: BookFrame = serde_json::from_value(value).map_err(wire_error)?;
            Ok(self.decode_book(frame))
        } else if topic.starts_with("tickers.") {
            let frame: TickerFrame = serde_json::from_value(value).map_err(wire_error)?;
            self.decode_ticker(frame)
        } else {
            Ok(Vec::new())
        }
    }

    fn reset(&mut self) {
        self.sequences.clear();
    }
}

fn wire_error(e: serde_json::Error) -> Error {
    Error::Wire {
        venue: "bybit",
        detail: e.to_string(),
    }
}

fn parse_decimal(raw: &str) -> Result<rust_decimal::Decimal> {
    raw.parse().map_err(|_| Error::Wire {
        venue: "bybit",
        detail: format!("bad decimal: {raw}"),
    })
}

#[derive(Debug, Deserialize)]
struct BookFrame {
    #[serde(rename = "type")]
    message_type: String,
    ts: i64,
    data: BookData,
}

#[derive(Debug, Deserialize)]
struct BookData {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "b", default)]
    bids: Vec<Vec<String>>,
    #[serde(rename = "a", default)]
    asks: Vec<Vec<String>>,
    #[serde(rename = "u")]
    update_id: u64,
}

#[derive(Debug, Deserialize)]
struct TickerFrame {
    ts: i64,
    data: TickerData,
}

#[derive(Debug, Deserialize)]
struct TickerData {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "bid1Price")]
    bid_price: String,
    #[serde(rename = "ask1Price")]
    ask_price: String,
    #[serde(rename = "volume24h")]
    volume_24h: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book_frame(message_type: &str, update_id: u64) -> String {
        serde_json::json!({
            "topic": "orderbook.50.BTCUSDT",
            "type": message_type,
            "ts": 1_700_000_000_000_i64,
            "data": {
                "s": "BTCUSDT",
                "b": [["59990", "1"]],
                "a": [["60000", "1"]],
                "u": update_id,
                "seq": update_id,
            },
        })
        .to_string()
    }

    #[test]
    fn snapshot_initializes_then_delta_applies() {
        let mut codec = BybitCodec::new();
        let emits = codec.decode(&book_frame("snapshot", 10)).unwrap();
        assert!(matches!(
            emits.as_slice(),
            [Emit::Event(MarketEvent::BookSnapshot { last_update_id: 10, .. })]
        ));

        let emits = codec.decode(&book_frame("delta", 11)).unwrap();
        assert!(matches!(
            emits.as_slice(),
            [Emit::Event(MarketEvent::BookDelta { last_update_id: 11, .. })]
        ));
    }

    #[test]
    fn delta_before_snapshot_discarded() {
        let mut codec = BybitCodec::new();
        let emits = codec.decode(&book_frame("delta", 5)).unwrap();
        assert!(emits.is_empty());
    }

    #[test]
    fn stale_delta_discarded() {
        let mut codec = BybitCodec::new();
        codec.decode(&book_frame("snapshot", 10)).unwrap();
        let emits = codec.decode(&book_frame("delta", 10)).unwrap();
        assert!(emits.is_empty());
    }

    #[test]
    fn ticker_decodes() {
        let mut codec = BybitCodec::new();
        let frame = serde_json::json!({
            "topic": "tickers.BTCUSDT",
            "type": "snapshot",
            "ts": 1_700_000_000_000_i64,
            "data": {
                "symbol": "BTCUSDT",
                "lastPrice": "60000.1",
                "bid1Price": "60000.0",
                "ask1Price": "60000.2",
                "volume24h": "999.9",
            },
        })
        .to_string();

        let emits = codec.decode(&frame).unwrap();
        match emits.as_slice() {
            [Emit::Event(MarketEvent::Tick(tick))] => {
                assert_eq!(tick.symbol.as_str(), "BTC/USDT");
                assert_eq!(tick.last, dec!(60000.1));
            }
            other => panic!("expected tick, got {other:?}"),
        }
    }

    #[test]
    fn pong_and_acks_ignored() {
        let mut codec = BybitCodec::new();
        assert!(codec
            .decode(r#"{"success":true,"op":"subscribe","conn_id":"x"}"#)
            .unwrap()
            .is_empty());
        assert!(codec.decode(r#"{"op":"pong"}"#).unwrap().is_empty());
    }

    #[test]
    fn keepalive_is_20s_ping() {
        let codec = BybitCodec::new();
        let (frame, interval) = codec.keepalive().unwrap();
        assert_eq!(frame, r#"{"op":"ping"}"#);
        assert_eq!(interval, Duration::from_secs(20));
    }

    #[test]
    fn reset_requires_fresh_snapshot() {
        let mut codec = BybitCodec::new();
        codec.decode(&book_frame("snapshot", 10)).unwrap();
        codec.reset();
        assert!(codec.decode(&book_frame("delta", 11)).unwrap().is_empty());
    }
}
