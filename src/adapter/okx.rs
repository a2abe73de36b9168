//! OKX v5 public stream codec (`books` + `tickers` channels).
//!
//! Book frames carry `seqId`/`prevSeqId`. An update whose `prevSeqId` does
//! not match the stored sequence means a dropped frame: the book state is
//! discarded, downstream is invalidated, and the symbol waits for a fresh
//! snapshot. Idle connections require a text `ping` under 30 s.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::domain::{PriceTick, Symbol, Venue};
use crate::error::{Error, Result};
use crate::exchange::{symbols, MarketEvent};

use super::codec::{parse_levels, Emit, VenueCodec};

const DEFAULT_ARGS_PER_FRAME: usize = 20;
const PING_INTERVAL: Duration = Duration::from_secs(25);

pub struct OkxCodec {
    args_per_frame: usize,
    /// Last seen `seqId` per initialized symbol.
    sequences: HashMap<Symbol, i64>,
}

impl OkxCodec {
    #[must_use]
    pub fn new() -> Self {
        Self {
            args_per_frame: DEFAULT_ARGS_PER_FRAME,
            sequences: HashMap::new(),
        }
    }

    fn decode_books(&mut self, frame: BookFrame) -> Vec<Emit> {
        let Some(symbol) = symbols::from_venue(Venue::Okx, &frame.arg.inst_id) else {
            return Vec::new();
        };
        let mut emits = Vec::new();

        for page in frame.data {
            let bids = parse_levels(&page.bids);
            let asks = parse_levels(&page.asks);
            let timestamp_ms = page.ts.parse().unwrap_or(0);

            match frame.action.as_deref() {
                Some("snapshot") => {
                    self.sequences.insert(symbol.clone(), page.seq_id);
                    emits.push(Emit::Event(MarketEvent::BookSnapshot {
                        venue: Venue::Okx,
                        symbol: symbol.clone(),
                        bids,
                        asks,
                        last_update_id: page.seq_id.max(0) as u64,
                        timestamp_ms,
                    }));
                }
                Some("update") => {
                    let Some(last) = self.sequences.get(&symbol).copied() else {
                        warn!(symbol = %symbol, "Update before snapshot discarded");
                        continue;
                    };
                    if page.prev_seq_id != last {
                        warn!(
                            symbol = %symbol,
                            expected = last,
                            got = page.prev_seq_id,
                            "Sequence gap, dropping book until next snapshot"
                        );
                        self.sequences.remove(&symbol);
                        emits.push(Emit::Event(MarketEvent::BookInvalidate {
                            venue: Venue::Okx,
                            symbol: symbol.clone(),
                        }));
                        continue;
                    }
                    self.sequences.insert(symbol.clone(), page.seq_id);
                    emits.push(Emit::Event(MarketEvent::BookDelta {
                        venue: Venue::Okx,
                        symbol: symbol.clone(),
                        bids,
                        asks,
                        first_update_id: last.max(0) as u64 + 1,
                        last_update_id: page.seq_id.max(0) as u64,
                        timestamp_ms,
                    }));
                }
                other => {
                    warn!(action = ?other, "Unknown okx book action");
                }
            }
        }
        emits
    }

    fn decode_tickers(&self, frame: TickerFrame) -> Result<Vec<Emit>> {
        let mut emits = Vec::new();
        for data in frame.data {
            let Some(symbol) = symbols::from_venue(Venue::Okx, &data.inst_id) else {
                continue;
            };
            let tick = PriceTick {
                venue: Venue::Okx,
                symbol,
                last: parse_decimal(&data.last)?,
                bid: parse_decimal(&data.bid_px)?,
                ask: parse_decimal(&data.ask_px)?,
                volume_24h: parse_decimal(&data.vol_24h)?,
                timestamp_ms: data.ts.parse().unwrap_or(0),
            };
            emits.push(Emit::Event(MarketEvent::Tick(tick)));
        }
        Ok(emits)
    }
}

impl Default for OkxCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl VenueCodec for OkxCodec {
    fn venue(&self) -> Venue {
        Venue::Okx
    }

    fn subscribe_frames(&mut self, symbols_in: &[Symbol]) -> Vec<String> {
        let args: Vec<serde_json::Value> = symbols_in
            .iter()
            .flat_map(|s| {
                let inst_id = symbols::to_venue(Venue::Okx, s);
                [
                    serde_json::json!({"channel": "tickers", "instId": inst_id}),
                    serde_json::json!({"channel": "books", "instId": inst_id}),
                ]
            })
            .collect();

        args.chunks(self.args_per_frame)
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
        Some(("ping".to_string(), PING_INTERVAL))
    }

    fn decode(&mut self, text: &str) -> Result<Vec<Emit>> {
        if text == "pong" {
            return Ok(Vec::new());
        }
        let value: serde_json::Value = serde_json::from_str(text).map_err(|e| Error::Wire {
            venue: "okx",
            detail: e.to_string(),
        })?;
        // Event frames (subscribe acks, errors) carry no data payload.
        if value.get("data").is_none() {
            return Ok(Vec::new());
        }
        let channel = value
            .pointer("/arg/channel")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();
        match channel.as_str() {
            "books" => {
                let frame: BookFrame = serde_json::from_value(value).map_err(wire_error)?;
                Ok(self.decode_books(frame))
            }
            "tickers" => {
                let frame: TickerFrame = serde_json::from_value(value).map_err(wire_error)?;
                self.decode_tickers(frame)
            }
            _ => Ok(Vec::new()),
        }
    }

    fn reset(&mut self) {
        self.sequences.clear();
    }
}

fn wire_error(e: serde_json::Error) -> Error {
    Error::Wire {
        venue: "okx",
        detail: e.to_string(),
    }
}

fn parse_decimal(raw: &str) -> Result<rust_decimal::Decimal> {
    raw.parse().map_err(|_| Error::Wire {
        venue: "okx",
        detail: format!("bad decimal: {raw}"),
    })
}

#[derive(Debug, Deserialize)]
struct BookFrame {
    arg: Arg,
    action: Option<String>,
    data: Vec<BookPage>,
}

#[derive(Debug, Deserialize)]
struct Arg {
    #[serde(rename = "instId")]
    inst_id: String,
}

#[derive(Debug, Deserialize)]
struct BookPage {
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
    ts: String,
    #[serde(rename = "seqId")]
    seq_id: i64,
    #[serde(rename = "prevSeqId", default = "default_prev_seq")]
    prev_seq_id: i64,
}

fn default_prev_seq() -> i64 {
    -1
}

#[derive(Debug, Deserialize)]
struct TickerFrame {
    data: Vec<TickerData>,
}

#[derive(Debug, Deserialize)]
struct TickerData {
    #[serde(rename = "instId")]
    inst_id: String,
    last: String,
    #[serde(rename = "bidPx")]
    bid_px: String,
    #[serde(rename = "askPx")]
    ask_px: String,
    #[serde(rename = "vol24h")]
    vol_24h: String,
    ts: String,
}
