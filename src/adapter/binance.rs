//! Binance stream codec and REST depth snapshot fetcher.
//!
//! Depth works as a delta stream seeded by a REST snapshot. The sync rules
//! per symbol:
//!
//! 1. Deltas arriving before the snapshot are buffered; the first delta
//!    triggers the fetch.
//! 2. Buffered deltas with `u <= snapshot.lastUpdateId` are dropped.
//! 3. The first retained delta must bracket the snapshot:
//!    `U <= lastUpdateId + 1 <= u`; otherwise the snapshot is stale and is
//!    fetched again.
//! 4. Afterwards every delta must chain: `U == previous u + 1`. Any gap
//!    discards the book, invalidates downstream, and re-snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::domain::{PriceTick, Symbol, Venue};
use crate::error::{Error, Result};
use crate::exchange::{symbols, Levels, MarketEvent};

use super::codec::{parse_levels, DepthSnapshot, Emit, SnapshotFetcher, VenueCodec};

const DEFAULT_TOPICS_PER_FRAME: usize = 100;
const SNAPSHOT_DEPTH: u32 = 1000;

#[derive(Debug)]
struct BufferedDelta {
    first_update_id: u64,
    last_update_id: u64,
    bids: Levels,
    asks: Levels,
    timestamp_ms: i64,
}

#[derive(Debug)]
enum SyncState {
    /// Snapshot requested; deltas accumulate until it arrives.
    AwaitingSnapshot { buffer: Vec<BufferedDelta> },
    Synced { last_update_id: u64 },
}

pub struct BinanceCodec {
    topics_per_frame: usize,
    next_request_id: u64,
    sync: HashMap<Symbol, SyncState>,
}

impl BinanceCodec {
    #[must_use]
    pub fn new() -> Self {
        Self {
            topics_per_frame: DEFAULT_TOPICS_PER_FRAME,
            next_request_id: 1,
            sync: HashMap::new(),
        }
    }

    fn decode_ticker(&self, msg: TickerMessage) -> Result<Vec<Emit>> {
        let Some(symbol) = symbols::from_venue(Venue::Binance, &msg.symbol) else {
            return Ok(Vec::new());
        };
        let tick = PriceTick {
            venue: Venue::Binance,
            symbol,
            last: parse_decimal(&msg.last, "c")?,
            bid: parse_decimal(&msg.bid, "b")?,
            ask: parse_decimal(&msg.ask, "a")?,
            volume_24h: parse_decimal(&msg.volume, "v")?,
            timestamp_ms: msg.event_time,
        };
        Ok(vec![Emit::Event(MarketEvent::Tick(tick))])
    }

    fn decode_depth(&mut self, msg: DepthMessage) -> Vec<Emit> {
        let Some(symbol) = symbols::from_venue(Venue::Binance, &msg.symbol) else {
            return Vec::new();
        };
        let delta = BufferedDelta {
            first_update_id: msg.first_update_id,
            last_update_id: msg.last_update_id,
            bids: parse_levels(&msg.bids),
            asks: parse_levels(&msg.asks),
            timestamp_ms: msg.event_time,
        };

        match self.sync.get_mut(&symbol) {
            None => {
                debug!(symbol = %symbol, "First delta, requesting depth snapshot");
                self.sync.insert(
                    symbol.clone(),
                    SyncState::AwaitingSnapshot {
                        buffer: vec![delta],
                    },
                );
                vec![Emit::FetchSnapshot(symbol)]
            }
            Some(SyncState::AwaitingSnapshot { buffer }) => {
                buffer.push(delta);
                Vec::new()
            }
            Some(SyncState::Synced { last_update_id }) => {
                if delta.last_update_id <= *last_update_id {
                    return Vec::new();
                }
                if delta.first_update_id != *last_update_id + 1 {
                    warn!(
                        symbol = %symbol,
                        expected = *last_update_id + 1,
                        got = delta.first_update_id,
                        "Update-id gap, re-snapshotting"
                    );
                    self.sync.insert(
                        symbol.clone(),
                        SyncState::AwaitingSnapshot {
                            buffer: vec![delta],
                        },
                    );
                    return vec![
                        Emit::Event(MarketEvent::BookInvalidate {
                            venue: Venue::Binance,
                            symbol: symbol.clone(),
                        }),
                        Emit::FetchSnapshot(symbol),
                    ];
                }
                *last_update_id = delta.last_update_id;
                vec![Emit::Event(MarketEvent::BookDelta {
                    venue: Venue::Binance,
                    symbol,
                    bids: delta.bids,
                    asks: delta.asks,
                    first_update_id: delta.first_update_id,
                    last_update_id: delta.last_update_id,
                    timestamp_ms: delta.timestamp_ms,
                })]
            }
        }
    }
}

impl Default for BinanceCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl VenueCodec for BinanceCodec {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    fn subscribe_frames(&mut self, symbols_in: &[Symbol]) -> Vec<String> {
        let topics: Vec<String> = symbols_in
            .iter()
            .flat_map(|s| {
                let code = symbols::to_venue(Venue::Binance, s).to_ascii_lowercase();
                [format!("{code}@ticker"), format!("{code}@depth@100ms")]
            })
            .collect();

        topics
            .chunks(self.topics_per_frame)
            .map(|chunk| {
                let id = self.next_request_id;
                self.next_request_id += 1;
                serde_json::json!({
                    "method": "SUBSCRIBE",
                    "params": chunk,
                    "id": id,
                })
                .to_string()
            })
            .collect()
    }

    fn decode(&mut self, text: &str) -> Result<Vec<Emit>> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(|e| Error::Wire {
            venue: "binance",
            detail: e.to_string(),
        })?;
        // Subscription acks carry an id and no event type.
        let Some(event_type) = value.get("e").and_then(|e| e.as_str()) else {
            return Ok(Vec::new());
        };
        match event_type {
            "24hrTicker" => {
                let msg: TickerMessage =
                    serde_json::from_value(value).map_err(wire_error)?;
                self.decode_ticker(msg)
            }
            "depthUpdate" => {
                let msg: DepthMessage =
                    serde_json::from_value(value).map_err(wire_error)?;
                Ok(self.decode_depth(msg))
            }
            _ => Ok(Vec::new()),
        }
    }

    fn on_snapshot(&mut self, symbol: &Symbol, snapshot: DepthSnapshot) -> Vec<Emit> {
        let Some(SyncState::AwaitingSnapshot { buffer }) = self.sync.get_mut(symbol) else {
            return Vec::new();
        };

        // Drop deltas the snapshot already covers.
        buffer.retain(|d| d.last_update_id > snapshot.last_update_id);

        if let Some(first) = buffer.first() {
            if first.first_update_id > snapshot.last_update_id + 1 {
                warn!(
                    symbol = %symbol,
                    snapshot_id = snapshot.last_update_id,
                    first_delta = first.first_update_id,
                    "Snapshot stale relative to buffered deltas, refetching"
                );
                return vec![Emit::FetchSnapshot(symbol.clone())];
            }
        }

        let mut emits = vec![Emit::Event(MarketEvent::BookSnapshot {
            venue: Venue::Binance,
            symbol: symbol.clone(),
            bids: snapshot.bids,
            asks: snapshot.asks,
            last_update_id: snapshot.last_update_id,
            timestamp_ms: 0,
        })];

        let mut last = snapshot.last_update_id;
        let buffered = std::mem::take(buffer);
        for delta in buffered {
            // The first retained delta may overlap the snapshot; later ones
            // must chain exactly.
            if delta.first_update_id > last + 1 {
                warn!(
                    symbol = %symbol,
                    expected = last + 1,
                    got = delta.first_update_id,
                    "Gap inside buffered deltas, re-snapshotting"
                );
                self.sync.insert(
                    symbol.clone(),
                    SyncState::AwaitingSnapshot { buffer: Vec::new() },
                );
                emits.push(Emit::Event(MarketEvent::BookInvalidate {
                    venue: Venue::Binance,
                    symbol: symbol.clone(),
                }));
                emits.push(Emit::FetchSnapshot(symbol.clone()));
                return emits;
            }
            last = delta.last_update_id;
            emits.push(Emit::Event(MarketEvent::BookDelta {
                venue: Venue::Binance,
                symbol: symbol.clone(),
                bids: delta.bids,
                asks: delta.asks,
                first_update_id: delta.first_update_id,
                last_update_id: delta.last_update_id,
                timestamp_ms: delta.timestamp_ms,
            }));
        }

        self.sync
            .insert(symbol.clone(), SyncState::Synced { last_update_id: last });
        emits
    }

    fn reset(&mut self) {
        self.sync.clear();
    }
}

fn wire_error(e: serde_json::Error) -> Error {
    Error::Wire {
        venue: "binance",
        detail: e.to_string(),
    }
}

fn parse_decimal(raw: &str, field: &str) -> Result<rust_decimal::Decimal> {
    raw.parse().map_err(|_| Error::Wire {
        venue: "binance",
        detail: format!("bad decimal in field {field}: {raw}"),
    })
}

#[derive(Debug, Deserialize)]
struct TickerMessage {
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "c")]
    last: String,
    #[serde(rename = "b")]
    bid: String,
    #[serde(rename = "a")]
    ask: String,
    #[serde(rename = "v")]
    volume: String,
}

#[derive(Debug, Deserialize)]
struct DepthMessage {
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "U")]
    first_update_id: u64,
    #[serde(rename = "u")]
    last_update_id: u64,
    #[serde(rename = "b", default)]
    bids: Vec<Vec<String>>,
    #[serde(rename = "a", default)]
    asks: Vec<Vec<String>>,
}

/// REST depth snapshot source (`GET /api/v3/depth?symbol=…&limit=1000`).
pub struct BinanceSnapshotFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceSnapshotFetcher {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    #[must_use]
    pub fn shared(base_url: String) -> Arc<dyn SnapshotFetcher> {
        Arc::new(Self::new(base_url))
    }
}

#[derive(Debug, Deserialize)]
struct RestDepth {
    #[serde(rename = "lastUpdateId")]
    last_update_id: u64,
    bids: Vec<Vec<String>>,
    asks: Vec<Vec<String>>,
}

#[async_trait]
impl SnapshotFetcher for BinanceSnapshotFetcher {
    async fn fetch(&self, symbol: &Symbol) -> Result<DepthSnapshot> {
        let url = Url::parse_with_params(
            &format!("{}/api/v3/depth", self.base_url),
            &[
                ("symbol", symbols::to_venue(Venue::Binance, symbol)),
                ("limit", SNAPSHOT_DEPTH.to_string()),
            ],
        )?;
        let depth: RestDepth = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(DepthSnapshot {
            last_update_id: depth.last_update_id,
            bids: parse_levels(&depth.bids),
            asks: parse_levels(&depth.asks),
        })
    }
}
