//! Generic WebSocket adapter parameterized by a venue codec.
//!
//! Owns the socket, the keep-alive timer, the emission throttle, and the
//! snapshot-fetch side channel. All protocol knowledge lives in the codec.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::sleep_until;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::domain::{Symbol, Venue};
use crate::error::{Error, Result};
use crate::exchange::{MarketEvent, VenueStream};

use super::codec::{Emit, SnapshotFetcher, VenueCodec};
use super::throttle::EmitGate;

/// Default minimum interval between per-symbol emissions.
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(100);

/// How many times a stale snapshot may be refetched per trigger before the
/// adapter gives up until the next delta arrives.
const MAX_SNAPSHOT_REFETCHES: u32 = 3;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Step {
    Frame(Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>),
    GateDue,
    Keepalive,
}

pub struct WsAdapter<C: VenueCodec> {
    codec: C,
    url: String,
    fetcher: Option<Arc<dyn SnapshotFetcher>>,
    socket: Option<Socket>,
    gate: EmitGate,
    pending: VecDeque<MarketEvent>,
    keepalive_at: Option<tokio::time::Instant>,
}

impl<C: VenueCodec> WsAdapter<C> {
    pub fn new(codec: C, url: String, fetcher: Option<Arc<dyn SnapshotFetcher>>) -> Self {
        Self::with_throttle(codec, url, fetcher, DEFAULT_THROTTLE)
    }

    pub fn with_throttle(
        codec: C,
        url: String,
        fetcher: Option<Arc<dyn SnapshotFetcher>>,
        throttle: Duration,
    ) -> Self {
        Self {
            codec,
            url,
            fetcher,
            socket: None,
            gate: EmitGate::new(throttle),
            pending: VecDeque::new(),
            keepalive_at: None,
        }
    }

    fn schedule_keepalive(&mut self) {
        self.keepalive_at = self
            .codec
            .keepalive()
            .map(|(_, interval)| tokio::time::Instant::now() + interval);
    }

    /// Run codec emissions through the gate and the snapshot side channel.
    async fn process(&mut self, emits: Vec<Emit>) {
        let mut work: VecDeque<Emit> = emits.into();
        let mut refetches = 0;

        while let Some(emit) = work.pop_front() {
            match emit {
                Emit::Event(event) => {
                    if let Some(ready) = self.gate.offer(event, std::time::Instant::now()) {
                        self.pending.push_back(ready);
                    }
                }
                Emit::FetchSnapshot(symbol) => {
                    let Some(fetcher) = self.fetcher.clone() else {
                        warn!(
                            venue = %self.codec.venue(),
                            symbol = %symbol,
                            "Codec requested a snapshot but no fetcher is wired"
                        );
                        continue;
                    };
                    if refetches >= MAX_SNAPSHOT_REFETCHES {
                        warn!(
                            venue = %self.codec.venue(),
                            symbol = %symbol,
                            "Snapshot refetch budget exhausted, waiting for next delta"
                        );
                        continue;
                    }
                    refetches += 1;
                    match fetcher.fetch(&symbol).await {
                        Ok(snapshot) => {
                            for followup in self.codec.on_snapshot(&symbol, snapshot) {
                                work.push_back(followup);
                            }
                        }
                        Err(e) => {
                            warn!(
                                venue = %self.codec.venue(),
                                symbol = %symbol,
                                error = %e,
                                "Depth snapshot fetch failed"
                            );
                        }
                    }
                }
            }
        }
    }

    fn disconnected(&mut self, reason: String) -> MarketEvent {
        self.keepalive_at = None;
        MarketEvent::Disconnected {
            venue: self.codec.venue(),
            reason,
        }
    }
}

#[async_trait]
impl<C: VenueCodec> VenueStream for WsAdapter<C> {
    async fn connect(&mut self) -> Result<()> {
        info!(venue = %self.codec.venue(), url = %self.url, "Connecting venue stream");
        let (socket, response) = connect_async(&self.url).await?;
        debug!(venue = %self.codec.venue(), status = %response.status(), "Stream connected");
        self.socket = Some(socket);
        self.codec.reset();
        self.gate.clear();
        self.pending.clear();
        self.schedule_keepalive();
        self.pending.push_back(MarketEvent::Connected {
            venue: self.codec.venue(),
        });
        Ok(())
    }

    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<()> {
        let frames = self.codec.subscribe_frames(symbols);
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| Error::Connection("subscribe before connect".into()))?;
        info!(
            venue = %self.codec.venue(),
            symbols = symbols.len(),
            frames = frames.len(),
            "Subscribing"
        );
        for frame in frames {
            socket.send(Message::Text(frame)).await?;
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            // The socket is taken for the duration of one select step so
            // the arms below can use `self` freely, then put back.
            let mut socket = self.socket.take()?;

            let far = tokio::time::Instant::now() + Duration::from_secs(3600);
            let gate_deadline = self
                .gate
                .next_due()
                .map(tokio::time::Instant::from_std)
                .unwrap_or(far);
            let keepalive_deadline = self.keepalive_at.unwrap_or(far);

            let step = tokio::select! {
                frame = socket.next() => Step::Frame(frame),
                _ = sleep_until(gate_deadline) => Step::GateDue,
                _ = sleep_until(keepalive_deadline) => Step::Keepalive,
            };

            match step {
                Step::Frame(Some(Ok(Message::Text(text)))) => {
                    self.socket = Some(socket);
                    match self.codec.decode(&text) {
                        Ok(emits) => self.process(emits).await,
                        Err(e) => {
                            // Wire errors drop the frame, not the link.
                            warn!(venue = %self.codec.venue(), error = %e, "Dropped frame");
                        }
                    }
                }
                Step::Frame(Some(Ok(Message::Ping(payload)))) => {
                    let _ = socket.send(Message::Pong(payload)).await;
                    self.socket = Some(socket);
                }
                Step::Frame(Some(Ok(Message::Close(frame)))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "closed by server".into());
                    return Some(self.disconnected(reason));
                }
                Step::Frame(Some(Ok(_))) => {
                    self.socket = Some(socket);
                }
                Step::Frame(Some(Err(e))) => {
                    return Some(self.disconnected(e.to_string()));
                }
                Step::Frame(None) => {
                    return Some(self.disconnected("stream ended".into()));
                }
                Step::GateDue => {
                    self.socket = Some(socket);
                    for event in self.gate.drain_due(std::time::Instant::now()) {
                        self.pending.push_back(event);
                    }
                }
                Step::Keepalive => {
                    if let Some((frame, _)) = self.codec.keepalive() {
                        if let Err(e) = socket.send(Message::Text(frame)).await {
                            return Some(self.disconnected(format!("keepalive failed: {e}")));
                        }
                    }
                    self.socket = Some(socket);
                    self.schedule_keepalive();
                }
            }
        }
    }

    fn venue(&self) -> Venue {
        self.codec.venue()
    }
}
