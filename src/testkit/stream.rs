//! Mock [`VenueStream`] implementations for testing.
//!
//! - [`ScriptedStream`] — pre-loaded connect/subscribe results and events.
//!   Best for error handling and reconnection logic.
//! - [`ChannelStream`] — channel-backed stream with an external control
//!   handle, for integration tests needing on-demand event delivery.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::{Symbol, Venue};
use crate::error::Result;
use crate::exchange::{MarketEvent, VenueStream};

// ---------------------------------------------------------------------------
// ScriptedStream
// ---------------------------------------------------------------------------

/// A mock stream with scripted connect/subscribe results and a fixed event
/// queue. Each call pops the next result, defaulting to `Ok(())` when the
/// queue is exhausted.
pub struct ScriptedStream {
    venue: Venue,
    connect_results: VecDeque<Result<()>>,
    subscribe_results: VecDeque<Result<()>>,
    events: VecDeque<Option<MarketEvent>>,
    connect_count: Arc<AtomicU32>,
    subscribe_count: Arc<AtomicU32>,
}

impl ScriptedStream {
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            connect_results: VecDeque::new(),
            subscribe_results: VecDeque::new(),
            events: VecDeque::new(),
            connect_count: Arc::new(AtomicU32::new(0)),
            subscribe_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_connect_results(mut self, results: Vec<Result<()>>) -> Self {
        self.connect_results = results.into();
        self
    }

    pub fn with_subscribe_results(mut self, results: Vec<Result<()>>) -> Self {
        self.subscribe_results = results.into();
        self
    }

    pub fn with_events(mut self, events: Vec<Option<MarketEvent>>) -> Self {
        self.events = events.into();
        self
    }

    /// Shared counters for asserting connect/subscribe call counts.
    pub fn counts(&self) -> (Arc<AtomicU32>, Arc<AtomicU32>) {
        (self.connect_count.clone(), self.subscribe_count.clone())
    }
}

#[async_trait]
impl VenueStream for ScriptedStream {
    async fn connect(&mut self) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        self.connect_results.pop_front().unwrap_or(Ok(()))
    }

    async fn subscribe(&mut self, _symbols: &[Symbol]) -> Result<()> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        self.subscribe_results.pop_front().unwrap_or(Ok(()))
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        self.events.pop_front().flatten()
    }

    fn venue(&self) -> Venue {
        self.venue
    }
}

// ---------------------------------------------------------------------------
// ChannelStream
// ---------------------------------------------------------------------------

/// A mock stream controlled externally via a [`ChannelStreamHandle`].
pub struct ChannelStream {
    venue: Venue,
    event_rx: tokio::sync::mpsc::Receiver<Option<MarketEvent>>,
    subscribed: Arc<Mutex<Vec<Symbol>>>,
}

/// Control handle for a [`ChannelStream`].
pub struct ChannelStreamHandle {
    event_tx: tokio::sync::mpsc::Sender<Option<MarketEvent>>,
    subscribed: Arc<Mutex<Vec<Symbol>>>,
}

impl ChannelStreamHandle {
    pub async fn send(&self, event: MarketEvent) {
        let _ = self.event_tx.send(Some(event)).await;
    }

    /// Signal end-of-stream; `next_event` returns `None` afterwards.
    pub async fn close(&self) {
        let _ = self.event_tx.send(None).await;
    }

    pub fn subscribed(&self) -> Vec<Symbol> {
        self.subscribed.lock().unwrap().clone()
    }
}

pub fn channel_stream(venue: Venue, buffer: usize) -> (ChannelStream, ChannelStreamHandle) {
    let (tx, rx) = tokio::sync::mpsc::channel(buffer);
    let subscribed = Arc::new(Mutex::new(Vec::new()));
    (
        ChannelStream {
            venue,
            event_rx: rx,
            subscribed: subscribed.clone(),
        },
        ChannelStreamHandle {
            event_tx: tx,
            subscribed,
        },
    )
}

#[async_trait]
impl VenueStream for ChannelStream {
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<()> {
        *self.subscribed.lock().unwrap() = symbols.to_vec();
        Ok(())
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        match self.event_rx.recv().await {
            Some(Some(event)) => Some(event),
            Some(None) | None => None,
        }
    }

    fn venue(&self) -> Venue {
        self.venue
    }
}
