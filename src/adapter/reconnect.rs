//! Reconnecting wrapper for any [`VenueStream`].
//!
//! Transparently handles disconnections with exponential backoff and
//! resubscribes tracked symbols. Dropping the connection invalidates every
//! in-memory book for the venue, so the wrapper emits `BookInvalidate` for
//! each subscribed symbol before events resume. When the attempt budget is
//! exhausted it emits `ConnectionLost` and ends the stream; restart is
//! operator-initiated.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::domain::Symbol;
use crate::error::Result;
use crate::exchange::{MarketEvent, VenueStream};

/// Reconnection and backoff policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Consecutive failed reconnects tolerated before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_delay_ms() -> u64 {
    5_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    60_000
}
fn default_max_attempts() -> u32 {
    5
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

pub struct ReconnectingStream<S: VenueStream> {
    inner: S,
    config: ReconnectConfig,
    subscribed: Vec<Symbol>,
    attempts: u32,
    current_delay_ms: u64,
    connected: bool,
    dead: bool,
    pending: VecDeque<MarketEvent>,
}

impl<S: VenueStream> ReconnectingStream<S> {
    pub fn new(inner: S, config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay_ms;
        Self {
            inner,
            config,
            subscribed: Vec::new(),
            attempts: 0,
            current_delay_ms: initial_delay,
            connected: false,
            dead: false,
            pending: VecDeque::new(),
        }
    }

    fn reset_backoff(&mut self) {
        self.attempts = 0;
        self.current_delay_ms = self.config.initial_delay_ms;
    }

    /// Current delay with up to 20% jitter, advancing the backoff state.
    fn next_delay(&mut self) -> Duration {
        let base = Duration::from_millis(self.current_delay_ms);
        let delay = base + Duration::from_millis(jitter_ms(base));

        let next = (self.current_delay_ms as f64 * self.config.backoff_multiplier) as u64;
        self.current_delay_ms = next.min(self.config.max_delay_ms);
        delay
    }

    /// Queue invalidations for every tracked symbol; a disconnect makes the
    /// in-memory books untrustworthy.
    fn queue_invalidations(&mut self) {
        let venue = self.inner.venue();
        for symbol in &self.subscribed {
            self.pending.push_back(MarketEvent::BookInvalidate {
                venue,
                symbol: symbol.clone(),
            });
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        let delay = self.next_delay();
        self.attempts += 1;
        info!(
            venue = %self.inner.venue(),
            attempt = self.attempts,
            delay_ms = delay.as_millis(),
            "Reconnecting after delay"
        );
        sleep(delay).await;

        self.inner.connect().await?;
        if !self.subscribed.is_empty() {
            debug!(
                venue = %self.inner.venue(),
                symbols = self.subscribed.len(),
                "Resubscribing"
            );
            let symbols = self.subscribed.clone();
            self.inner.subscribe(&symbols).await?;
        }
        self.connected = true;
        self.reset_backoff();
        Ok(())
    }
}

/// Up to 20% of the base delay, derived from the clock's sub-second noise
/// to avoid synchronized reconnect storms.
fn jitter_ms(base: Duration) -> u64 {
    let range = (base.as_millis() as u64) / 5;
    if range == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % (range + 1)
}

#[async_trait]
impl<S: VenueStream + Send> VenueStream for ReconnectingStream<S> {
    async fn connect(&mut self) -> Result<()> {
        let result = self.inner.connect().await;
        if result.is_ok() {
            self.connected = true;
            self.dead = false;
            self.reset_backoff();
        }
        result
    }

    async fn subscribe(&mut self, symbols: &[Symbol]) -> Result<()> {
        self.subscribed = symbols.to_vec();
        self.inner.subscribe(symbols).await
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.dead {
                return None;
            }

            if !self.connected {
                if self.attempts >= self.config.max_attempts {
                    error!(
                        venue = %self.inner.venue(),
                        attempts = self.attempts,
                        "Reconnect budget exhausted, giving up"
                    );
                    self.dead = true;
                    return Some(MarketEvent::ConnectionLost {
                        venue: self.inner.venue(),
                    });
                }
                if let Err(e) = self.reconnect().await {
                    warn!(venue = %self.inner.venue(), error = %e, "Reconnect attempt failed");
                }
                continue;
            }

            match self.inner.next_event().await {
                Some(MarketEvent::Disconnected { venue, reason }) => {
                    warn!(venue = %venue, reason = %reason, "Stream disconnected");
                    self.connected = false;
                    self.queue_invalidations();
                }
                Some(event) => return Some(event),
                None => {
                    warn!(venue = %self.inner.venue(), "Stream ended unexpectedly");
                    self.connected = false;
                    self.queue_invalidations();
                }
            }
        }
    }

    fn venue(&self) -> crate::domain::Venue {
        self.inner.venue()
    }
}
