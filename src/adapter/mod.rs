//! Venue stream adapters and the paper trading API.
//!
//! Each venue gets a [`codec::VenueCodec`] holding its protocol rules; the
//! generic [`ws::WsAdapter`] drives the socket, and
//! [`reconnect::ReconnectingStream`] adds the backoff policy on top.

pub mod binance;
pub mod bybit;
pub mod codec;
pub mod coinbase;
pub mod factory;
pub mod okx;
pub mod paper;
pub mod reconnect;
pub mod throttle;
pub mod ws;

pub use codec::{DepthSnapshot, Emit, SnapshotFetcher, VenueCodec};
pub use factory::build_stream;
pub use paper::PaperTradingApi;
pub use reconnect::{ReconnectConfig, ReconnectingStream};
pub use throttle::EmitGate;
pub use ws::WsAdapter;
