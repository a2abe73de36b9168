//! Test doubles and builders shared by unit and integration tests.

pub mod domain;
pub mod stream;
pub mod trading;

pub use stream::{channel_stream, ChannelStream, ChannelStreamHandle, ScriptedStream};
pub use trading::ScriptedTradingApi;
