//! Construction of venue stream adapters.

use std::time::Duration;

use crate::domain::Venue;
use crate::error::{Error, Result};
use crate::exchange::VenueStream;

use super::binance::{BinanceCodec, BinanceSnapshotFetcher};
use super::bybit::BybitCodec;
use super::coinbase::CoinbaseCodec;
use super::okx::OkxCodec;
use super::reconnect::{ReconnectConfig, ReconnectingStream};
use super::ws::WsAdapter;

/// Build the reconnecting stream adapter for a venue.
///
/// # Errors
///
/// [`Error::UnsupportedVenue`] when no stream adapter exists for the venue;
/// this surfaces at bootstrap, before anything connects.
pub fn build_stream(
    venue: Venue,
    ws_url: &str,
    rest_url: Option<&str>,
    reconnect: ReconnectConfig,
    throttle: Duration,
) -> Result<Box<dyn VenueStream>> {
    let url = ws_url.to_string();
    let stream: Box<dyn VenueStream> = match venue {
        Venue::Binance => {
            let rest = rest_url.ok_or_else(|| {
                Error::Config("binance requires a rest_url for depth snapshots".into())
            })?;
            Box::new(ReconnectingStream::new(
                WsAdapter::with_throttle(
                    BinanceCodec::new(),
                    url,
                    Some(BinanceSnapshotFetcher::shared(rest.to_string())),
                    throttle,
                ),
                reconnect,
            ))
        }
        Venue::Bybit => Box::new(ReconnectingStream::new(
            WsAdapter::with_throttle(BybitCodec::new(), url, None, throttle),
            reconnect,
        )),
        Venue::Coinbase => Box::new(ReconnectingStream::new(
            WsAdapter::with_throttle(CoinbaseCodec::new(), url, None, throttle),
            reconnect,
        )),
        Venue::Okx => Box::new(ReconnectingStream::new(
            WsAdapter::with_throttle(OkxCodec::new(), url, None, throttle),
            reconnect,
        )),
        Venue::Kraken => {
            return Err(Error::UnsupportedVenue(
                "kraken has no stream adapter".into(),
            ))
        }
    };
    Ok(stream)
}
