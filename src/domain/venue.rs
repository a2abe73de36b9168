//! Venue identifiers and their static trading parameters.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A supported spot exchange.
///
/// The set is closed: adding a venue means adding a stream adapter and a
/// symbol translation, so an open-ended string type would only hide missing
/// integrations until runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Binance,
    Bybit,
    Coinbase,
    Kraken,
    Okx,
}

impl Venue {
    /// All venues known to the engine.
    pub const ALL: [Venue; 5] = [
        Venue::Binance,
        Venue::Bybit,
        Venue::Coinbase,
        Venue::Kraken,
        Venue::Okx,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::Bybit => "bybit",
            Venue::Coinbase => "coinbase",
            Venue::Kraken => "kraken",
            Venue::Okx => "okx",
        }
    }

    /// Static taker fee rate applied to aggressive orders on this venue.
    #[must_use]
    pub fn taker_fee(self) -> Decimal {
        match self {
            Venue::Coinbase => Decimal::new(50, 4), // 0.50%
            Venue::Kraken => Decimal::new(26, 4),   // 0.26%
            _ => Decimal::new(10, 4),               // 0.10%
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(Venue::Binance),
            "bybit" => Ok(Venue::Bybit),
            "coinbase" => Ok(Venue::Coinbase),
            "kraken" => Ok(Venue::Kraken),
            "okx" => Ok(Venue::Okx),
            other => Err(Error::UnsupportedVenue(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn taker_fee_rates() {
        assert_eq!(Venue::Binance.taker_fee(), dec!(0.0010));
        assert_eq!(Venue::Coinbase.taker_fee(), dec!(0.0050));
        assert_eq!(Venue::Kraken.taker_fee(), dec!(0.0026));
        assert_eq!(Venue::Bybit.taker_fee(), dec!(0.0010));
        assert_eq!(Venue::Okx.taker_fee(), dec!(0.0010));
    }

    #[test]
    fn parses_case_insensitive() {
        assert_eq!("Binance".parse::<Venue>().unwrap(), Venue::Binance);
        assert_eq!("OKX".parse::<Venue>().unwrap(), Venue::Okx);
    }

    #[test]
    fn unknown_venue_is_an_error() {
        assert!(matches!(
            "ftx".parse::<Venue>(),
            Err(Error::UnsupportedVenue(_))
        ));
    }
}
