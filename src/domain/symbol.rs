//! Canonical trading pair symbols.
//!
//! Every symbol inside the engine is the canonical `BASE/QUOTE` form,
//! uppercase and slash-separated. Venue-specific spellings are translated at
//! the adapter boundary (see [`crate::exchange::symbols`]).

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;

/// A trading pair in canonical `BASE/QUOTE` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Symbol(String);

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Symbol::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl Symbol {
    /// Parse a symbol, normalizing case. Requires exactly one `/` with a
    /// non-empty base and quote.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.split_once('/') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() && !quote.contains('/') => {
                Ok(Self(upper))
            }
            _ => Err(Error::Config(format!("invalid symbol '{s}'"))),
        }
    }

    /// Construct from base and quote currency codes.
    pub fn from_parts(base: &str, quote: &str) -> Self {
        Self(format!(
            "{}/{}",
            base.to_ascii_uppercase(),
            quote.to_ascii_uppercase()
        ))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The base currency (`BTC` in `BTC/USDT`).
    #[must_use]
    pub fn base(&self) -> &str {
        self.0.split_once('/').map(|(b, _)| b).unwrap_or(&self.0)
    }

    /// The quote currency (`USDT` in `BTC/USDT`).
    #[must_use]
    pub fn quote(&self) -> &str {
        self.0.split_once('/').map(|(_, q)| q).unwrap_or("")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_case() {
        let s = Symbol::parse("btc/usdt").unwrap();
        assert_eq!(s.as_str(), "BTC/USDT");
        assert_eq!(s.base(), "BTC");
        assert_eq!(s.quote(), "USDT");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(Symbol::parse("BTCUSDT").is_err());
        assert!(Symbol::parse("/USDT").is_err());
        assert!(Symbol::parse("BTC/").is_err());
        assert!(Symbol::parse("BTC/USDT/ETH").is_err());
    }

    #[test]
    fn from_parts_uppercases() {
        assert_eq!(Symbol::from_parts("eth", "btc").as_str(), "ETH/BTC");
    }
}
