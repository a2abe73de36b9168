//! Symbol translation between canonical `BASE/QUOTE` and venue spellings.
//!
//! Translation must be bidirectional: outbound for subscription frames and
//! order placement, inbound for parsing stream messages. Venues without a
//! separator (binance, bybit) are parsed by longest-known-quote suffix
//! matching.

use crate::domain::{Symbol, Venue};

/// Quote currencies recognized when splitting separator-less pair codes,
/// longest first so `BTC/USDT` wins over `BTCUSD/T` nonsense splits.
const KNOWN_QUOTES: [&str; 9] = [
    "USDT", "USDC", "FDUSD", "TUSD", "USD", "EUR", "GBP", "BTC", "ETH",
];

/// Render a canonical symbol in the venue's native spelling.
#[must_use]
pub fn to_venue(venue: Venue, symbol: &Symbol) -> String {
    match venue {
        Venue::Binance | Venue::Bybit => format!("{}{}", symbol.base(), symbol.quote()),
        Venue::Coinbase | Venue::Okx => format!("{}-{}", symbol.base(), symbol.quote()),
        Venue::Kraken => format!("{}/{}", kraken_code(symbol.base()), symbol.quote()),
    }
}

/// Parse a venue-native pair code back into canonical form.
///
/// Returns `None` for codes that cannot be mapped (unknown quote suffix,
/// malformed separators); callers drop the message.
#[must_use]
pub fn from_venue(venue: Venue, raw: &str) -> Option<Symbol> {
    let raw = raw.trim().to_ascii_uppercase();
    match venue {
        Venue::Binance | Venue::Bybit => split_by_quote_suffix(&raw),
        Venue::Coinbase | Venue::Okx => {
            let (base, quote) = raw.split_once('-')?;
            if base.is_empty() || quote.is_empty() {
                return None;
            }
            Some(Symbol::from_parts(base, quote))
        }
        Venue::Kraken => {
            let (base, quote) = raw.split_once('/')?;
            if base.is_empty() || quote.is_empty() {
                return None;
            }
            Some(Symbol::from_parts(canonical_code(base), quote))
        }
    }
}

fn split_by_quote_suffix(raw: &str) -> Option<Symbol> {
    for quote in KNOWN_QUOTES {
        if let Some(base) = raw.strip_suffix(quote) {
            if !base.is_empty() {
                return Some(Symbol::from_parts(base, quote));
            }
        }
    }
    None
}

/// Kraken spells BTC as XBT.
fn kraken_code(base: &str) -> &str {
    if base == "BTC" {
        "XBT"
    } else {
        base
    }
}

fn canonical_code(base: &str) -> &str {
    if base == "XBT" {
        "BTC"
    } else {
        base
    }
}
