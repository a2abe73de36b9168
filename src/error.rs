use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed or unexpected venue message. Logged and dropped by the
    /// adapter; the connection is preserved.
    #[error("malformed {venue} frame: {detail}")]
    Wire { venue: &'static str, detail: String },

    /// Update-id gap or a crossed book that persisted past one update.
    #[error("order book inconsistency on {venue} {symbol}: {detail}")]
    BookInconsistency {
        venue: &'static str,
        symbol: String,
        detail: String,
    },

    #[error("unsupported venue: {0}")]
    UnsupportedVenue(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("order {order_id} not terminal within {timeout_ms} ms")]
    OrderTimeout { order_id: String, timeout_ms: u64 },

    #[error("insufficient {currency} on {venue}: need {required}, available {available}")]
    InsufficientBalance {
        venue: &'static str,
        currency: String,
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
