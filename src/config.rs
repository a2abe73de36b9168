//! Configuration: TOML file base, environment overrides on top.
//!
//! The TOML file carries structure and defaults; the environment variables
//! enumerated in [`Config::apply_env`] override the operational knobs.
//! Credentials are environment-only and never read from the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::adapter::ReconnectConfig;
use crate::detector::{CrossDetectorConfig, TriPath, TriangularDetectorConfig};
use crate::domain::{OrderType, Symbol, Venue};
use crate::error::{Error, Result};
use crate::orchestrator::ExecutionConfig;
use crate::service::RiskConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub cross: CrossDetectorConfig,
    #[serde(default)]
    pub triangular: TriangularConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub balance: BalanceConfig,
    #[serde(default)]
    pub venues: HashMap<Venue, VenueConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

impl LoggingConfig {
    pub fn init(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<Symbol>,
    #[serde(default = "default_venues")]
    pub venues: Vec<Venue>,
    /// Minimum interval between per-symbol adapter emissions.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
}

fn default_symbols() -> Vec<Symbol> {
    ["BTC/USDT", "ETH/USDT", "ETH/BTC"]
        .iter()
        .map(|s| Symbol::parse(s).expect("static symbol"))
        .collect()
}

fn default_venues() -> Vec<Venue> {
    vec![Venue::Binance, Venue::Bybit, Venue::Coinbase, Venue::Okx]
}

fn default_throttle_ms() -> u64 {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            venues: default_venues(),
            throttle_ms: default_throttle_ms(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Paper-trade against local replicas instead of live venue APIs.
    #[serde(default = "default_test_mode")]
    pub test_mode: bool,
    /// Bounded grace for in-flight trades during shutdown drain.
    #[serde(default = "default_drain_grace_secs")]
    pub drain_grace_secs: u64,
    #[serde(flatten)]
    pub execution: ExecutionConfig,
}

fn default_test_mode() -> bool {
    true
}
fn default_drain_grace_secs() -> u64 {
    30
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            test_mode: default_test_mode(),
            drain_grace_secs: default_drain_grace_secs(),
            execution: ExecutionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriangularConfig {
    #[serde(flatten)]
    pub detector: TriangularDetectorConfig,
    #[serde(default)]
    pub paths: Vec<TriPath>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JournalConfig {
    #[serde(default = "default_journal_dir")]
    pub dir: PathBuf,
}

fn default_journal_dir() -> PathBuf {
    PathBuf::from("logs/trades")
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            dir: default_journal_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceConfig {
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
    /// Paper-mode seed balances.
    #[serde(default)]
    pub paper: Vec<PaperBalance>,
}

fn default_refresh_secs() -> u64 {
    30
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            refresh_secs: default_refresh_secs(),
            paper: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperBalance {
    pub venue: Venue,
    pub currency: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub ws_url: String,
    #[serde(default)]
    pub rest_url: Option<String>,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Loaded from `{VENUE}_API_KEY` etc.; never from the file.
    #[serde(skip)]
    pub credentials: VenueCredentials,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default)]
pub struct VenueCredentials {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub passphrase: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            engine: EngineConfig::default(),
            trading: TradingConfig::default(),
            cross: CrossDetectorConfig::default(),
            triangular: TriangularConfig::default(),
            risk: RiskConfig::default(),
            journal: JournalConfig::default(),
            balance: BalanceConfig::default(),
            venues: default_venue_endpoints(),
        }
    }
}

/// Public endpoints; trading credentials come from the environment.
fn default_venue_endpoints() -> HashMap<Venue, VenueConfig> {
    let mut venues = HashMap::new();
    venues.insert(
        Venue::Binance,
        VenueConfig {
            enabled: true,
            ws_url: "wss://stream.binance.com:9443/ws".into(),
            rest_url: Some("https://api.binance.com".into()),
            reconnect: ReconnectConfig::default(),
            credentials: VenueCredentials::default(),
        },
    );
    venues.insert(
        Venue::Bybit,
        VenueConfig {
            enabled: true,
            ws_url: "wss://stream.bybit.com/v5/public/spot".into(),
            rest_url: None,
            reconnect: ReconnectConfig::default(),
            credentials: VenueCredentials::default(),
        },
    );
    venues.insert(
        Venue::Coinbase,
        VenueConfig {
            enabled: true,
            ws_url: "wss://ws-feed.exchange.coinbase.com".into(),
            rest_url: None,
            reconnect: ReconnectConfig {
                max_attempts: 2,
                ..ReconnectConfig::default()
            },
            credentials: VenueCredentials::default(),
        },
    );
    venues.insert(
        Venue::Okx,
        VenueConfig {
            enabled: true,
            ws_url: "wss://ws.okx.com:8443/ws/v5/public".into(),
            rest_url: None,
            reconnect: ReconnectConfig::default(),
            credentials: VenueCredentials::default(),
        },
    );
    venues
}

impl Config {
    /// Load the TOML file, apply environment overrides, validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read config file: {e}")))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;

        if config.venues.is_empty() {
            config.venues = default_venue_endpoints();
        }
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Environment overrides for the operational knobs.
    pub fn apply_env(&mut self) {
        env_bool("TRADING_ENABLED", &mut self.risk.trading_enabled);
        env_bool("CROSS_TRADING_ENABLED", &mut self.risk.cross.enabled);
        env_bool(
            "TRIANGULAR_TRADING_ENABLED",
            &mut self.risk.triangular.enabled,
        );

        if let Some(v) = env_parse::<Decimal>("CROSS_MIN_PROFIT") {
            self.risk.cross.min_profit_percent = v;
            self.cross.min_profit_percent = v;
        }
        if let Some(v) = env_parse::<Decimal>("CROSS_MAX_POSITION_SIZE") {
            self.risk.cross.max_position_size = v;
        }
        if let Some(v) = env_parse::<u32>("CROSS_MAX_CONCURRENT") {
            self.risk.cross.max_concurrent = v;
        }
        if let Some(v) = env_parse::<Decimal>("TRIANGULAR_MIN_PROFIT") {
            self.risk.triangular.min_profit_percent = v;
            self.triangular.detector.min_profit_percent = v;
        }
        if let Some(v) = env_parse::<Decimal>("TRIANGULAR_MAX_POSITION_SIZE") {
            self.risk.triangular.max_position_size = v;
        }
        if let Some(v) = env_parse::<u32>("TRIANGULAR_MAX_CONCURRENT") {
            self.risk.triangular.max_concurrent = v;
        }
        if let Some(v) = env_parse::<Decimal>("MAX_DAILY_LOSS") {
            self.risk.max_daily_loss = v;
        }
        if let Some(v) = env_parse::<u32>("MAX_DAILY_TRADES") {
            self.risk.max_daily_trades = v;
        }
        if let Ok(raw) = std::env::var("BLACKLISTED_SYMBOLS") {
            self.risk.blacklisted_symbols = raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .filter_map(|s| Symbol::parse(s).ok())
                .collect();
        }
        if let Ok(raw) = std::env::var("BLACKLISTED_EXCHANGES") {
            self.risk.blacklisted_venues = raw
                .split(',')
                .filter_map(|s| Venue::from_str(s.trim()).ok())
                .collect();
        }

        if let Ok(raw) = std::env::var("ORDER_TYPE") {
            match raw.to_ascii_lowercase().as_str() {
                "market" => self.trading.execution.order_type = OrderType::Market,
                "limit" => self.trading.execution.order_type = OrderType::Limit,
                _ => {}
            }
        }
        if let Some(v) = env_parse::<u64>("ORDER_TIMEOUT_MS") {
            self.trading.execution.order_timeout_ms = v;
        }
        if let Some(v) = env_parse::<u32>("ORDER_RETRY_ATTEMPTS") {
            self.trading.execution.order_retry_attempts = v;
        }
        if let Some(v) = env_parse::<Decimal>("SLIPPAGE_TOLERANCE") {
            self.cross.max_slippage_percent = v;
            self.triangular.detector.max_slippage_total = v;
        }
        env_bool("TEST_MODE", &mut self.trading.test_mode);

        for (venue, venue_config) in self.venues.iter_mut() {
            let prefix = venue.as_str().to_ascii_uppercase();
            venue_config.credentials = VenueCredentials {
                api_key: std::env::var(format!("{prefix}_API_KEY")).ok(),
                api_secret: std::env::var(format!("{prefix}_API_SECRET")).ok(),
                passphrase: std::env::var(format!("{prefix}_API_PASSPHRASE")).ok(),
            };
        }
    }

    fn validate(&self) -> Result<()> {
        if self.engine.symbols.is_empty() {
            return Err(Error::Config("engine.symbols cannot be empty".into()));
        }
        if self.engine.venues.is_empty() {
            return Err(Error::Config("engine.venues cannot be empty".into()));
        }
        for venue in &self.engine.venues {
            let Some(venue_config) = self.venues.get(venue) else {
                return Err(Error::Config(format!("no endpoint config for {venue}")));
            };
            if venue_config.enabled && venue_config.ws_url.is_empty() {
                return Err(Error::Config(format!("{venue} ws_url cannot be empty")));
            }
        }
        for path in &self.triangular.paths {
            if path.symbols.len() != 3 || path.directions.len() != 3 {
                return Err(Error::Config(
                    "triangular paths need exactly three legs".into(),
                ));
            }
        }
        if self.trading.execution.order_timeout_ms == 0 {
            return Err(Error::Config("order_timeout_ms must be positive".into()));
        }
        if self.balance.refresh_secs == 0 {
            return Err(Error::Config("balance.refresh_secs must be positive".into()));
        }
        Ok(())
    }

    /// Venues that are both requested and enabled.
    #[must_use]
    pub fn active_venues(&self) -> Vec<Venue> {
        self.engine
            .venues
            .iter()
            .copied()
            .filter(|v| self.venues.get(v).map(|c| c.enabled).unwrap_or(false))
            .collect()
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

fn env_bool(key: &str, target: &mut bool) {
    if let Ok(raw) = std::env::var(key) {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *target = true,
            "0" | "false" | "no" | "off" => *target = false,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.active_venues().len(), 4);
    }

    #[test]
    fn parses_minimal_toml() {
        let raw = r#"
            [engine]
            symbols = ["BTC/USDT"]
            venues = ["binance"]

            [venues.binance]
            ws_url = "wss://stream.binance.com:9443/ws"
            rest_url = "https://api.binance.com"

            [[triangular.paths]]
            venue = "binance"
            start_currency = "USDT"
            symbols = ["BTC/USDT", "ETH/BTC", "ETH/USDT"]
            directions = ["buy", "buy", "sell"]
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.triangular.paths.len(), 1);
        assert_eq!(config.engine.symbols[0].as_str(), "BTC/USDT");
    }

    #[test]
    fn rejects_two_leg_path() {
        let raw = r#"
            [[triangular.paths]]
            venue = "binance"
            start_currency = "USDT"
            symbols = ["BTC/USDT", "ETH/BTC"]
            directions = ["buy", "buy"]
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        let mut config = config;
        config.venues = super::default_venue_endpoints();
        assert!(config.validate().is_err());
    }
}
