//! Risk gate for trade approval.
//!
//! The risk manager is the single authority on whether a candidate trade
//! may proceed. All checks run and all failure reasons are collected, so a
//! rejection explains itself fully in the journal.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::{OpportunityKind, Symbol, Venue};

use super::balance::BalanceLedger;

/// Per-kind trading limits.
#[derive(Debug, Clone, Deserialize)]
pub struct KindLimits {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_profit_percent")]
    pub min_profit_percent: Decimal,
    /// Cap on quote-currency value per trade.
    #[serde(default = "default_max_position_size")]
    pub max_position_size: Decimal,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
}

fn default_true() -> bool {
    true
}
fn default_min_profit_percent() -> Decimal {
    Decimal::new(5, 1)
}
fn default_max_position_size() -> Decimal {
    Decimal::from(1000)
}
fn default_max_concurrent() -> u32 {
    2
}

impl Default for KindLimits {
    fn default() -> Self {
        Self {
            enabled: true,
            min_profit_percent: default_min_profit_percent(),
            max_position_size: default_max_position_size(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_true")]
    pub trading_enabled: bool,
    #[serde(default)]
    pub cross: KindLimits,
    #[serde(default)]
    pub triangular: KindLimits,
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: u32,
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: Decimal,
    #[serde(default)]
    pub blacklisted_symbols: Vec<Symbol>,
    #[serde(default)]
    pub blacklisted_venues: Vec<Venue>,
}

fn default_max_daily_trades() -> u32 {
    50
}
fn default_max_daily_loss() -> Decimal {
    Decimal::from(100)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            trading_enabled: true,
            cross: KindLimits::default(),
            triangular: KindLimits::default(),
            max_daily_trades: default_max_daily_trades(),
            max_daily_loss: default_max_daily_loss(),
            blacklisted_symbols: Vec::new(),
            blacklisted_venues: Vec::new(),
        }
    }
}

/// A funds requirement to verify against the balance ledger.
#[derive(Debug, Clone)]
pub struct FundsRequirement {
    pub venue: Venue,
    pub currency: String,
    pub amount: Decimal,
}

/// Normalized view of an opportunity for risk evaluation.
#[derive(Debug, Clone)]
pub struct RiskCandidate {
    pub kind: OpportunityKind,
    pub venues: Vec<Venue>,
    pub symbols: Vec<Symbol>,
    pub profit_percent: Decimal,
    /// Quote-currency value this trade would commit.
    pub position_value: Decimal,
    pub required_funds: Vec<FundsRequirement>,
}

/// Outcome of a risk evaluation. A rejection is not an error.
#[derive(Debug, Clone)]
pub struct Approval {
    pub approved: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug)]
struct DailyLedger {
    daily_trades: u32,
    daily_loss: Decimal,
    active: HashMap<OpportunityKind, u32>,
    last_reset: NaiveDate,
    emergency_stop: bool,
    /// The stop event is surfaced once, not on every rejection after it.
    stop_announced: bool,
}

impl DailyLedger {
    fn new(today: NaiveDate) -> Self {
        Self {
            daily_trades: 0,
            daily_loss: Decimal::ZERO,
            active: HashMap::new(),
            last_reset: today,
            emergency_stop: false,
            stop_announced: false,
        }
    }

    /// Counters reset atomically on UTC date change; the emergency stop is
    /// sticky across days until the operator clears it.
    fn maybe_reset(&mut self, today: NaiveDate) {
        if today != self.last_reset {
            info!(date = %today, "Daily risk counters reset");
            self.daily_trades = 0;
            self.daily_loss = Decimal::ZERO;
            self.last_reset = today;
        }
    }

    fn trip_emergency_stop(&mut self, daily_loss: Decimal) {
        self.emergency_stop = true;
        if !self.stop_announced {
            warn!(daily_loss = %daily_loss, "Daily loss cap breached, emergency stop engaged");
            self.stop_announced = true;
        }
    }
}

pub struct RiskManager {
    config: RwLock<RiskConfig>,
    balances: Arc<BalanceLedger>,
    ledger: Mutex<DailyLedger>,
}

impl RiskManager {
    pub fn new(config: RiskConfig, balances: Arc<BalanceLedger>) -> Self {
        Self {
            config: RwLock::new(config),
            balances,
            ledger: Mutex::new(DailyLedger::new(Utc::now().date_naive())),
        }
    }

    /// Evaluate a candidate against every gate, collecting all reasons.
    pub fn evaluate(&self, candidate: &RiskCandidate) -> Approval {
        self.evaluate_at(candidate, Utc::now().date_naive())
    }

    pub fn evaluate_at(&self, candidate: &RiskCandidate, today: NaiveDate) -> Approval {
        let config = self.config.read();
        let mut ledger = self.ledger.lock();
        ledger.maybe_reset(today);

        let mut reasons = Vec::new();

        if !config.trading_enabled {
            reasons.push("trading disabled".to_string());
        }
        let limits = match candidate.kind {
            OpportunityKind::CrossExchange => &config.cross,
            OpportunityKind::Triangular => &config.triangular,
        };
        if !limits.enabled {
            reasons.push(format!("{} trading disabled", candidate.kind.as_str()));
        }

        if ledger.daily_loss >= config.max_daily_loss && !ledger.emergency_stop {
            let loss = ledger.daily_loss;
            ledger.trip_emergency_stop(loss);
        }
        if ledger.emergency_stop {
            reasons.push("emergency stop active".to_string());
        }

        for symbol in &candidate.symbols {
            if config.blacklisted_symbols.contains(symbol) {
                reasons.push(format!("symbol {symbol} blacklisted"));
            }
        }
        for venue in &candidate.venues {
            if config.blacklisted_venues.contains(venue) {
                reasons.push(format!("venue {venue} blacklisted"));
            }
        }

        if candidate.profit_percent < limits.min_profit_percent {
            reasons.push(format!(
                "profit {}% below minimum {}%",
                candidate.profit_percent, limits.min_profit_percent
            ));
        }

        for req in &candidate.required_funds {
            if !self
                .balances
                .has_available(req.venue, &req.currency, req.amount)
            {
                reasons.push(format!(
                    "insufficient {} on {} (need {})",
                    req.currency, req.venue, req.amount
                ));
            }
        }

        if candidate.position_value > limits.max_position_size {
            reasons.push(format!(
                "position {} exceeds cap {}",
                candidate.position_value, limits.max_position_size
            ));
        }

        let active = ledger.active.get(&candidate.kind).copied().unwrap_or(0);
        if active >= limits.max_concurrent {
            reasons.push(format!(
                "{} active trades at cap {}",
                candidate.kind.as_str(),
                limits.max_concurrent
            ));
        }

        if ledger.daily_trades >= config.max_daily_trades {
            reasons.push(format!(
                "daily trade count at cap {}",
                config.max_daily_trades
            ));
        }

        Approval {
            approved: reasons.is_empty(),
            reasons,
        }
    }

    /// Record a realized trade outcome. Losses accumulate toward the daily
    /// cap; hitting it engages the emergency stop.
    pub fn record(&self, profit: Decimal) {
        self.record_at(profit, Utc::now().date_naive());
    }

    pub fn record_at(&self, profit: Decimal, today: NaiveDate) {
        let max_daily_loss = self.config.read().max_daily_loss;
        let mut ledger = self.ledger.lock();
        ledger.maybe_reset(today);
        ledger.daily_trades += 1;
        if profit < Decimal::ZERO {
            ledger.daily_loss += -profit;
            if ledger.daily_loss >= max_daily_loss {
                let loss = ledger.daily_loss;
                ledger.trip_emergency_stop(loss);
            }
        }
    }

    pub fn begin_trade(&self, kind: OpportunityKind) {
        *self.ledger.lock().active.entry(kind).or_insert(0) += 1;
    }

    pub fn end_trade(&self, kind: OpportunityKind) {
        let mut ledger = self.ledger.lock();
        if let Some(count) = ledger.active.get_mut(&kind) {
            *count = count.saturating_sub(1);
        }
    }

    #[must_use]
    pub fn active_trades(&self, kind: OpportunityKind) -> u32 {
        self.ledger.lock().active.get(&kind).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn is_emergency_stopped(&self) -> bool {
        self.ledger.lock().emergency_stop
    }

    /// Operator action: clear the sticky emergency stop.
    pub fn reset_emergency_stop(&self) {
        let mut ledger = self.ledger.lock();
        ledger.emergency_stop = false;
        ledger.stop_announced = false;
        info!("Emergency stop cleared by operator");
    }

    pub fn set_trading_enabled(&self, enabled: bool) {
        self.config.write().trading_enabled = enabled;
        info!(enabled, "Global trading flag changed");
    }

    pub fn set_kind_enabled(&self, kind: OpportunityKind, enabled: bool) {
        let mut config = self.config.write();
        match kind {
            OpportunityKind::CrossExchange => config.cross.enabled = enabled,
            OpportunityKind::Triangular => config.triangular.enabled = enabled,
        }
        info!(kind = kind.as_str(), enabled, "Per-kind trading flag changed");
    }

    #[must_use]
    pub fn daily_trades(&self) -> u32 {
        self.ledger.lock().daily_trades
    }

    #[must_use]
    pub fn daily_loss(&self) -> Decimal {
        self.ledger.lock().daily_loss
    }
}
