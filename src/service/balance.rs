//! Balance ledger with process-local soft locks.
//!
//! Balances are refreshed from the trading API on a 30 s cadence and on
//! demand after each trade. Locks reserve funds for in-flight trades inside
//! this process only; the venue's order engine remains the authority at
//! execution time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::domain::{Balance, FundsLock, Venue};
use crate::error::{Error, Result};
use crate::exchange::TradingApi;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Default)]
struct LedgerInner {
    balances: HashMap<(Venue, String), Balance>,
    locks: Vec<FundsLock>,
}

impl LedgerInner {
    fn locked(&self, venue: Venue, currency: &str) -> Decimal {
        self.locks
            .iter()
            .filter(|l| l.venue == venue && l.currency == currency)
            .map(|l| l.amount)
            .sum()
    }

    fn available(&self, venue: Venue, currency: &str) -> Decimal {
        let free = self
            .balances
            .get(&(venue, currency.to_string()))
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO);
        free - self.locked(venue, currency)
    }
}

pub struct BalanceLedger {
    api: Arc<dyn TradingApi>,
    inner: Mutex<LedgerInner>,
}

impl BalanceLedger {
    pub fn new(api: Arc<dyn TradingApi>) -> Self {
        Self {
            api,
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    /// Pull fresh balances for one venue from the trading API.
    pub async fn refresh(&self, venue: Venue) -> Result<()> {
        let balances = self.api.fetch_balances(venue).await?;
        let mut inner = self.inner.lock();
        for balance in balances {
            inner
                .balances
                .insert((balance.venue, balance.currency.clone()), balance);
        }
        Ok(())
    }

    pub async fn refresh_all(&self, venues: &[Venue]) {
        for &venue in venues {
            if let Err(e) = self.refresh(venue).await {
                warn!(venue = %venue, error = %e, "Balance refresh failed");
            }
        }
    }

    /// Free funds minus active locks for this (venue, currency).
    #[must_use]
    pub fn available(&self, venue: Venue, currency: &str) -> Decimal {
        self.inner.lock().available(venue, currency)
    }

    #[must_use]
    pub fn has_available(&self, venue: Venue, currency: &str, amount: Decimal) -> bool {
        self.available(venue, currency) >= amount
    }

    /// Reserve funds for a trade. Fails without side effects when the
    /// available amount is short.
    pub fn lock(
        &self,
        trade_id: &str,
        venue: Venue,
        currency: &str,
        amount: Decimal,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let available = inner.available(venue, currency);
        if available < amount {
            return Err(Error::InsufficientBalance {
                venue: venue.as_str(),
                currency: currency.to_string(),
                required: amount,
                available,
            });
        }
        inner.locks.push(FundsLock {
            trade_id: trade_id.to_string(),
            venue,
            currency: currency.to_string(),
            amount,
        });
        debug!(trade_id, venue = %venue, currency, %amount, "Funds locked");
        Ok(())
    }

    /// Release one lock. Unlocking a key that holds no lock is a no-op.
    pub fn unlock(&self, trade_id: &str, venue: Venue, currency: &str) {
        let mut inner = self.inner.lock();
        inner
            .locks
            .retain(|l| !(l.trade_id == trade_id && l.venue == venue && l.currency == currency));
    }

    /// Release every lock held by a trade, across venues and currencies.
    pub fn release_all(&self, trade_id: &str) {
        self.inner.lock().locks.retain(|l| l.trade_id != trade_id);
    }

    #[must_use]
    pub fn active_locks(&self) -> usize {
        self.inner.lock().locks.len()
    }

    /// Directly seed a balance; used by the paper trading path and tests.
    pub fn set_balance(&self, venue: Venue, currency: &str, free: Decimal) {
        let mut inner = self.inner.lock();
        inner.balances.insert(
            (venue, currency.to_string()),
            Balance {
                venue,
                currency: currency.to_string(),
                free,
                used: Decimal::ZERO,
                total: free,
                last_update_ms: Utc::now().timestamp_millis(),
            },
        );
    }

    /// Periodic refresh loop; exits when the shutdown signal flips.
    pub async fn run_refresher(
        self: Arc<Self>,
        venues: Vec<Venue>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh_all(&venues).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::trading::ScriptedTradingApi;
    use rust_decimal_macros::dec;

    fn ledger_with(free: Decimal) -> BalanceLedger {
        let ledger = BalanceLedger::new(Arc::new(ScriptedTradingApi::new()));
        ledger.set_balance(Venue::Binance, "USDT", free);
        ledger
    }

    #[test]
    fn lock_reduces_available() {
        let ledger = ledger_with(dec!(1000));
        ledger.lock("t1", Venue::Binance, "USDT", dec!(600)).unwrap();
        assert_eq!(ledger.available(Venue::Binance, "USDT"), dec!(400));
    }

    #[test]
    fn lock_fails_when_short() {
        let ledger = ledger_with(dec!(100));
        let err = ledger
            .lock("t1", Venue::Binance, "USDT", dec!(150))
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert_eq!(ledger.active_locks(), 0);
    }

    #[test]
    fn unlock_restores_pre_lock_available() {
        let ledger = ledger_with(dec!(1000));
        let before = ledger.available(Venue::Binance, "USDT");
        ledger.lock("t1", Venue::Binance, "USDT", dec!(250)).unwrap();
        ledger.unlock("t1", Venue::Binance, "USDT");
        assert_eq!(ledger.available(Venue::Binance, "USDT"), before);
    }

    #[test]
    fn unlock_is_idempotent() {
        let ledger = ledger_with(dec!(1000));
        ledger.lock("t1", Venue::Binance, "USDT", dec!(250)).unwrap();
        ledger.unlock("t1", Venue::Binance, "USDT");
        ledger.unlock("t1", Venue::Binance, "USDT");
        assert_eq!(ledger.available(Venue::Binance, "USDT"), dec!(1000));
    }

    #[test]
    fn locks_stack_per_key() {
        let ledger = ledger_with(dec!(1000));
        ledger.lock("t1", Venue::Binance, "USDT", dec!(400)).unwrap();
        ledger.lock("t2", Venue::Binance, "USDT", dec!(400)).unwrap();
        assert!(ledger
            .lock("t3", Venue::Binance, "USDT", dec!(400))
            .is_err());
        ledger.release_all("t1");
        assert!(ledger
            .lock("t3", Venue::Binance, "USDT", dec!(400))
            .is_ok());
    }
}
