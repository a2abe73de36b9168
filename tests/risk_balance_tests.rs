//! Risk gate and balance ledger: daily limits, emergency stop, soft locks.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use arbhawk::domain::{OpportunityKind, Symbol, Venue};
use arbhawk::service::{
    BalanceLedger, FundsRequirement, RiskCandidate, RiskConfig, RiskManager,
};
use arbhawk::testkit::ScriptedTradingApi;

fn ledger_with_usdt(free: rust_decimal::Decimal) -> Arc<BalanceLedger> {
    let ledger = Arc::new(BalanceLedger::new(Arc::new(ScriptedTradingApi::new())));
    ledger.set_balance(Venue::Binance, "USDT", free);
    ledger
}

fn candidate() -> RiskCandidate {
    RiskCandidate {
        kind: OpportunityKind::CrossExchange,
        venues: vec![Venue::Binance, Venue::Bybit],
        symbols: vec![Symbol::parse("BTC/USDT").unwrap()],
        profit_percent: dec!(1.0),
        position_value: dec!(500),
        required_funds: vec![FundsRequirement {
            venue: Venue::Binance,
            currency: "USDT".into(),
            amount: dec!(500),
        }],
    }
}

fn day(n: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, n).unwrap()
}

#[test]
fn clean_candidate_is_approved() {
    let risk = RiskManager::new(RiskConfig::default(), ledger_with_usdt(dec!(10000)));
    let approval = risk.evaluate(&candidate());
    assert!(approval.approved, "reasons: {:?}", approval.reasons);
}

/// Losses crossing the daily cap engage the emergency stop; later
/// evaluations are rejected until the operator clears it.
#[test]
fn daily_loss_cap_engages_emergency_stop() {
    let config = RiskConfig {
        max_daily_loss: dec!(50),
        ..RiskConfig::default()
    };
    let risk = RiskManager::new(config, ledger_with_usdt(dec!(10000)));

    risk.record_at(dec!(-30), day(1));
    assert!(!risk.is_emergency_stopped());

    risk.record_at(dec!(-22), day(1));
    assert!(risk.is_emergency_stopped());

    let approval = risk.evaluate_at(&candidate(), day(1));
    assert!(!approval.approved);
    assert!(approval
        .reasons
        .iter()
        .any(|r| r.contains("emergency stop active")));

    // Sticky across the day boundary until the operator clears it.
    let approval = risk.evaluate_at(&candidate(), day(2));
    assert!(!approval.approved);

    risk.reset_emergency_stop();
    let approval = risk.evaluate_at(&candidate(), day(2));
    assert!(approval.approved, "reasons: {:?}", approval.reasons);
}

#[test]
fn counters_reset_once_per_utc_day() {
    let risk = RiskManager::new(RiskConfig::default(), ledger_with_usdt(dec!(10000)));

    risk.record_at(dec!(-10), day(1));
    risk.record_at(dec!(2), day(1));
    assert_eq!(risk.daily_trades(), 2);
    assert_eq!(risk.daily_loss(), dec!(10));

    // First touch on the next day resets both counters.
    risk.record_at(dec!(1), day(2));
    assert_eq!(risk.daily_trades(), 1);
    assert_eq!(risk.daily_loss(), dec!(0));
}

#[test]
fn all_rejection_reasons_are_collected() {
    let config = RiskConfig {
        trading_enabled: false,
        blacklisted_venues: vec![Venue::Bybit],
        ..RiskConfig::default()
    };
    let risk = RiskManager::new(config, ledger_with_usdt(dec!(0)));

    let mut cand = candidate();
    cand.profit_percent = dec!(0.1); // below the 0.5 default
    let approval = risk.evaluate(&cand);

    assert!(!approval.approved);
    assert!(approval.reasons.len() >= 4, "got: {:?}", approval.reasons);
    assert!(approval.reasons.iter().any(|r| r.contains("trading disabled")));
    assert!(approval.reasons.iter().any(|r| r.contains("blacklisted")));
    assert!(approval.reasons.iter().any(|r| r.contains("below minimum")));
    assert!(approval.reasons.iter().any(|r| r.contains("insufficient")));
}

#[test]
fn concurrency_cap_blocks_new_trades() {
    let risk = RiskManager::new(RiskConfig::default(), ledger_with_usdt(dec!(10000)));

    risk.begin_trade(OpportunityKind::CrossExchange);
    risk.begin_trade(OpportunityKind::CrossExchange);
    let approval = risk.evaluate(&candidate());
    assert!(!approval.approved);
    assert!(approval.reasons.iter().any(|r| r.contains("at cap")));

    // Ending a trade frees a slot; the triangular counter is unaffected.
    risk.end_trade(OpportunityKind::CrossExchange);
    assert!(risk.evaluate(&candidate()).approved);
    assert_eq!(risk.active_trades(OpportunityKind::Triangular), 0);
}

#[test]
fn kind_toggle_rejects_only_that_kind() {
    let risk = RiskManager::new(RiskConfig::default(), ledger_with_usdt(dec!(10000)));
    risk.set_kind_enabled(OpportunityKind::CrossExchange, false);

    let approval = risk.evaluate(&candidate());
    assert!(!approval.approved);

    let mut tri = candidate();
    tri.kind = OpportunityKind::Triangular;
    assert!(risk.evaluate(&tri).approved);
}

#[test]
fn locks_never_exceed_free_balance() {
    let ledger = ledger_with_usdt(dec!(1000));

    ledger.lock("t1", Venue::Binance, "USDT", dec!(700)).unwrap();
    assert!(ledger.lock("t2", Venue::Binance, "USDT", dec!(400)).is_err());
    ledger.lock("t2", Venue::Binance, "USDT", dec!(300)).unwrap();

    // free >= sum of active locks holds throughout.
    assert_eq!(ledger.available(Venue::Binance, "USDT"), dec!(0));

    ledger.release_all("t1");
    ledger.release_all("t2");
    assert_eq!(ledger.available(Venue::Binance, "USDT"), dec!(1000));
    assert_eq!(ledger.active_locks(), 0);
}
