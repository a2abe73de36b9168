//! Cross-cutting services: risk gating, balance accounting, journaling.

pub mod balance;
pub mod journal;
pub mod risk;

pub use balance::BalanceLedger;
pub use journal::{JournalLine, TransactionJournal};
pub use risk::{Approval, FundsRequirement, KindLimits, RiskCandidate, RiskConfig, RiskManager};
