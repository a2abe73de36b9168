//! Shared market-state registries fed by adapters and read by detectors.

pub mod books;
pub mod prices;

pub use books::{ApplyOutcome, BookHealth, BookRegistry};
pub use prices::PriceRegistry;
