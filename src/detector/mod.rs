//! Opportunity detection: cross-venue dislocations and triangular cycles.

pub mod cross;
pub mod store;
pub mod triangular;

pub use cross::{CrossDetectorConfig, CrossVenueDetector};
pub use store::OpportunityStore;
pub use triangular::{TriPath, TriangularDetector, TriangularDetectorConfig};
