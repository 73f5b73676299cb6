//! Query complexity assessment and tier-aware round-robin model routing.

pub mod complexity;
pub mod router;

pub use complexity::{assess, forced};
pub use router::{InFlightGuard, RoutableModel, Router, RouterError, RouterResult};
