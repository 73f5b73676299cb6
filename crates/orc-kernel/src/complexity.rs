//! Query complexity assessment output types.

use crate::model::Tier;
use serde::{Deserialize, Serialize};

/// One scored contribution to a complexity assessment, kept around purely
/// for testability/explainability (spec §4.E).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub name: String,
    pub contribution: f64,
}

/// The pure `assess(query) -> Complexity` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complexity {
    pub tier: Tier,
    pub score: f64,
    pub reasoning: String,
    pub indicators: Vec<Indicator>,
}
