//! Per-query pipeline state machine types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The fixed stage order a pipeline progresses through. Skipping forward is
/// legal (e.g. CGRAG disabled); entering backwards is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Input,
    Complexity,
    Cgrag,
    Routing,
    Generation,
    Response,
}

impl StageName {
    /// Fixed order used to detect backwards transitions.
    pub const ORDER: [StageName; 6] = [
        StageName::Input,
        StageName::Complexity,
        StageName::Cgrag,
        StageName::Routing,
        StageName::Generation,
        StageName::Response,
    ];

    pub fn rank(self) -> usize {
        Self::ORDER.iter().position(|s| *s == self).expect("exhaustive")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub name: StageName,
    pub status: StageStatus,
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_ms: Option<u64>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// Per-query pipeline state. Stages are append-only; exactly one stage is
/// `Active` at a time while `overall_status == Processing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub query_id: String,
    pub stages: Vec<Stage>,
    pub current_stage: StageName,
    pub overall_status: OverallStatus,
    pub model_selected: Option<String>,
    pub tier: Option<crate::model::Tier>,
    pub cgrag_artifacts_count: Option<usize>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub error: Option<String>,
}

impl Pipeline {
    /// Whether this pipeline is old enough to be swept (spec §3: 1h if
    /// completed/failed, 15m if orphaned in `processing`).
    pub fn is_stale(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        let age = now - self.created_at;
        match self.overall_status {
            OverallStatus::Processing => age > chrono::Duration::minutes(15),
            _ => age > chrono::Duration::hours(1),
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    #[error("pipeline {0} not found")]
    NotFound(String),

    #[error("pipeline {0} already exists")]
    AlreadyExists(String),

    #[error("cannot enter stage {attempted:?} backwards from {current:?}")]
    BackwardsTransition {
        current: StageName,
        attempted: StageName,
    },

    #[error("pipeline {0} is not in processing state")]
    NotProcessing(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
