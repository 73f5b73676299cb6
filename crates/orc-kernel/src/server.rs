//! Runtime view of one enabled model's inference-server process.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of one supervised inference-server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    Stopped,
    Starting,
    Ready,
    Draining,
    Failed,
}

impl ServerState {
    /// A server is a valid router target iff it is `Ready` (spec §3 invariant).
    pub fn is_routable(self) -> bool {
        matches!(self, ServerState::Ready)
    }
}

/// Point-in-time snapshot returned by `Supervisor::status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub model_id: String,
    pub state: ServerState,
    pub port: u16,
    pub pid: Option<u32>,
    pub uptime_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub restart_count: u32,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SupervisorError {
    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("port {0} is busy (bound by another process)")]
    PortBusy(u16),

    #[error("readiness probe for {0} did not succeed within {1}ms")]
    ReadinessTimeout(String, u64),

    #[error("model {0} has failed too many times; operator intervention required")]
    Failed(String),

    #[error("io error launching process: {0}")]
    Io(#[from] std::io::Error),

    #[error("vram budget exceeded before model {0} could be started")]
    VramBudgetExceeded(String),
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
