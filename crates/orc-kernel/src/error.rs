//! Top-level error aggregator composing every crate's error enum, mirroring
//! the workspace's kernel-error pattern: one `#[from]` arm per subsystem,
//! plus a `status_hint()` used by whatever transport sits in front of this.

use crate::cgrag::CgragError;
use crate::model::RegistryError;
use crate::pipeline::PipelineError;
use crate::server::SupervisorError;
use thiserror::Error;

/// Status-hint codes a transport layer would map onto its own wire format
/// (spec §6: 503 no model available, 504 deadline exceeded, 400 invalid
/// request, 500 internal, 412 precondition failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusHint {
    BadRequest,
    PreconditionFailed,
    ServiceUnavailable,
    GatewayTimeout,
    Internal,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OrchestratorError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no model available for the requested tier")]
    NoModelAvailable,

    #[error("deadline exceeded before a response could be produced")]
    Deadline,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Cgrag(#[from] CgragError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("inference request failed: {0}")]
    Inference(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn status_hint(&self) -> StatusHint {
        match self {
            OrchestratorError::InvalidRequest(_) => StatusHint::BadRequest,
            OrchestratorError::NoModelAvailable => StatusHint::ServiceUnavailable,
            OrchestratorError::Deadline => StatusHint::GatewayTimeout,
            OrchestratorError::Cgrag(CgragError::IndexMissing) => StatusHint::PreconditionFailed,
            OrchestratorError::Registry(RegistryError::UnknownModel(_)) => StatusHint::BadRequest,
            OrchestratorError::Supervisor(SupervisorError::UnknownModel(_)) => {
                StatusHint::BadRequest
            }
            OrchestratorError::Supervisor(SupervisorError::ReadinessTimeout(..)) => {
                StatusHint::GatewayTimeout
            }
            OrchestratorError::Pipeline(PipelineError::NotFound(_)) => StatusHint::BadRequest,
            _ => StatusHint::Internal,
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_model_available_maps_to_service_unavailable() {
        assert_eq!(
            OrchestratorError::NoModelAvailable.status_hint(),
            StatusHint::ServiceUnavailable
        );
    }

    #[test]
    fn deadline_maps_to_gateway_timeout() {
        assert_eq!(
            OrchestratorError::Deadline.status_hint(),
            StatusHint::GatewayTimeout
        );
    }

    #[test]
    fn index_missing_maps_to_precondition_failed() {
        let err = OrchestratorError::Cgrag(CgragError::IndexMissing);
        assert_eq!(err.status_hint(), StatusHint::PreconditionFailed);
    }
}
