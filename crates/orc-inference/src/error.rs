use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InferenceError {
    #[error("request deadline exceeded after {attempts} attempt(s)")]
    Deadline { attempts: u32 },

    #[error("transient error calling model server: {0}")]
    Transient(String),

    #[error("fatal error calling model server: {0}")]
    Fatal(String),
}

impl InferenceError {
    /// Whether retrying this error class could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InferenceError::Transient(_))
    }

    /// Classify a transport-level error from `reqwest` as transient
    /// (connection refused, timed out) or fatal (anything else, e.g. a
    /// malformed request the server itself rejected).
    pub fn classify_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            InferenceError::Transient(err.to_string())
        } else {
            InferenceError::Fatal(err.to_string())
        }
    }
}

pub type InferenceResult<T> = Result<T, InferenceError>;
