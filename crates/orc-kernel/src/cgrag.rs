//! CGRAG (context-guided retrieval-augmented generation) result types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One retrieved chunk attached as context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub source_path: String,
    pub chunk_index: usize,
    pub text: String,
    pub token_count: usize,
    pub relevance: f32,
}

/// The outcome of one retrieval call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub artifacts: Vec<ContextChunk>,
    pub total_tokens: usize,
    pub within_budget: bool,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self {
            artifacts: Vec::new(),
            total_tokens: 0,
            within_budget: true,
        }
    }

    /// Render the selected artifacts as the `"Context:\n<chunks>"` prefix
    /// described in spec §4.H (Simple mode).
    pub fn render_context_block(&self) -> String {
        let mut out = String::new();
        for chunk in &self.artifacts {
            out.push_str(&chunk.text);
            out.push_str("\n\n");
        }
        out
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CgragError {
    #[error("index files are missing; index() must run before retrieve()")]
    IndexMissing,

    #[error("index is corrupt: {0}")]
    IndexCorrupt(String),

    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CgragResult<T> = Result<T, CgragError>;
