//! Generation request/response types and the [`Generator`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::InferenceResult;

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub port: u16,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationResponse {
    pub text: String,
    /// Token count as reported by the server, when it reports one at all.
    #[serde(default)]
    pub tokens_generated: Option<usize>,
}

impl GenerationResponse {
    /// Resolved token count: the server's own figure if present, otherwise
    /// a whitespace-split estimate over `text` (spec §4.C: "token count
    /// derived from the server's response if present, otherwise estimated
    /// via a whitespace heuristic").
    pub fn token_count(&self) -> usize {
        self.tokens_generated
            .unwrap_or_else(|| self.text.split_whitespace().count())
    }
}

/// One call to a running inference-server process. Implementations do not
/// retry or enforce deadlines themselves; [`crate::InferenceClient`] wraps
/// whichever `Generator` it's given with that policy.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, req: &GenerationRequest) -> InferenceResult<GenerationResponse>;
}

#[async_trait]
impl Generator for std::sync::Arc<dyn Generator> {
    async fn generate(&self, req: &GenerationRequest) -> InferenceResult<GenerationResponse> {
        (**self).generate(req).await
    }
}

/// Talks to a local OpenAI-compatible-ish `/completion` endpoint over HTTP.
pub struct HttpGenerator {
    client: reqwest::Client,
}

impl HttpGenerator {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
struct CompletionWireRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, req: &GenerationRequest) -> InferenceResult<GenerationResponse> {
        let url = format!("http://127.0.0.1:{}/completion", req.port);
        let body = CompletionWireRequest {
            prompt: &req.prompt,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
        };
        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(crate::error::InferenceError::classify_reqwest)?;

        if !resp.status().is_success() {
            let status = resp.status();
            // spec §4.C: 5xx is Transient (the server may recover), 4xx is
            // Fatal (retrying an identical malformed request never helps).
            return Err(if status.is_server_error() {
                crate::error::InferenceError::Transient(format!("server returned {status}"))
            } else {
                crate::error::InferenceError::Fatal(format!("server returned {status}"))
            });
        }

        resp.json::<GenerationResponse>()
            .await
            .map_err(crate::error::InferenceError::classify_reqwest)
    }
}
