//! Request/response types for `Engine::query`.

use crate::cgrag::ContextChunk;
use crate::model::Tier;
use serde::{Deserialize, Serialize};

/// Caller-forced complexity override (spec §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedComplexity {
    Simple,
    Moderate,
    Complex,
}

impl ForcedComplexity {
    pub fn tier(self) -> Tier {
        match self {
            ForcedComplexity::Simple => Tier::Fast,
            ForcedComplexity::Moderate => Tier::Balanced,
            ForcedComplexity::Complex => Tier::Powerful,
        }
    }
}

/// Adversarial vs. consensus council dialogue shape (spec §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouncilVariant {
    Consensus,
    Adversarial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Named persona profile, or a custom `(pro, con)` string pair.
    pub named_profile: Option<String>,
    pub custom_pro: Option<String>,
    pub custom_con: Option<String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            named_profile: None,
            custom_pro: None,
            custom_con: None,
        }
    }
}

/// Mode-specific knobs supplied on a query request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ModeRequest {
    Simple {
        forced: Option<ForcedComplexity>,
    },
    TwoStage {
        forced: Option<ForcedComplexity>,
    },
    Benchmark {
        parallel: bool,
        batch_size: Option<usize>,
    },
    Council {
        variant: CouncilVariant,
        max_turns: u8,
        dynamic_termination: bool,
        personas: PersonaConfig,
        moderator: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub mode: ModeRequest,
    pub use_context: bool,
    /// External collaborator (web search); the engine never performs this
    /// itself, it only threads the flag through for the transport layer.
    pub use_web_search: bool,
    pub max_tokens: u32,
    pub temperature: f32,
    pub outer_deadline_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub model_id: String,
    pub tier: Tier,
    pub response: Option<String>,
    pub response_time_ms: u64,
    pub token_count: usize,
    pub success: bool,
    pub error: Option<String>,
    pub estimated_vram_gb: f64,
    pub gpu_layers_used: u32,
    pub context_window_used: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    pub successful_models: usize,
    pub total_models: usize,
    pub approximate_timings: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilTurn {
    pub turn_number: u32,
    pub speaker_id: String,
    pub persona: String,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub tokens_used: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouncilWinner {
    Pro,
    Con,
    Tie,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratorAnalysis {
    pub argument_strength: String,
    pub logical_fallacies: Vec<String>,
    pub rhetorical_techniques: Vec<String>,
    pub key_turning_points: Vec<String>,
    pub overall_winner: Option<CouncilWinner>,
}

/// Discriminated union of mode-specific response payloads (spec §9
/// REDESIGN FLAGS: dict-shaped metadata becomes an explicit tagged union).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "query_mode", rename_all = "snake_case")]
pub enum QueryMetadata {
    Simple {
        tier: Tier,
        model_id: String,
        complexity_score: f64,
        complexity_reasoning: String,
        cgrag_artifacts: usize,
        processing_time_ms: u64,
    },
    TwoStage {
        draft_tier: Tier,
        draft_model_id: String,
        draft_time_ms: u64,
        refine_tier: Tier,
        refine_model_id: String,
        refine_time_ms: u64,
        cgrag_artifacts: usize,
        processing_time_ms: u64,
    },
    Benchmark {
        results: Vec<BenchmarkRecord>,
        summary: BenchmarkSummary,
        processing_time_ms: u64,
    },
    Council {
        turns: Vec<CouncilTurn>,
        termination_reason: String,
        moderator_analysis: Option<ModeratorAnalysis>,
        processing_time_ms: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub id: String,
    pub query: String,
    pub response_text: String,
    pub metadata: QueryMetadata,
}

/// Context pulled in during retrieval, threaded into mode execution before
/// the response metadata is finalized.
#[derive(Debug, Clone, Default)]
pub struct AttachedContext {
    pub chunks: Vec<ContextChunk>,
}
