//! Shared types, trait contracts and error taxonomy for the model
//! orchestrator workspace. Every other crate here depends on `orc-kernel`;
//! it depends on nothing in the workspace itself.

pub mod cgrag;
pub mod complexity;
pub mod error;
pub mod event;
pub mod model;
pub mod pipeline;
pub mod query;
pub mod server;
pub mod settings;

pub use cgrag::{CgragError, CgragResult, ContextChunk, RetrievalResult};
pub use complexity::{Complexity, Indicator};
pub use error::{OrchestratorError, OrchestratorResult, StatusHint};
pub use event::{Event, EventType, Severity};
pub use model::{
    estimate_vram_gb, DiscoveredModel, ModelPatch, ModelRegistry, RegistryError, RegistryMeta,
    RegistryResult, RuntimeOverrides, Tier,
};
pub use pipeline::{
    OverallStatus, Pipeline, PipelineError, PipelineResult, Stage, StageName, StageStatus,
};
pub use query::{
    AttachedContext, BenchmarkRecord, BenchmarkSummary, CouncilTurn, CouncilVariant,
    CouncilWinner, ForcedComplexity, ModeRequest, ModeratorAnalysis, PersonaConfig, QueryMetadata,
    QueryRequest, QueryResponse,
};
pub use server::{ServerState, ServerStatus, SupervisorError, SupervisorResult};
pub use settings::{
    BenchmarkSettings, BusSettings, CgragSettings, CouncilSettings, InferenceSettings,
    RegistrySettings, RuntimeDefaults, Settings, SettingsError, SettingsResult,
    SupervisorSettings, TierInferenceSettings,
};
