//! Discovered-model types and the [`ModelRegistry`] trait contract.
//!
//! Concrete scanning/persistence lives in `orc-registry`; this crate only
//! defines the shape of the data and the trait the rest of the workspace
//! programs against, mirroring the kernel/foundation split the rest of this
//! workspace follows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Coarse capability class assigned to a model.
///
/// `Fast` = Q2, `Balanced` = Q3, `Powerful` = Q4 in the glossary's shorthand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Fast,
    Balanced,
    Powerful,
}

impl Tier {
    /// The tiers to try, in order, when the requested tier has no ready
    /// model (spec §4.F tier escalation).
    pub fn escalation_order(self) -> [Tier; 2] {
        match self {
            Tier::Fast => [Tier::Balanced, Tier::Powerful],
            Tier::Balanced => [Tier::Powerful, Tier::Fast],
            Tier::Powerful => [Tier::Balanced, Tier::Fast],
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Fast => write!(f, "Q2"),
            Tier::Balanced => write!(f, "Q3"),
            Tier::Powerful => write!(f, "Q4"),
        }
    }
}

/// Per-model runtime overrides layered on top of global defaults when the
/// supervisor launches an inference-server process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeOverrides {
    pub gpu_layers: Option<u32>,
    pub ctx_size: Option<u32>,
    pub threads: Option<u32>,
    pub batch_size: Option<u32>,
}

/// One locally available model file plus the registry's operator-mutable
/// attributes for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredModel {
    pub model_id: String,
    pub path: PathBuf,
    pub family: String,
    pub version: String,
    pub size_params_b: f64,
    pub quantization: String,
    pub is_thinking: bool,
    pub is_coder: bool,
    pub is_instruct: bool,

    pub tier: Tier,
    pub port: Option<u16>,
    pub enabled: bool,
    pub overrides: RuntimeOverrides,
    pub tier_override: Option<Tier>,
    pub thinking_override: Option<bool>,
}

/// Rough VRAM footprint estimate used for budget-aware sequencing
/// (supervisor startup ordering, benchmark batch sizing): spec §4.H's
/// `size_params_b * quant_multiplier + ctx_size * 2 bytes + 0.5 GB
/// overhead`. `quant_multiplier` comes from the spec's fixed table;
/// anything not in the table falls back to its 0.5 default.
pub fn estimate_vram_gb(size_params_b: f64, quantization: &str, ctx_size: u32) -> f64 {
    let quant_multiplier = match quantization.to_ascii_uppercase().as_str() {
        "Q2_K" => 0.25,
        "Q3_K_S" | "Q3_K_M" | "Q3_K_L" => 0.35,
        "Q4_0" | "Q4_K_S" | "Q4_K_M" => 0.50,
        "Q5_0" | "Q5_K_S" | "Q5_K_M" => 0.65,
        "Q6_K" => 0.80,
        "Q8_0" => 1.0,
        "FP16" | "F16" => 2.0,
        "F32" => 4.0,
        _ => 0.5,
    };
    let ctx_bytes_gb = (ctx_size as f64 * 2.0) / 1_000_000_000.0;
    size_params_b * quant_multiplier + ctx_bytes_gb + 0.5
}

impl DiscoveredModel {
    /// The tier actually used for routing: `tier_override` if present,
    /// otherwise the discovery-assigned `tier`.
    pub fn effective_tier(&self) -> Tier {
        self.tier_override.unwrap_or(self.tier)
    }

    /// Whether this model is a "thinking" model for prompt templating,
    /// honoring `thinking_override` when present.
    pub fn effective_thinking(&self) -> bool {
        self.thinking_override.unwrap_or(self.is_thinking)
    }

    /// `ctx_size` is the effective context size this model would run with:
    /// `self.overrides.ctx_size` if set, otherwise the caller's runtime
    /// default.
    pub fn estimated_vram_gb(&self, default_ctx_size: u32) -> f64 {
        let ctx_size = self.overrides.ctx_size.unwrap_or(default_ctx_size);
        estimate_vram_gb(self.size_params_b, &self.quantization, ctx_size)
    }
}

/// Patch applied by [`ModelRegistry::update`]. `None` fields are left
/// unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelPatch {
    pub tier: Option<Tier>,
    pub tier_override: Option<Option<Tier>>,
    pub thinking_override: Option<Option<bool>>,
    pub port: Option<u16>,
    pub overrides: Option<RuntimeOverrides>,
}

/// Scan/persistence metadata carried alongside the model map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryMeta {
    pub scan_path: PathBuf,
    pub last_scan: chrono::DateTime<chrono::Utc>,
    pub port_range: (u16, u16),
    pub powerful_min_b: f64,
    pub fast_max_b: f64,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("no free port in configured range")]
    PortExhausted,

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("port {0} already in use by another enabled model")]
    PortConflict(u16),

    #[error("duplicate model_id: {0}")]
    DuplicateModel(String),

    #[error("invalid scan path: {0}")]
    InvalidPath(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// The typed API surface a transport layer (out of scope here) would call
/// into. Concrete implementation lives in `orc-registry::JsonModelRegistry`.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Walk `root_path`, identify model files, assign tiers/ports, and
    /// persist the result. Preserves operator overrides for models whose
    /// `model_id` already exists.
    async fn scan(&self, root_path: PathBuf) -> RegistryResult<()>;

    /// Snapshot a single model by id.
    async fn get(&self, model_id: &str) -> RegistryResult<DiscoveredModel>;

    /// Apply a patch to a model's mutable attributes.
    async fn update(&self, model_id: &str, patch: ModelPatch) -> RegistryResult<DiscoveredModel>;

    /// Flip `enabled = true`. Idempotent.
    async fn enable(&self, model_id: &str) -> RegistryResult<()>;

    /// Flip `enabled = false`. Idempotent. Routing must stop honoring this
    /// model immediately; the supervisor stopping the process happens on a
    /// separate, slightly later timeline (spec §4.A).
    async fn disable(&self, model_id: &str) -> RegistryResult<()>;

    /// Snapshot of every currently enabled model.
    async fn get_enabled(&self) -> Vec<DiscoveredModel>;

    /// Snapshot of every discovered model, enabled or not.
    async fn list_all(&self) -> Vec<DiscoveredModel>;
}
