//! Layered configuration (TOML/YAML/JSON + `${VAR}` environment
//! substitution), mirroring the workspace's config-loader module: a file is
//! read, `${...}` placeholders are substituted against the process
//! environment, then the result is parsed into a typed [`Settings`].

use crate::model::Tier;
use config::{Config as RawConfig, File, FileFormat};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    pub scan_path: PathBuf,
    pub port_range: (u16, u16),
    pub powerful_min_b: f64,
    pub fast_max_b: f64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            scan_path: PathBuf::from("./models"),
            port_range: (38000, 38999),
            powerful_min_b: 30.0,
            fast_max_b: 8.0,
        }
    }
}

/// Global knobs merged with per-model [`crate::model::RuntimeOverrides`]
/// when the supervisor launches a process or the benchmark mode reports
/// what a model actually ran with (spec §6: "global defaults for GPU
/// layers, context size, threads, batch size").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeDefaults {
    pub gpu_layers: u32,
    pub ctx_size: u32,
    pub threads: u32,
    pub batch_size: u32,
}

impl Default for RuntimeDefaults {
    fn default() -> Self {
        Self {
            gpu_layers: 999,
            ctx_size: 4096,
            threads: 8,
            batch_size: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSettings {
    pub readiness_timeout_ms: u64,
    pub readiness_poll_interval_ms: u64,
    pub max_consecutive_failures: u32,
    pub restart_backoff_base_ms: u64,
    pub restart_backoff_max_ms: u64,
    pub vram_budget_gb: f64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            readiness_timeout_ms: 120_000,
            readiness_poll_interval_ms: 500,
            max_consecutive_failures: 5,
            restart_backoff_base_ms: 1_000,
            restart_backoff_max_ms: 60_000,
            vram_budget_gb: 24.0,
        }
    }
}

/// Per-tier inference knobs, keyed by [`crate::model::Tier`] at call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierInferenceSettings {
    pub deadline_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSettings {
    pub fast: TierInferenceSettings,
    pub balanced: TierInferenceSettings,
    pub powerful: TierInferenceSettings,
}

impl InferenceSettings {
    /// The per-tier knobs to use for a call against a model of `tier`.
    pub fn for_tier(&self, tier: Tier) -> &TierInferenceSettings {
        match tier {
            Tier::Fast => &self.fast,
            Tier::Balanced => &self.balanced,
            Tier::Powerful => &self.powerful,
        }
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            fast: TierInferenceSettings {
                deadline_ms: 10_000,
                max_retries: 2,
                retry_backoff_ms: 250,
            },
            balanced: TierInferenceSettings {
                deadline_ms: 30_000,
                max_retries: 2,
                retry_backoff_ms: 500,
            },
            powerful: TierInferenceSettings {
                deadline_ms: 90_000,
                max_retries: 1,
                retry_backoff_ms: 1_000,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CgragSettings {
    pub index_dir: PathBuf,
    pub chunk_tokens: usize,
    pub chunk_overlap_tokens: usize,
    /// Final cap on the number of artifacts packed into a retrieval result
    /// (spec §4.D: `max_artifacts`). The candidate search pulls a wider
    /// pool, `max(max_artifacts * 3, 20)`, before packing narrows it down.
    pub max_artifacts: usize,
    pub min_relevance: f32,
    pub token_budget: usize,
}

impl Default for CgragSettings {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("./cgrag-index"),
            chunk_tokens: 512,
            chunk_overlap_tokens: 64,
            max_artifacts: 8,
            min_relevance: 0.2,
            token_budget: 2048,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilSettings {
    pub default_max_turns: u8,
    pub dynamic_termination_threshold: f64,
}

impl Default for CouncilSettings {
    fn default() -> Self {
        Self {
            default_max_turns: 6,
            dynamic_termination_threshold: 0.08,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSettings {
    pub capacity: usize,
    pub lag_policy_skip: bool,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            capacity: 1024,
            lag_policy_skip: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSettings {
    pub batch_size: usize,
}

impl Default for BenchmarkSettings {
    fn default() -> Self {
        Self { batch_size: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub runtime_defaults: RuntimeDefaults,
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default)]
    pub inference: InferenceSettings,
    #[serde(default)]
    pub cgrag: CgragSettings,
    #[serde(default)]
    pub council: CouncilSettings,
    #[serde(default)]
    pub bus: BusSettings,
    #[serde(default)]
    pub benchmark: BenchmarkSettings,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("unsupported config file extension: {0}")]
    UnsupportedFormat(String),

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("environment substitution referenced unset variable: {0}")]
    MissingEnvVar(String),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Replace every `${VAR}` or `${VAR:-default}` occurrence in `input` against
/// the process environment (or `overrides` in tests).
fn substitute_env(input: &str, overrides: &HashMap<String, String>) -> SettingsResult<String> {
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}").expect("valid regex");
    let mut err = None;
    let replaced = pattern.replace_all(input, |caps: &regex::Captures| {
        let name = &caps[1];
        let default = caps.get(3).map(|m| m.as_str());
        if let Some(v) = overrides.get(name) {
            return v.clone();
        }
        match std::env::var(name) {
            Ok(v) => v,
            Err(_) => match default {
                Some(d) => d.to_string(),
                None => {
                    err = Some(name.to_string());
                    String::new()
                }
            },
        }
    });
    if let Some(name) = err {
        return Err(SettingsError::MissingEnvVar(name));
    }
    Ok(replaced.into_owned())
}

impl Settings {
    /// Load from a TOML/YAML/JSON file, substituting `${VAR}` placeholders
    /// before parsing.
    pub fn load(path: impl AsRef<Path>) -> SettingsResult<Self> {
        Self::load_with_env(path, &HashMap::new())
    }

    pub fn load_with_env(
        path: impl AsRef<Path>,
        env_overrides: &HashMap<String, String>,
    ) -> SettingsResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let substituted = substitute_env(&raw, env_overrides)?;
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            other => {
                return Err(SettingsError::UnsupportedFormat(
                    other.unwrap_or("<none>").to_string(),
                ))
            }
        };
        let built = RawConfig::builder()
            .add_source(File::from_str(&substituted, format))
            .build()?;
        Ok(built.try_deserialize()?)
    }
}
