//! Shared fixtures for the mode tests spread across this crate: a real
//! registry/supervisor/router/tracker/retriever wired against a stub
//! launcher and generator so each mode can be exercised end to end without a
//! real model process or HTTP endpoint. Mirrors the fixture helpers each
//! downstream crate already keeps in its own `#[cfg(test)]` module
//! (`orc_registry::tests::registry_with_files`, `orc_supervisor::tests::model`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use orc_cgrag::{HashEmbedder, Retriever};
use orc_inference::{
    GenerationRequest, GenerationResponse, Generator, InferenceClient, InferenceError,
    InferenceResult,
};
use orc_kernel::model::{ModelRegistry, RegistryMeta};
use orc_kernel::query::{ModeRequest, QueryRequest};
use orc_kernel::settings::Settings;
use orc_pipeline::{EventBus, LagPolicy, PipelineTracker};
use orc_registry::JsonModelRegistry;
use orc_router::Router;
use orc_supervisor::{MockLauncher, Supervisor};

use crate::engine::Engine;

/// Canned behavior for one model's assigned port.
#[derive(Clone)]
pub enum StubBehavior {
    Ok(String),
    Fatal(String),
    Delay(std::time::Duration),
    /// Cycles through one text per call against this port, repeating the
    /// last entry once exhausted — lets a council test script a specific
    /// turn-by-turn transcript (e.g. two dissimilar turns followed by a
    /// repeated one, to drive dynamic termination deterministically).
    Sequence(Vec<String>),
}

/// A [`Generator`] whose response is chosen by the port being called,
/// rather than by talking to anything real. Behaviors live behind a shared
/// map so a test can register one for a model *after* the fleet has been
/// built and the model's registry-assigned port is known, rather than
/// guessing directory-scan port allocation order up front.
pub struct StubGenerator {
    behaviors: Arc<DashMap<u16, StubBehavior>>,
    call_counts: Arc<DashMap<u16, AtomicUsize>>,
}

#[async_trait]
impl Generator for StubGenerator {
    async fn generate(&self, req: &GenerationRequest) -> InferenceResult<GenerationResponse> {
        match self.behaviors.get(&req.port).map(|b| b.clone()) {
            Some(StubBehavior::Ok(text)) => Ok(GenerationResponse {
                text: text.clone(),
                tokens_generated: Some(text.split_whitespace().count().max(1)),
            }),
            Some(StubBehavior::Fatal(msg)) => Err(InferenceError::Fatal(msg)),
            Some(StubBehavior::Delay(d)) => {
                tokio::time::sleep(d).await;
                Ok(GenerationResponse {
                    text: format!("slow response from port {}", req.port),
                    tokens_generated: Some(3),
                })
            }
            Some(StubBehavior::Sequence(texts)) => {
                let counter = self
                    .call_counts
                    .entry(req.port)
                    .or_insert_with(|| AtomicUsize::new(0));
                let call = counter.fetch_add(1, Ordering::SeqCst);
                let index = call.min(texts.len().saturating_sub(1));
                let text = texts[index].clone();
                Ok(GenerationResponse {
                    text: text.clone(),
                    tokens_generated: Some(text.split_whitespace().count().max(1)),
                })
            }
            None => Ok(GenerationResponse {
                text: format!("response from port {}", req.port),
                tokens_generated: Some(3),
            }),
        }
    }
}

/// Model-file names following the `<family>-<size>b-<tag>-<quant>.gguf`
/// convention `orc_registry::discovery` parses, one per tier under the
/// default `fast_max_b: 8.0` / `powerful_min_b: 30.0` thresholds. Each
/// embeds a distinct family name so a test can find its port in
/// [`TestFleet::ports`] without depending on directory-scan order.
pub const FAST_MODEL_FILE: &str = "fastfam-3b-instruct-q4_k_m.gguf";
pub const BALANCED_MODEL_FILE: &str = "balancedfam-14b-instruct-q4_k_m.gguf";
pub const POWERFUL_MODEL_FILE: &str = "powerfam-70b-instruct-q4_k_m.gguf";

pub struct TestFleet {
    pub engine: Engine<MockLauncher, StubGenerator, HashEmbedder>,
    /// `model_id -> assigned port`, so a test can key a [`StubBehavior`] to
    /// whichever model it wants to target.
    pub ports: HashMap<String, u16>,
    behaviors: Arc<DashMap<u16, StubBehavior>>,
    _models_dir: tempfile::TempDir,
    _state_dir: tempfile::TempDir,
}

impl TestFleet {
    /// Look up `model_id` by its family name (the part of
    /// [`FAST_MODEL_FILE`]/etc. before the size token) and register a
    /// behavior for whatever port the registry assigned it.
    pub fn set_behavior(&self, family: &str, behavior: StubBehavior) {
        let port = self
            .ports
            .iter()
            .find(|(id, _)| id.starts_with(family))
            .map(|(_, port)| *port)
            .unwrap_or_else(|| panic!("no model with family {family} in this fleet"));
        self.behaviors.insert(port, behavior);
    }
}

/// Scan, enable and start every model file named in `files`, then assemble
/// an [`Engine`] over them. Generation calls succeed with a canned "response
/// from port N" text unless [`TestFleet::set_behavior`] overrides it.
pub async fn build_fleet(files: &[&str]) -> TestFleet {
    let models_dir = tempfile::tempdir().unwrap();
    for f in files {
        tokio::fs::write(models_dir.path().join(f), b"stub")
            .await
            .unwrap();
    }
    let state_dir = tempfile::tempdir().unwrap();
    let meta = RegistryMeta {
        scan_path: models_dir.path().to_path_buf(),
        last_scan: chrono::Utc::now(),
        port_range: (38000, 38099),
        powerful_min_b: 30.0,
        fast_max_b: 8.0,
    };
    let registry = JsonModelRegistry::open(state_dir.path().join("registry.json"), meta)
        .await
        .unwrap();
    registry
        .scan(models_dir.path().to_path_buf())
        .await
        .unwrap();

    let mut ports = HashMap::new();
    for model in registry.list_all().await {
        registry.enable(&model.model_id).await.unwrap();
        ports.insert(model.model_id.clone(), model.port.unwrap());
    }

    let mut settings = Settings::default();
    settings.cgrag.index_dir = state_dir.path().join("cgrag-index");
    // Fast per-tier deadlines so a test that deliberately blows its budget
    // doesn't have to wait real tier-default timeouts out.
    settings.inference.fast.deadline_ms = 2_000;
    settings.inference.balanced.deadline_ms = 2_000;
    settings.inference.powerful.deadline_ms = 2_000;

    let supervisor = Arc::new(Supervisor::new(
        MockLauncher::new(1),
        settings.supervisor.clone(),
        settings.runtime_defaults.ctx_size,
    ));
    for model in registry.get_enabled().await {
        supervisor.start(&model).await.unwrap();
    }

    let registry: Arc<dyn ModelRegistry> = Arc::new(registry);
    let router = Arc::new(Router::new());
    let bus = Arc::new(EventBus::new(
        settings.bus.capacity,
        LagPolicy::SkipAndContinue,
    ));
    let tracker = Arc::new(PipelineTracker::new(bus.clone()));
    let retriever = Arc::new(Retriever::new(HashEmbedder));
    let behaviors = Arc::new(DashMap::new());
    let inference = Arc::new(InferenceClient::new(StubGenerator {
        behaviors: behaviors.clone(),
        call_counts: Arc::new(DashMap::new()),
    }));

    let engine = Engine::new(
        registry, supervisor, router, tracker, bus, retriever, inference, settings,
    );

    TestFleet {
        engine,
        ports,
        behaviors,
        _models_dir: models_dir,
        _state_dir: state_dir,
    }
}

/// A plain request with the given mode and no context/web-search, a
/// generous outer deadline by default.
pub fn request(query: &str, mode: ModeRequest) -> QueryRequest {
    QueryRequest {
        query: query.to_string(),
        mode,
        use_context: false,
        use_web_search: false,
        max_tokens: 256,
        temperature: 0.7,
        outer_deadline_ms: 5_000,
    }
}
