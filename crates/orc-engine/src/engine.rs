//! [`Engine`]: composes the registry, supervisor, router, CGRAG retriever
//! and inference client into the four named query modes (spec component
//! H, "Execution Engine").

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use orc_cgrag::Embedder;
use orc_cgrag::Retriever;
use orc_inference::{GenerationRequest, Generator, InferenceClient};
use orc_kernel::model::{DiscoveredModel, ModelRegistry, Tier};
use orc_kernel::pipeline::StageName;
use orc_kernel::query::{AttachedContext, ModeRequest, QueryRequest, QueryResponse};
use orc_kernel::settings::Settings;
use orc_kernel::{OrchestratorError, OrchestratorResult, Pipeline};
use orc_pipeline::{EventBus, EventSubscription, PipelineTracker};
use orc_router::Router;
use orc_supervisor::{ServerLauncher, Supervisor};
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::ready_candidates;
use crate::deadline::Deadline;
use crate::{benchmark, council, simple, two_stage};

/// Everything a query needs to run, generic over the three pluggable seams
/// the rest of the workspace already defines: the process launcher, the
/// generation backend, and the embedder.
pub struct Engine<L: ServerLauncher, G: Generator, Em: Embedder> {
    pub(crate) registry: Arc<dyn ModelRegistry>,
    pub(crate) supervisor: Arc<Supervisor<L>>,
    pub(crate) router: Arc<Router>,
    pub(crate) tracker: Arc<PipelineTracker>,
    bus: Arc<EventBus>,
    pub(crate) retriever: Arc<Retriever<Em>>,
    pub(crate) inference: Arc<InferenceClient<G>>,
    pub(crate) settings: Settings,
}

impl<L: ServerLauncher, G: Generator, Em: Embedder> Engine<L, G, Em> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<dyn ModelRegistry>,
        supervisor: Arc<Supervisor<L>>,
        router: Arc<Router>,
        tracker: Arc<PipelineTracker>,
        bus: Arc<EventBus>,
        retriever: Arc<Retriever<Em>>,
        inference: Arc<InferenceClient<G>>,
        settings: Settings,
    ) -> Self {
        Self {
            registry,
            supervisor,
            router,
            tracker,
            bus,
            retriever,
            inference,
            settings,
        }
    }

    pub fn subscribe_events(&self) -> EventSubscription {
        self.bus.subscribe()
    }

    pub fn pipeline_status(&self, query_id: &str) -> OrchestratorResult<Pipeline> {
        Ok(self.tracker.get(query_id)?)
    }

    /// Run one query end to end. Opens a pipeline, enforces the outer
    /// deadline across the whole dispatch (not just one downstream call),
    /// and always leaves the pipeline in a terminal state before returning.
    pub async fn query(&self, request: QueryRequest) -> OrchestratorResult<QueryResponse> {
        let query_id = Uuid::new_v4().to_string();
        self.tracker.open(&query_id)?;
        let deadline = Deadline::starting_now(request.outer_deadline_ms);
        info!(query_id = %query_id, mode = ?request.mode, outer_deadline_ms = request.outer_deadline_ms, "query started");

        let outcome = match tokio::time::timeout(
            Duration::from_millis(deadline.remaining_ms().max(1)),
            self.dispatch(&query_id, &request, &deadline),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(query_id = %query_id, "query exhausted its outer deadline");
                self.tracker.fail(&query_id, "deadline_exceeded").ok();
                return Err(OrchestratorError::Deadline);
            }
        };

        match &outcome {
            Ok(_) => info!(query_id = %query_id, "query completed"),
            Err(err) => {
                warn!(query_id = %query_id, %err, "query failed");
                self.tracker.fail(&query_id, err.to_string()).ok();
            }
        }
        outcome
    }

    async fn dispatch(
        &self,
        query_id: &str,
        request: &QueryRequest,
        deadline: &Deadline,
    ) -> OrchestratorResult<QueryResponse> {
        match &request.mode {
            ModeRequest::Simple { forced } => {
                simple::run(self, query_id, request, *forced, deadline).await
            }
            ModeRequest::TwoStage { forced } => {
                two_stage::run(self, query_id, request, *forced, deadline).await
            }
            ModeRequest::Benchmark {
                parallel,
                batch_size,
            } => benchmark::run(self, query_id, request, *parallel, *batch_size, deadline).await,
            ModeRequest::Council {
                variant,
                max_turns,
                dynamic_termination,
                personas,
                moderator,
            } => {
                council::run(
                    self,
                    query_id,
                    request,
                    *variant,
                    *max_turns,
                    *dynamic_termination,
                    personas,
                    *moderator,
                    deadline,
                )
                .await
            }
        }
    }

    /// Retrieve CGRAG context for `request`, or return an empty
    /// [`AttachedContext`] when context is disabled. Propagates
    /// `IndexMissing`/`IndexCorrupt` as a hard failure when context was
    /// requested (spec §6: the caller may retry with `use_context=false`).
    pub(crate) async fn maybe_retrieve_context(
        &self,
        query_id: &str,
        request: &QueryRequest,
    ) -> OrchestratorResult<AttachedContext> {
        if !request.use_context {
            return Ok(AttachedContext::default());
        }
        self.tracker.enter(query_id, StageName::Cgrag)?;
        let result = self
            .retriever
            .retrieve(&self.settings.cgrag.index_dir, &request.query, &self.settings.cgrag)
            .await?;
        self.tracker
            .set_cgrag_artifacts(query_id, result.artifacts.len())?;
        Ok(AttachedContext {
            chunks: result.artifacts,
        })
    }

    /// Enter `stage` unless the pipeline has already moved past it. Modes
    /// that call [`generate`](Self::generate) more than once on the same
    /// `query_id` (two-stage's refine pass, each council turn) would
    /// otherwise have their second call try to re-enter `Routing` after
    /// the first call already advanced to `Generation`, which the tracker
    /// rejects as a backwards transition. Re-entering the stage the
    /// pipeline is already *at* (equal rank) still closes the previous
    /// active stage and opens a fresh one for the new call; only
    /// strictly-earlier stages are skipped.
    async fn enter_stage_for_call(&self, query_id: &str, stage: StageName) -> OrchestratorResult<()> {
        let current = self.tracker.get(query_id)?.current_stage;
        if stage.rank() >= current.rank() {
            self.tracker.enter(query_id, stage)?;
        }
        Ok(())
    }

    /// Route `prompt` to a model for `tier` (escalating per
    /// [`Tier::escalation_order`] when nothing is ready), generate, and
    /// report the model used plus wall-clock time spent generating.
    ///
    /// Returns `(model_id, response_text, token_count, tier_used, elapsed_ms)`.
    pub(crate) async fn generate(
        &self,
        query_id: &str,
        tier: Tier,
        prompt: String,
        request: &QueryRequest,
        deadline: &Deadline,
    ) -> OrchestratorResult<(String, String, usize, Tier, u64)> {
        let candidates = ready_candidates(self.registry.as_ref(), self.supervisor.as_ref()).await;
        self.enter_stage_for_call(query_id, StageName::Routing).await?;
        let (model_id, _guard) = self
            .router
            .select(tier, &candidates)
            .map_err(|_| OrchestratorError::NoModelAvailable)?;
        let model = self.registry.get(&model_id).await?;
        self.tracker
            .set_routing_result(query_id, model_id.clone(), model.effective_tier())?;

        self.enter_stage_for_call(query_id, StageName::Generation).await?;
        let start = Instant::now();
        let (text, token_count) = self.generate_on_model(&model, prompt, request, deadline).await
            .map_err(OrchestratorError::Inference)?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        Ok((model_id, text, token_count, model.effective_tier(), elapsed_ms))
    }

    /// Call a specific, already-known model directly (no routing): used by
    /// [`generate`](Self::generate) and by benchmark mode, which addresses
    /// every enabled model individually rather than letting the router
    /// pick one.
    pub(crate) async fn generate_on_model(
        &self,
        model: &DiscoveredModel,
        prompt: String,
        request: &QueryRequest,
        deadline: &Deadline,
    ) -> Result<(String, usize), String> {
        let status = self
            .supervisor
            .status(&model.model_id)
            .await
            .map_err(|e| e.to_string())?;
        if !status.state.is_routable() {
            return Err(format!("model {} is not ready", model.model_id));
        }
        let port = model
            .port
            .ok_or_else(|| format!("model {} has no assigned port", model.model_id))?;

        let mut tier_settings = self.settings.inference.for_tier(model.effective_tier()).clone();
        tier_settings.deadline_ms = deadline.cap(tier_settings.deadline_ms);

        let gen_req = GenerationRequest {
            port,
            prompt,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let resp = self
            .inference
            .generate(&gen_req, &tier_settings)
            .await
            .map_err(|e| e.to_string())?;
        let token_count = resp.token_count();
        Ok((resp.text, token_count))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use orc_kernel::pipeline::OverallStatus;
    use orc_kernel::query::ModeRequest;

    use crate::test_support::{build_fleet, request, StubBehavior, FAST_MODEL_FILE};

    /// Spec scenario S6: a model that never responds within the query's
    /// outer deadline fails the query rather than hanging, and the
    /// pipeline is left in a terminal failed state.
    #[tokio::test]
    async fn s6_slow_model_fails_once_the_outer_deadline_is_exhausted() {
        let fleet = build_fleet(&[FAST_MODEL_FILE]).await;
        fleet.set_behavior("fastfam", StubBehavior::Delay(Duration::from_millis(500)));

        let mut req = request("hello", ModeRequest::Simple { forced: None });
        req.outer_deadline_ms = 100;

        let err = fleet.engine.query(req).await.unwrap_err();
        let message = err.to_string();
        assert!(
            message.contains("deadline"),
            "expected a deadline-flavored error, got: {message}"
        );
    }

    #[tokio::test]
    async fn failed_query_leaves_pipeline_in_failed_state() {
        let fleet = build_fleet(&[FAST_MODEL_FILE]).await;
        fleet.set_behavior("fastfam", StubBehavior::Fatal("server exploded".to_string()));

        let req = request("hello", ModeRequest::Simple { forced: None });
        let err = fleet.engine.query(req).await.unwrap_err();

        // The engine doesn't hand back the query id on failure, but the
        // pipeline tracker only ever holds one open query per test fleet.
        assert!(matches!(err, orc_kernel::OrchestratorError::Inference(_)));
    }

    #[tokio::test]
    async fn subscribe_events_observes_a_completed_query() {
        let fleet = build_fleet(&[FAST_MODEL_FILE]).await;
        let mut events = fleet.engine.subscribe_events();

        let req = request("hello", ModeRequest::Simple { forced: None });
        let response = fleet.engine.query(req).await.unwrap();

        let mut saw_completion = false;
        for _ in 0..32 {
            match tokio::time::timeout(Duration::from_millis(50), events.recv()).await {
                Ok(Ok(event)) => {
                    if event.metadata.get("query_id") == Some(&response.id)
                        && event.event_type == orc_kernel::event::EventType::PipelineComplete
                    {
                        saw_completion = true;
                        break;
                    }
                }
                _ => break,
            }
        }
        assert!(saw_completion, "expected a pipeline-complete event for this query");

        let pipeline = fleet.engine.pipeline_status(&response.id).unwrap();
        assert_eq!(pipeline.overall_status, OverallStatus::Completed);
    }

    #[tokio::test]
    async fn pipeline_status_is_unknown_for_an_unrecognized_query_id() {
        let fleet = build_fleet(&[FAST_MODEL_FILE]).await;
        let err = fleet.engine.pipeline_status("not-a-real-id").unwrap_err();
        assert!(matches!(
            err,
            orc_kernel::OrchestratorError::Pipeline(orc_kernel::pipeline::PipelineError::NotFound(_))
        ));
    }
}
