//! Simple mode: one complexity assessment, one optional CGRAG retrieval,
//! one routed generation call (spec §4.H).

use std::time::Instant;

use orc_cgrag::Embedder;
use orc_inference::Generator;
use orc_kernel::pipeline::StageName;
use orc_kernel::query::{ForcedComplexity, QueryMetadata, QueryRequest, QueryResponse};
use orc_kernel::OrchestratorResult;
use orc_supervisor::ServerLauncher;

use crate::context::build_prompt;
use crate::deadline::Deadline;
use crate::engine::Engine;

pub async fn run<L: ServerLauncher, G: Generator, Em: Embedder>(
    engine: &Engine<L, G, Em>,
    query_id: &str,
    request: &QueryRequest,
    forced: Option<ForcedComplexity>,
    deadline: &Deadline,
) -> OrchestratorResult<QueryResponse> {
    let start = Instant::now();

    engine.tracker.enter(query_id, StageName::Complexity)?;
    let complexity = match forced {
        Some(forced) => orc_router::forced(forced.tier()),
        None => orc_router::assess(&request.query),
    };

    let context = engine.maybe_retrieve_context(query_id, request).await?;
    let prompt = build_prompt(&request.query, &context);

    let (model_id, response_text, _token_count, tier, _elapsed_ms) = engine
        .generate(query_id, complexity.tier, prompt, request, deadline)
        .await?;

    engine.tracker.enter(query_id, StageName::Response)?;
    engine.tracker.complete(query_id)?;

    Ok(QueryResponse {
        id: query_id.to_string(),
        query: request.query.clone(),
        response_text,
        metadata: QueryMetadata::Simple {
            tier,
            model_id,
            complexity_score: complexity.score,
            complexity_reasoning: complexity.reasoning,
            cgrag_artifacts: context.chunks.len(),
            processing_time_ms: start.elapsed().as_millis() as u64,
        },
    })
}
