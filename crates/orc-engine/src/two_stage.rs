//! Two-stage mode: a fast/balanced draft with full CGRAG context, then a
//! powerful-tier refinement pass over the draft (spec §4.H). A stage-1
//! failure is fatal to the whole request — there is no silent fallback to
//! single-stage.

use std::time::Instant;

use orc_cgrag::Embedder;
use orc_inference::Generator;
use orc_kernel::model::Tier;
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
    // Stage 1 never runs on the powerful tier: that's reserved for stage 2.
    let draft_tier = match complexity.tier {
        Tier::Powerful => Tier::Balanced,
        other => other,
    };

    let context = engine.maybe_retrieve_context(query_id, request).await?;
    let draft_prompt = build_prompt(&request.query, &context);

    let draft_start = Instant::now();
    let (draft_model_id, draft_text, _draft_tokens, draft_tier, _elapsed) = engine
        .generate(query_id, draft_tier, draft_prompt, request, deadline)
        .await?;
    let draft_time_ms = draft_start.elapsed().as_millis() as u64;

    let refine_prompt = if context.chunks.is_empty() {
        format!(
            "Original query:\n{}\n\nDraft answer:\n{}\n\nRefine the draft above into a clear, \
             accurate, polished final answer to the original query.",
            request.query, draft_text,
        )
    } else {
        let context_excerpt = context
            .chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");
        format!(
            "Original query:\n{}\n\nRetrieved context:\n{}\n\nDraft answer:\n{}\n\nRefine the draft \
             above into a clear, accurate, polished final answer to the original query, using the \
             retrieved context where relevant.",
            request.query, context_excerpt, draft_text,
        )
    };

    let refine_start = Instant::now();
    let (refine_model_id, response_text, _refine_tokens, refine_tier, _elapsed) = engine
        .generate(query_id, Tier::Powerful, refine_prompt, request, deadline)
        .await?;
    let refine_time_ms = refine_start.elapsed().as_millis() as u64;

    engine.tracker.enter(query_id, StageName::Response)?;
    engine.tracker.complete(query_id)?;

    Ok(QueryResponse {
        id: query_id.to_string(),
        query: request.query.clone(),
        response_text,
        metadata: QueryMetadata::TwoStage {
            draft_tier,
            draft_model_id,
            draft_time_ms,
            refine_tier,
            refine_model_id,
            refine_time_ms,
            cgrag_artifacts: context.chunks.len(),
            processing_time_ms: start.elapsed().as_millis() as u64,
        },
    })
}
