//! Benchmark mode: run the same prompt on every enabled model, either
//! serially or in VRAM-aware parallel batches, and report a per-model
//! record plus a summary. A single model failing never fails the whole
//! request: partial success is recorded per model. Only when every
//! enabled model fails does the whole query fail (spec §4.H, §7).

use std::time::Instant;

use futures::future::join_all;
use orc_cgrag::Embedder;
use orc_inference::Generator;
use orc_kernel::model::DiscoveredModel;
use orc_kernel::pipeline::StageName;
use orc_kernel::query::{BenchmarkRecord, BenchmarkSummary, QueryMetadata, QueryRequest, QueryResponse};
use orc_kernel::settings::RuntimeDefaults;
use orc_kernel::{OrchestratorError, OrchestratorResult};
use orc_supervisor::ServerLauncher;

use crate::deadline::Deadline;
use crate::engine::Engine;

pub async fn run<L: ServerLauncher, G: Generator, Em: Embedder>(
    engine: &Engine<L, G, Em>,
    query_id: &str,
    request: &QueryRequest,
    parallel: bool,
    batch_size_override: Option<usize>,
    deadline: &Deadline,
) -> OrchestratorResult<QueryResponse> {
    let start = Instant::now();
    engine.tracker.enter(query_id, StageName::Routing)?;

    let models = engine.registry.get_enabled().await;
    let total_models = models.len();
    let batch_size = batch_size_override
        .unwrap_or(engine.settings.benchmark.batch_size)
        .max(1);

    engine.tracker.enter(query_id, StageName::Generation)?;

    let mut results = Vec::with_capacity(total_models);
    let mut approximate_timings = false;

    if parallel {
        for batch in models.chunks(batch_size) {
            if deadline.is_expired() {
                for model in batch {
                    results.push(skipped_record(model, &engine.settings.runtime_defaults));
                }
                continue;
            }
            approximate_timings = true;
            let batch_start = Instant::now();
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|model| engine.generate_on_model(model, request.query.clone(), request, deadline)),
            )
            .await;
            let per_model_ms = (batch_start.elapsed().as_millis() as u64) / batch.len().max(1) as u64;
            for (model, outcome) in batch.iter().zip(outcomes) {
                results.push(finalize_record(
                    model,
                    outcome,
                    per_model_ms,
                    &engine.settings.runtime_defaults,
                ));
            }
        }
    } else {
        for model in &models {
            if deadline.is_expired() {
                results.push(skipped_record(model, &engine.settings.runtime_defaults));
                continue;
            }
            let call_start = Instant::now();
            let outcome = engine
                .generate_on_model(model, request.query.clone(), request, deadline)
                .await;
            let elapsed_ms = call_start.elapsed().as_millis() as u64;
            results.push(finalize_record(
                model,
                outcome,
                elapsed_ms,
                &engine.settings.runtime_defaults,
            ));
        }
    }

    engine.tracker.enter(query_id, StageName::Response)?;
    engine.tracker.complete(query_id)?;

    let successful_models = results.iter().filter(|r| r.success).count();

    if total_models > 0 && successful_models == 0 {
        return Err(OrchestratorError::NoModelAvailable);
    }

    let response_text = format!("benchmarked {successful_models}/{total_models} enabled models successfully");

    Ok(QueryResponse {
        id: query_id.to_string(),
        query: request.query.clone(),
        response_text,
        metadata: QueryMetadata::Benchmark {
            results,
            summary: BenchmarkSummary {
                successful_models,
                total_models,
                approximate_timings,
            },
            processing_time_ms: start.elapsed().as_millis() as u64,
        },
    })
}

fn finalize_record(
    model: &DiscoveredModel,
    outcome: Result<(String, usize), String>,
    elapsed_ms: u64,
    defaults: &RuntimeDefaults,
) -> BenchmarkRecord {
    let context_window_used = model.overrides.ctx_size.unwrap_or(defaults.ctx_size);
    let gpu_layers_used = model.overrides.gpu_layers.unwrap_or(defaults.gpu_layers);
    let estimated_vram_gb = model.estimated_vram_gb(defaults.ctx_size);

    match outcome {
        Ok((text, token_count)) => BenchmarkRecord {
            model_id: model.model_id.clone(),
            tier: model.effective_tier(),
            response: Some(text),
            response_time_ms: elapsed_ms,
            token_count,
            success: true,
            error: None,
            estimated_vram_gb,
            gpu_layers_used,
            context_window_used,
        },
        Err(error) => BenchmarkRecord {
            model_id: model.model_id.clone(),
            tier: model.effective_tier(),
            response: None,
            response_time_ms: elapsed_ms,
            token_count: 0,
            success: false,
            error: Some(error),
            estimated_vram_gb,
            gpu_layers_used,
            context_window_used,
        },
    }
}

fn skipped_record(model: &DiscoveredModel, defaults: &RuntimeDefaults) -> BenchmarkRecord {
    finalize_record(
        model,
        Err("deadline exceeded before this model could run".to_string()),
        0,
        defaults,
    )
}
