//! Small helpers shared across the mode implementations: building the
//! router's candidate list from live registry + supervisor state, and
//! rendering retrieved CGRAG artifacts into a prompt prefix.

use orc_kernel::model::ModelRegistry;
use orc_kernel::query::AttachedContext;
use orc_supervisor::{ServerLauncher, Supervisor};

use orc_router::RoutableModel;

/// Every enabled model whose supervised process is currently `Ready` —
/// the only models the router is allowed to pick (spec §3 invariant).
pub async fn ready_candidates<L: ServerLauncher>(
    registry: &dyn ModelRegistry,
    supervisor: &Supervisor<L>,
) -> Vec<RoutableModel> {
    let mut candidates = Vec::new();
    for model in registry.get_enabled().await {
        if let Ok(status) = supervisor.status(&model.model_id).await {
            if status.state.is_routable() {
                candidates.push(RoutableModel {
                    model_id: model.model_id,
                    tier: model.effective_tier(),
                });
            }
        }
    }
    candidates
}

/// Prefix `query` with a `Context:\n...` block built from retrieved
/// artifacts (spec §4.H, Simple mode), or return it unchanged when nothing
/// was retrieved.
pub fn build_prompt(query: &str, context: &AttachedContext) -> String {
    if context.chunks.is_empty() {
        return query.to_string();
    }
    let mut block = String::new();
    for chunk in &context.chunks {
        block.push_str(&chunk.text);
        block.push_str("\n\n");
    }
    format!("Context:\n{block}\nQuery:\n{query}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_kernel::cgrag::ContextChunk;

    #[test]
    fn build_prompt_passes_through_without_context() {
        let ctx = AttachedContext::default();
        assert_eq!(build_prompt("what is rust", &ctx), "what is rust");
    }

    #[test]
    fn build_prompt_prefixes_context_block() {
        let ctx = AttachedContext {
            chunks: vec![ContextChunk {
                source_path: "a.md".to_string(),
                chunk_index: 0,
                text: "rust is a systems language".to_string(),
                token_count: 5,
                relevance: 0.9,
            }],
        };
        let prompt = build_prompt("what is rust", &ctx);
        assert!(prompt.contains("Context:"));
        assert!(prompt.contains("rust is a systems language"));
        assert!(prompt.ends_with("Query:\nwhat is rust"));
    }
}
