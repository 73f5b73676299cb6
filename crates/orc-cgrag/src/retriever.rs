//! Top-K retrieval with a relevance floor and greedy token-budget packing.

use crate::embedder::{cosine_similarity, Embedder};
use crate::index::load_index;
use orc_kernel::cgrag::{CgragError, CgragResult, ContextChunk, RetrievalResult};
use orc_kernel::settings::CgragSettings;
use std::path::Path;

pub struct Retriever<E: Embedder> {
    embedder: E,
}

impl<E: Embedder> Retriever<E> {
    pub fn new(embedder: E) -> Self {
        Self { embedder }
    }

    /// Embed arbitrary text through the same embedder retrieval uses.
    /// Exposed for callers that need comparable embeddings outside of an
    /// indexed retrieval, e.g. council-mode convergence detection.
    pub async fn embed(&self, text: &str) -> CgragResult<Vec<f32>> {
        self.embedder.embed(text).await
    }

    /// Embed `query`, search the top `K = max(max_artifacts * 3, 20)`
    /// nearest neighbors by inner product, drop anything below
    /// `settings.min_relevance`, then greedily pack chunks (highest
    /// relevance first) until either `max_artifacts` is reached or the next
    /// chunk would overflow `settings.token_budget` — in which case it is
    /// skipped, not treated as a stopping point, since a smaller later
    /// chunk may still fit (spec §4.D step 4). Ties in relevance break
    /// deterministically on `(source_path, chunk_index)` so retrieval is
    /// reproducible across runs against the same index.
    pub async fn retrieve(
        &self,
        index_dir: &Path,
        query: &str,
        settings: &CgragSettings,
    ) -> CgragResult<RetrievalResult> {
        let loaded = load_index(index_dir).await?;
        if loaded.entries.is_empty() {
            return Ok(RetrievalResult::empty());
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| CgragError::EmbeddingFailed(e.to_string()))?;

        let mut scored: Vec<ContextChunk> = loaded
            .entries
            .into_iter()
            .map(|(mut chunk, embedding)| {
                chunk.relevance = cosine_similarity(&query_embedding, &embedding);
                chunk
            })
            .collect();

        scored.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source_path.cmp(&b.source_path))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });

        let k = (settings.max_artifacts * 3).max(20);
        scored.truncate(k);
        scored.retain(|c| c.relevance >= settings.min_relevance);

        Ok(pack_by_budget(
            scored,
            settings.max_artifacts,
            settings.token_budget,
        ))
    }
}

/// Greedily pack pre-ordered (descending relevance) chunks into
/// `token_budget`, stopping once `max_artifacts` is reached. A chunk that
/// would overflow the budget is skipped rather than treated as a stopping
/// point — a smaller chunk further down the list may still fit (spec §4.D
/// step 4, exercised by scenario S3).
fn pack_by_budget(
    candidates: Vec<ContextChunk>,
    max_artifacts: usize,
    token_budget: usize,
) -> RetrievalResult {
    let mut packed = Vec::new();
    let mut total_tokens = 0usize;
    for chunk in candidates {
        if packed.len() >= max_artifacts {
            break;
        }
        if total_tokens + chunk.token_count > token_budget {
            continue;
        }
        total_tokens += chunk.token_count;
        packed.push(chunk);
    }
    // spec §4.D: within_budget reflects the selected set's total, not
    // whether any candidate was skipped along the way (a skip just means a
    // chunk didn't fit, not that the budget was exceeded).
    let within_budget = total_tokens <= token_budget;
    RetrievalResult {
        artifacts: packed,
        total_tokens,
        within_budget,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use crate::index::{Document, Indexer};

    fn settings() -> CgragSettings {
        CgragSettings {
            index_dir: std::path::PathBuf::new(),
            chunk_tokens: 100,
            chunk_overlap_tokens: 10,
            max_artifacts: 5,
            min_relevance: -1.0,
            token_budget: 1000,
        }
    }

    #[tokio::test]
    async fn retrieves_relevant_chunks_over_unrelated_ones() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = Indexer::new(HashEmbedder, dir.path());
        let docs = vec![
            Document {
                source_path: "rust.md".to_string(),
                text: "the rust async runtime schedules tasks on a thread pool".to_string(),
            },
            Document {
                source_path: "bread.md".to_string(),
                text: "banana bread recipe flour sugar butter eggs bake".to_string(),
            },
        ];
        indexer.index(&docs, 100, 10).await.unwrap();

        let retriever = Retriever::new(HashEmbedder);
        let result = retriever
            .retrieve(dir.path(), "rust async scheduling", &settings())
            .await
            .unwrap();
        assert!(!result.artifacts.is_empty());
        assert_eq!(result.artifacts[0].source_path, "rust.md");
    }

    #[tokio::test]
    async fn respects_token_budget() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = Indexer::new(HashEmbedder, dir.path());
        let big_text = (0..2000)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let docs = vec![Document {
            source_path: "big.md".to_string(),
            text: big_text,
        }];
        indexer.index(&docs, 100, 0).await.unwrap();

        let mut s = settings();
        s.token_budget = 150;
        s.max_artifacts = 50;
        let retriever = Retriever::new(HashEmbedder);
        let result = retriever.retrieve(dir.path(), "word5", &s).await.unwrap();
        assert!(result.total_tokens <= 150);
    }

    #[tokio::test]
    async fn empty_index_returns_empty_result() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = Indexer::new(HashEmbedder, dir.path());
        indexer.index(&[], 100, 10).await.unwrap();
        let retriever = Retriever::new(HashEmbedder);
        let result = retriever.retrieve(dir.path(), "anything", &settings()).await;
        assert!(result.is_ok());
    }

    fn chunk(index: usize, token_count: usize, relevance: f32) -> ContextChunk {
        ContextChunk {
            source_path: "doc.md".to_string(),
            chunk_index: index,
            text: format!("chunk-{index}"),
            token_count,
            relevance,
        }
    }

    /// Spec scenario S3: a 6000-token budget with 10 descending-relevance
    /// candidates skips the chunk that would overflow and keeps packing
    /// smaller chunks that still fit.
    #[test]
    fn s3_greedy_packing_skips_overflow_and_keeps_packing() {
        let sizes = [1000, 2000, 1500, 500, 4000, 800, 600, 300, 200, 100];
        let candidates: Vec<ContextChunk> = sizes
            .iter()
            .enumerate()
            .map(|(i, &tokens)| chunk(i, tokens, 1.0 - i as f32 * 0.01))
            .collect();

        let result = pack_by_budget(candidates, 10, 6000);

        let selected: Vec<usize> = result.artifacts.iter().map(|c| c.token_count).collect();
        assert_eq!(selected, vec![1000, 2000, 1500, 500, 800, 100]);
        assert_eq!(result.total_tokens, 5900);
        assert!(result.within_budget);
    }

    #[test]
    fn max_artifacts_caps_selection_even_within_budget() {
        let candidates: Vec<ContextChunk> = (0..10).map(|i| chunk(i, 10, 1.0 - i as f32 * 0.01)).collect();
        let result = pack_by_budget(candidates, 3, 10_000);
        assert_eq!(result.artifacts.len(), 3);
        assert!(result.within_budget);
    }
}
