//! The [`Embedder`] seam: turns text into a unit-normalized vector. Real
//! deployments would call out to an embedding model; [`HashEmbedder`] is a
//! deterministic stand-in used by tests and as a dependency-free default.

use async_trait::async_trait;
use orc_kernel::cgrag::CgragResult;

pub const EMBEDDING_DIMS: usize = 64;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> CgragResult<Vec<f32>>;
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

/// Deterministic bag-of-words hashing embedder: each whitespace token is
/// hashed into one of [`EMBEDDING_DIMS`] buckets, bucket counts become the
/// (unit-normalized) vector. No external model dependency, so it's usable
/// in tests and as a zero-config default.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> CgragResult<Vec<f32>> {
        let mut buckets = vec![0f32; EMBEDDING_DIMS];
        for token in text.split_whitespace() {
            let lower = token.to_ascii_lowercase();
            let mut hash: u64 = 1469598103934665603;
            for byte in lower.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            buckets[(hash as usize) % EMBEDDING_DIMS] += 1.0;
        }
        Ok(normalize(buckets))
    }
}

#[async_trait]
impl Embedder for std::sync::Arc<dyn Embedder> {
    async fn embed(&self, text: &str) -> CgragResult<Vec<f32>> {
        (**self).embed(text).await
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_is_deterministic() {
        let e = HashEmbedder;
        let a = e.embed("the quick brown fox").await.unwrap();
        let b = e.embed("the quick brown fox").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn embed_is_unit_normalized() {
        let e = HashEmbedder;
        let v = e.embed("hello world hello").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5 || norm == 0.0);
    }

    #[tokio::test]
    async fn similar_text_scores_higher_than_unrelated_text() {
        let e = HashEmbedder;
        let query = e.embed("rust async runtime scheduling").await.unwrap();
        let similar = e
            .embed("the rust async runtime handles scheduling")
            .await
            .unwrap();
        let unrelated = e.embed("banana bread recipe ingredients").await.unwrap();
        assert!(cosine_similarity(&query, &similar) > cosine_similarity(&query, &unrelated));
    }
}
