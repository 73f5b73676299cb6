//! Builds and persists the on-disk retrieval index: `docs.index` holds
//! packed little-endian float32 embeddings (`[n, dim]`, unit-normalized),
//! `docs.metadata` holds a JSON array of the chunk records those embeddings
//! describe in the same order, and `docs.info` is a small sidecar used to
//! detect a missing or corrupt index without loading the other two files
//! (spec §6).

use crate::chunk::chunk_document;
use crate::embedder::Embedder;
use orc_kernel::cgrag::{CgragError, CgragResult, ContextChunk};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub dim: usize,
    pub count: usize,
    pub embedding_model_name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub struct Document {
    pub source_path: String,
    pub text: String,
}

pub struct Indexer<E: Embedder> {
    embedder: E,
    index_dir: PathBuf,
    embedding_model_name: String,
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
    ));
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Pack `[n, dim]` unit-norm vectors as little-endian float32, row-major —
/// the `docs.index` wire format spec §6 specifies.
fn encode_vectors(vectors: &[Vec<f32>]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vectors.iter().map(|v| v.len() * 4).sum());
    for vector in vectors {
        for value in vector {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    bytes
}

fn decode_vectors(bytes: &[u8], count: usize, dim: usize) -> CgragResult<Vec<Vec<f32>>> {
    if count * dim * 4 != bytes.len() {
        return Err(CgragError::IndexCorrupt(format!(
            "expected {} bytes for {count} vectors of dim {dim}, found {}",
            count * dim * 4,
            bytes.len()
        )));
    }
    let mut vectors = Vec::with_capacity(count);
    for chunk in bytes.chunks_exact(dim * 4) {
        let vector = chunk
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        vectors.push(vector);
    }
    Ok(vectors)
}

impl<E: Embedder> Indexer<E> {
    pub fn new(embedder: E, index_dir: impl Into<PathBuf>) -> Self {
        Self::with_model_name(embedder, index_dir, "hash-embedder-v1")
    }

    pub fn with_model_name(
        embedder: E,
        index_dir: impl Into<PathBuf>,
        embedding_model_name: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            index_dir: index_dir.into(),
            embedding_model_name: embedding_model_name.into(),
        }
    }

    /// Chunk and embed every document, then persist the three index files.
    /// Overwrites any existing index: CGRAG's index is rebuilt wholesale,
    /// not incrementally updated.
    pub async fn index(
        &self,
        documents: &[Document],
        chunk_tokens: usize,
        overlap_tokens: usize,
    ) -> CgragResult<()> {
        let mut metadata = Vec::new();
        let mut embeddings = Vec::new();

        for doc in documents {
            let chunks = chunk_document(&doc.text, chunk_tokens, overlap_tokens);
            for c in chunks {
                let embedding = self
                    .embedder
                    .embed(&c.text)
                    .await
                    .map_err(|e| CgragError::EmbeddingFailed(e.to_string()))?;
                metadata.push(ContextChunk {
                    source_path: doc.source_path.clone(),
                    chunk_index: c.index,
                    text: c.text,
                    token_count: c.token_count,
                    relevance: 0.0,
                });
                embeddings.push(embedding);
            }
        }

        let dim = embeddings.first().map(|e| e.len()).unwrap_or(0);
        let info = IndexInfo {
            dim,
            count: metadata.len(),
            embedding_model_name: self.embedding_model_name.clone(),
            created_at: chrono::Utc::now(),
        };

        write_atomic(
            &self.index_dir.join("docs.index"),
            &encode_vectors(&embeddings),
        )
        .await?;
        write_atomic(
            &self.index_dir.join("docs.metadata"),
            &serde_json::to_vec(&metadata)?,
        )
        .await?;
        write_atomic(
            &self.index_dir.join("docs.info"),
            &serde_json::to_vec(&info)?,
        )
        .await?;
        info!(
            index_dir = %self.index_dir.display(),
            documents = documents.len(),
            chunks = metadata.len(),
            dim,
            "rebuilt cgrag index"
        );
        Ok(())
    }
}

pub struct LoadedIndex {
    pub info: IndexInfo,
    pub entries: Vec<(ContextChunk, Vec<f32>)>,
}

/// Load the three sidecar files and verify spec §6's integrity check:
/// `count * dim * 4 == size(docs.index)` and `len(metadata) == count`.
pub async fn load_index(index_dir: &Path) -> CgragResult<LoadedIndex> {
    let info_path = index_dir.join("docs.info");
    let metadata_path = index_dir.join("docs.metadata");
    let index_path = index_dir.join("docs.index");

    if !info_path.exists() || !metadata_path.exists() || !index_path.exists() {
        warn!(index_dir = %index_dir.display(), "cgrag index missing one or more sidecar files");
        return Err(CgragError::IndexMissing);
    }

    let info_bytes = tokio::fs::read(&info_path).await?;
    let metadata_bytes = tokio::fs::read(&metadata_path).await?;
    let index_bytes = tokio::fs::read(&index_path).await?;

    let info: IndexInfo = serde_json::from_slice(&info_bytes)?;
    let metadata: Vec<ContextChunk> = serde_json::from_slice(&metadata_bytes)?;

    if metadata.len() != info.count {
        warn!(
            index_dir = %index_dir.display(),
            metadata_len = metadata.len(),
            declared_count = info.count,
            "cgrag index metadata/info count mismatch"
        );
        return Err(CgragError::IndexCorrupt(format!(
            "metadata has {} entries but docs.info declares count {}",
            metadata.len(),
            info.count
        )));
    }

    let embeddings = decode_vectors(&index_bytes, info.count, info.dim)?;

    Ok(LoadedIndex {
        info,
        entries: metadata.into_iter().zip(embeddings).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;

    #[tokio::test]
    async fn indexes_and_reloads_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = Indexer::new(HashEmbedder, dir.path());
        let docs = vec![Document {
            source_path: "a.md".to_string(),
            text: "hello world this is a test document about rust".to_string(),
        }];
        indexer.index(&docs, 100, 10).await.unwrap();

        let loaded = load_index(dir.path()).await.unwrap();
        assert_eq!(loaded.info.count, 1);
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].0.source_path, "a.md");
        assert_eq!(loaded.entries[0].1.len(), loaded.info.dim);
    }

    #[tokio::test]
    async fn docs_index_is_packed_little_endian_f32() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = Indexer::new(HashEmbedder, dir.path());
        let docs = vec![Document {
            source_path: "a.md".to_string(),
            text: "one two three four five".to_string(),
        }];
        indexer.index(&docs, 100, 10).await.unwrap();

        let info_bytes = tokio::fs::read(dir.path().join("docs.info")).await.unwrap();
        let info: IndexInfo = serde_json::from_slice(&info_bytes).unwrap();
        let index_bytes = tokio::fs::read(dir.path().join("docs.index")).await.unwrap();
        assert_eq!(index_bytes.len(), info.count * info.dim * 4);
    }

    #[tokio::test]
    async fn missing_index_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_index(dir.path()).await;
        assert!(matches!(result, Err(CgragError::IndexMissing)));
    }

    #[tokio::test]
    async fn truncated_index_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = Indexer::new(HashEmbedder, dir.path());
        let docs = vec![Document {
            source_path: "a.md".to_string(),
            text: "one two three four five".to_string(),
        }];
        indexer.index(&docs, 100, 10).await.unwrap();

        let index_path = dir.path().join("docs.index");
        let mut bytes = tokio::fs::read(&index_path).await.unwrap();
        bytes.truncate(bytes.len() - 4);
        tokio::fs::write(&index_path, &bytes).await.unwrap();

        let result = load_index(dir.path()).await;
        assert!(matches!(result, Err(CgragError::IndexCorrupt(_))));
    }
}
