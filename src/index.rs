//! Vector index over embedded legal chunks.
//!
//! Nearest-neighbor search with predicate filtering applied **before**
//! scoring, so selective filters narrow the candidate set instead of
//! emptying the top-k. Distances are cosine; ties break by ascending
//! `doc_id` for determinism.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::catalog::{ChunkMeta, MetadataFilter, StoredChunk};
use crate::error::EngineError;

/// One chunk stored in the index.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    /// Stable chunk identifier.
    pub doc_id: String,
    /// Chunk text.
    pub content: String,
    /// Structured metadata.
    pub meta: ChunkMeta,
    /// Embedding vector.
    pub embedding: Vec<f32>,
}

impl From<StoredChunk> for IndexedChunk {
    fn from(chunk: StoredChunk) -> Self {
        Self {
            doc_id: chunk.doc_id,
            content: chunk.content,
            meta: chunk.meta,
            embedding: chunk.embedding,
        }
    }
}

/// One scored search hit, ascending distance.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Stable chunk identifier.
    pub doc_id: String,
    /// Chunk text.
    pub content: String,
    /// Structured metadata.
    pub meta: ChunkMeta,
    /// Cosine distance in [0, 2]; relevance is `1 - distance` clamped.
    pub distance: f32,
}

impl ScoredChunk {
    /// Relevance score derived from distance, clamped to [0, 1].
    #[must_use]
    pub fn relevance(&self) -> f32 {
        (1.0 - self.distance).clamp(0.0, 1.0)
    }
}

/// Nearest-neighbor search capability with server-side filtering.
pub trait VectorIndex: Send + Sync {
    /// Returns up to `k` chunks passing `filter`, sorted by ascending
    /// distance, ties broken by ascending `doc_id`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on underlying store failure.
    fn query(
        &self,
        embedding: &[f32],
        filter: &MetadataFilter,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, EngineError>;

    /// Fetches chunks by identifier, bypassing similarity scoring.
    /// Unknown identifiers are skipped; order follows the input.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on underlying store failure.
    fn get(&self, ids: &[String]) -> Result<Vec<IndexedChunk>, EngineError>;
}

/// In-memory exact-scoring index.
///
/// The corpus is small (~1.7k chunks); filtering first and scoring the
/// survivors exactly is cheaper and more predictable than approximate
/// search, and keeps tie-breaking fully deterministic.
#[derive(Debug, Default)]
pub struct MemoryVectorIndex {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    chunks: Vec<IndexedChunk>,
    by_id: HashMap<String, usize>,
}

impl MemoryVectorIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from catalog-loaded chunks. Chunks without an
    /// embedding are skipped.
    #[must_use]
    pub fn from_chunks(chunks: Vec<StoredChunk>) -> Self {
        let index = Self::new();
        for chunk in chunks {
            if !chunk.embedding.is_empty() {
                index.insert(chunk.into());
            }
        }
        index
    }

    /// Inserts or replaces a chunk.
    pub fn insert(&self, chunk: IndexedChunk) {
        if let Ok(mut inner) = self.inner.write() {
            if let Some(&pos) = inner.by_id.get(&chunk.doc_id) {
                inner.chunks[pos] = chunk;
            } else {
                let pos = inner.chunks.len();
                inner.by_id.insert(chunk.doc_id.clone(), pos);
                inner.chunks.push(chunk);
            }
        }
    }

    /// Number of indexed chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().map_or(0, |inner| inner.chunks.len())
    }

    /// Returns `true` when the index holds no chunks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        return 1.0;
    }
    1.0 - dot / denom
}

impl VectorIndex for MemoryVectorIndex {
    fn query(
        &self,
        embedding: &[f32],
        filter: &MetadataFilter,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, EngineError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EngineError::Storage(rusqlite::Error::InvalidQuery))?;

        let mut scored: Vec<ScoredChunk> = inner
            .chunks
            .iter()
            .filter(|c| filter.matches(&c.meta))
            .map(|c| ScoredChunk {
                doc_id: c.doc_id.clone(),
                content: c.content.clone(),
                meta: c.meta.clone(),
                distance: cosine_distance(embedding, &c.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    fn get(&self, ids: &[String]) -> Result<Vec<IndexedChunk>, EngineError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EngineError::Storage(rusqlite::Error::InvalidQuery))?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.by_id.get(id).map(|&pos| inner.chunks[pos].clone()))
            .collect())
    }
}
