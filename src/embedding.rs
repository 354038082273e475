//! Text embedding capability.
//!
//! The engine needs a fixed-dimension embedding of each legal chunk
//! and of incoming queries. Two implementations:
//!
//! - [`HashEmbedder`] (always available): deterministic character
//!   n-gram hashing into a fixed-dimension vector, L2-normalized.
//!   No model download, fully reproducible, good enough for tests and
//!   offline operation.
//! - `FastEmbedder` (behind the `fastembed-embeddings` feature):
//!   ONNX multilingual-E5 embeddings via `fastembed`.
//!
//! Both are thread-safe; encoding is CPU-bound and does not suspend.

use crate::error::EngineError;

/// Embedding dimension shared by both implementations.
pub const EMBEDDING_DIM: usize = 1024;

/// Capability trait for text embedding.
pub trait Embedder: Send + Sync {
    /// Fixed output dimension.
    fn dimension(&self) -> usize;

    /// Encodes text into a normalized embedding vector.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Embedding`] when the underlying model
    /// fails. The hash embedder never fails.
    fn encode(&self, text: &str) -> Result<Vec<f32>, EngineError>;
}

/// Deterministic n-gram hash embedder.
///
/// Hashes character bigrams and trigrams (FNV-1a) into buckets and
/// L2-normalizes the result. Cosine similarity then approximates
/// surface-level lexical overlap, which is deterministic across runs
/// and platforms.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimension: EMBEDDING_DIM,
        }
    }
}

impl HashEmbedder {
    /// Creates an embedder with the standard dimension.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an embedder with a custom dimension (tests).
    #[must_use]
    pub const fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    fn fnv1a(bytes: &[u8]) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut hash = OFFSET;
        for &b in bytes {
            hash ^= u64::from(b);
            hash = hash.wrapping_mul(PRIME);
        }
        hash
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        let mut vector = vec![0.0_f32; self.dimension];
        let chars: Vec<char> = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();

        for window in [2_usize, 3] {
            if chars.len() < window {
                continue;
            }
            for gram in chars.windows(window) {
                let token: String = gram.iter().collect();
                let hash = Self::fnv1a(token.as_bytes());
                let bucket = usize::try_from(hash % self.dimension as u64).unwrap_or(0);
                // Sign bit from a second hash fold keeps buckets from
                // accumulating strictly positive mass.
                let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
                vector[bucket] += sign;
            }
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// ONNX embedder backed by `fastembed` (multilingual E5, 1024 dims).
#[cfg(feature = "fastembed-embeddings")]
pub struct FastEmbedder {
    model: std::sync::Mutex<fastembed::TextEmbedding>,
}

#[cfg(feature = "fastembed-embeddings")]
impl FastEmbedder {
    /// Initializes the ONNX model, downloading it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Embedding`] when model initialization fails.
    pub fn new() -> Result<Self, EngineError> {
        let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::MultilingualE5Large);
        let model = fastembed::TextEmbedding::try_new(options).map_err(|e| {
            EngineError::Embedding {
                message: format!("fastembed init failed: {e}"),
            }
        })?;
        Ok(Self {
            model: std::sync::Mutex::new(model),
        })
    }
}

#[cfg(feature = "fastembed-embeddings")]
impl Embedder for FastEmbedder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        let mut model = self.model.lock().map_err(|_| EngineError::Embedding {
            message: "embedder lock poisoned".to_string(),
        })?;
        let mut batches =
            model
                .embed(vec![text.to_string()], None)
                .map_err(|e| EngineError::Embedding {
                    message: format!("fastembed encode failed: {e}"),
                })?;
        batches.pop().ok_or_else(|| EngineError::Embedding {
            message: "fastembed returned no embedding".to_string(),
        })
    }
}

/// Creates the default embedder for this build.
///
/// With `fastembed-embeddings` enabled this is the ONNX model;
/// otherwise the deterministic hash embedder.
///
/// # Errors
///
/// Returns [`EngineError::Embedding`] when model initialization fails.
pub fn create_embedder() -> Result<Box<dyn Embedder>, EngineError> {
    #[cfg(feature = "fastembed-embeddings")]
    {
        Ok(Box::new(FastEmbedder::new()?))
    }
    #[cfg(not(feature = "fastembed-embeddings"))]
    {
        Ok(Box::new(HashEmbedder::new()))
    }
}
