//! Embedding provider trait and the shared normalization wrapper.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A short name used in logs and errors.
    fn name(&self) -> &str {
        "embedding"
    }
}

/// Scale `vector` to unit Euclidean length.
///
/// # Errors
///
/// Returns [`RagError::EmbeddingError`] for empty, zero, or non-finite vectors,
/// none of which can take part in cosine similarity.
pub fn l2_normalize(mut vector: Vec<f32>) -> Result<Vec<f32>> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if vector.is_empty() || !norm.is_finite() || norm == 0.0 {
        return Err(RagError::EmbeddingError {
            provider: "normalize".into(),
            message: format!("cannot normalize vector of length {} with norm {norm}", vector.len()),
        });
    }
    vector.iter_mut().for_each(|x| *x /= norm);
    Ok(vector)
}

/// The single embedding routine used for both indexing and querying.
///
/// Every vector leaving this wrapper has unit length, so inner-product search
/// over stored chunks is cosine similarity regardless of what the underlying
/// provider returns.
#[derive(Clone)]
pub struct NormalizedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
}

impl NormalizedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>) -> Self {
        Self { inner }
    }

    /// Embed and normalize one text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        l2_normalize(self.inner.embed(text).await?)
    }

    /// Embed and normalize a batch, checking the provider returned one vector per text.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.inner.embed_batch(texts).await?;
        if vectors.len() != texts.len() {
            return Err(RagError::EmbeddingError {
                provider: self.inner.name().to_string(),
                message: format!("expected {} embeddings, got {}", texts.len(), vectors.len()),
            });
        }
        vectors.into_iter().map(l2_normalize).collect()
    }

    pub fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    pub fn provider_name(&self) -> &str {
        self.inner.name()
    }
}

impl std::fmt::Debug for NormalizedEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedEmbedder").field("provider", &self.inner.name()).finish()
    }
}
