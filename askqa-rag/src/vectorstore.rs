//! Vector store trait for named collections of embedded chunks.

use async_trait::async_trait;

use crate::document::{EmbeddedChunk, SearchResult};
use crate::error::Result;

/// A storage backend for embedded chunks with similarity search.
///
/// Collections keep chunks in insertion order; search ties are broken by that
/// order, so results are deterministic for a fixed collection state.
///
/// # Example
///
/// ```rust,ignore
/// use askqa_rag::{VectorStore, InMemoryVectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("qa", 384).await?;
/// store.add("qa", &chunks).await?;
/// let results = store.search("qa", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Names of all existing collections.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a named collection and all its data. No-op if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Append chunks to a collection. Every embedding must match the
    /// collection's dimensionality.
    async fn add(&self, collection: &str, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Number of chunks stored in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Search for the `top_k` chunks with the highest inner product against
    /// `embedding`.
    ///
    /// Returns results ordered by descending similarity score.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Whether a collection with this name exists.
    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self.list_collections().await?.iter().any(|c| c == name))
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Score every chunk against `query` and keep the best `top_k`.
///
/// Embeddings are assumed to be unit length, so the inner product is the
/// cosine similarity. The sort is stable: equal scores keep insertion order.
pub fn rank_chunks(chunks: &[EmbeddedChunk], query: &[f32], top_k: usize) -> Vec<SearchResult> {
    let mut scored: Vec<(usize, f32)> =
        chunks.iter().enumerate().map(|(i, c)| (i, dot(&c.embedding, query))).collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    scored
        .into_iter()
        .map(|(i, score)| SearchResult { chunk: chunks[i].record.clone(), score })
        .collect()
}
