//! Query embedding, nearest-neighbor search, and grounded prompt assembly.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::document::SearchResult;
use crate::embedding::NormalizedEmbedder;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Retrieves the chunks most similar to a query from one collection.
///
/// Queries are embedded with the same [`NormalizedEmbedder`] type the index
/// builder uses, so stored and query vectors are normalized identically.
#[derive(Clone)]
pub struct Retriever {
    embedder: NormalizedEmbedder,
    store: Arc<dyn VectorStore>,
    collection: String,
    top_k: usize,
}

impl Retriever {
    /// Create a retriever without checking the collection.
    pub fn new(
        embedder: NormalizedEmbedder,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        top_k: usize,
    ) -> Self {
        Self { embedder, store, collection: collection.into(), top_k }
    }

    /// Create a retriever over an existing, non-empty collection.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CollectionUnavailable`] when the collection is
    /// missing, empty, or cannot be read. Serving must not start in that case.
    pub async fn connect(
        embedder: NormalizedEmbedder,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        top_k: usize,
    ) -> Result<Self> {
        let retriever = Self::new(embedder, store, collection, top_k);
        let name = retriever.collection.clone();
        let unavailable = |reason: String| {
            error!(collection = %name, %reason, "collection unavailable");
            RagError::CollectionUnavailable { name: name.clone(), reason }
        };

        let exists = retriever.store.has_collection(&name).await.map_err(|e| unavailable(e.to_string()))?;
        if !exists {
            return Err(unavailable("collection does not exist; run build-db first".to_string()));
        }
        let count = retriever.collection_size().await.map_err(|e| unavailable(e.to_string()))?;
        if count == 0 {
            return Err(unavailable("collection is empty".to_string()));
        }

        info!(collection = %name, chunk_count = count, "connected to collection");
        Ok(retriever)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Number of chunks in the served collection.
    pub async fn collection_size(&self) -> Result<usize> {
        self.store.count(&self.collection).await
    }

    /// Embed `query` and return up to `top_k` chunks by descending similarity.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        let embedding = self.embedder.embed(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e
        })?;

        let results = self
            .store
            .search(&self.collection, &embedding, self.top_k)
            .await
            .map_err(|e| {
                error!(collection = %self.collection, error = %e, "vector store search failed");
                e
            })?;

        debug!(result_count = results.len(), "retrieved context");
        Ok(results)
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("embedder", &self.embedder)
            .field("collection", &self.collection)
            .field("top_k", &self.top_k)
            .finish()
    }
}

/// Join retrieved chunks into a context block, keeping each chunk's source.
pub fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| format!("Source: {}\n{}", r.chunk.metadata.source, r.chunk.text))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Build the final prompt: instructions, retrieved context, then the question.
pub fn build_prompt(query: &str, results: &[SearchResult]) -> String {
    format!(
        "You are a knowledgeable assistant answering questions from a curated Q&A archive.\n\
         Answer the user's question using ONLY the context below. Do not use outside \
         knowledge. If the context does not contain the answer, say that you could not \
         find an answer in the available sources. Cite the sources you relied on.\n\n\
         CONTEXT:\n{context}\n\n\
         QUESTION: {query}\n\n\
         ANSWER:",
        context = build_context(results),
        query = query.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ChunkMetadata, ChunkRecord};

    fn result(id: &str, source: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk: ChunkRecord {
                id: id.into(),
                text: format!("Question: {id}?\nAnswer: because"),
                metadata: ChunkMetadata { source: source.into() },
            },
            score,
        }
    }

    #[test]
    fn context_keeps_order_and_sources() {
        let context = build_context(&[result("a", "https://x/a", 0.9), result("b", "b.json", 0.5)]);
        let a = context.find("Source: https://x/a").unwrap();
        let b = context.find("Source: b.json").unwrap();
        assert!(a < b);
        assert!(context.contains(CONTEXT_SEPARATOR));
    }

    struct Constant;

    #[async_trait::async_trait]
    impl crate::embedding::EmbeddingProvider for Constant {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![3.0, 4.0])
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn connect_refuses_missing_or_empty_collection() {
        let store = Arc::new(crate::inmemory::InMemoryVectorStore::new());
        let embedder = NormalizedEmbedder::new(Arc::new(Constant));

        let err = Retriever::connect(embedder.clone(), store.clone(), "qa", 5).await.unwrap_err();
        assert!(matches!(err, RagError::CollectionUnavailable { .. }));

        store.create_collection("qa", 2).await.unwrap();
        let err = Retriever::connect(embedder.clone(), store.clone(), "qa", 5).await.unwrap_err();
        assert!(err.to_string().contains("empty"));

        store
            .add(
                "qa",
                &[crate::document::EmbeddedChunk {
                    record: result("id_0", "s", 0.0).chunk,
                    embedding: vec![0.6, 0.8],
                }],
            )
            .await
            .unwrap();
        let retriever = Retriever::connect(embedder, store, "qa", 5).await.unwrap();
        let hits = retriever.retrieve("anything").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn prompt_restricts_answer_to_context() {
        let prompt = build_prompt("  What is Zakat? ", &[result("a", "s", 1.0)]);
        assert!(prompt.contains("ONLY the context"));
        assert!(prompt.contains("QUESTION: What is Zakat?\n"));
        assert!(prompt.contains("Question: a?\nAnswer: because"));
    }
}
