//! Offline index construction: scan sources, chunk, embed, replace the collection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::chunking::{ChunkSet, DeduplicatingChunker};
use crate::config::Settings;
use crate::document::{ChunkRecord, EmbeddedChunk};
use crate::embedding::NormalizedEmbedder;
use crate::error::{RagError, Result};
use crate::source::{discover_source_files, read_source_file, source_id};
use crate::vectorstore::VectorStore;

const EMBED_BATCH_SIZE: usize = 64;

/// Counts reported by a successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    /// Chunks written to the collection.
    pub chunks: usize,
    /// Distinct questions that produced those chunks.
    pub questions: usize,
}

/// Scan `data_dir` and chunk every readable source file.
///
/// Files are visited in sorted path order. A file that cannot be read or
/// parsed is logged and skipped.
pub fn collect_chunks(data_dir: &Path, chunk_size: usize) -> Result<ChunkSet> {
    let files = discover_source_files(data_dir)?;
    if files.is_empty() {
        warn!(data_dir = %data_dir.display(), "no .json source files found");
    }

    let mut chunker = DeduplicatingChunker::new(chunk_size);
    for path in &files {
        let records = match read_source_file(path) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "skipping source file");
                continue;
            }
        };
        let added = chunker.push_records(&source_id(path), &records);
        info!(file = %path.display(), records = records.len(), chunks = added, "processed source file");
    }

    Ok(chunker.finish())
}

/// Builds the served collection from the configured data directory.
///
/// # Example
///
/// ```rust,ignore
/// let builder = IndexBuilder::new(&settings, embedder, Arc::new(FileVectorStore::open(&settings.persist_dir)?));
/// let report = builder.run().await?;
/// println!("{} chunks from {} questions", report.chunks, report.questions);
/// ```
pub struct IndexBuilder {
    embedder: NormalizedEmbedder,
    store: Arc<dyn VectorStore>,
    collection: String,
    data_dir: PathBuf,
    chunk_size: usize,
}

impl IndexBuilder {
    pub fn new(settings: &Settings, embedder: NormalizedEmbedder, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            collection: settings.collection_name.clone(),
            data_dir: settings.data_dir.clone(),
            chunk_size: settings.chunk_size_words,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Ingest all source files and replace the collection with the result.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyIngestion`] without touching the store when no
    /// chunk was produced, and propagates embedding and store failures.
    pub async fn run(&self) -> Result<BuildReport> {
        let data_dir = self.data_dir.clone();
        let chunk_size = self.chunk_size;
        let chunk_set = tokio::task::spawn_blocking(move || collect_chunks(&data_dir, chunk_size))
            .await
            .map_err(|e| RagError::PipelineError(format!("ingestion task failed: {e}")))??;

        if chunk_set.is_empty() {
            error!(data_dir = %self.data_dir.display(), "no valid data chunks were created");
            return Err(RagError::EmptyIngestion);
        }

        let chunks = self.write_collection(&chunk_set.chunks).await?;
        let report = BuildReport { chunks, questions: chunk_set.questions.len() };
        info!(
            collection = %self.collection,
            chunk_count = report.chunks,
            question_count = report.questions,
            "built collection"
        );
        Ok(report)
    }

    /// Embed `chunks` and replace the collection with them.
    ///
    /// All embeddings are computed before the existing collection is deleted,
    /// so an embedding failure leaves the previous collection in place.
    pub async fn write_collection(&self, chunks: &[ChunkRecord]) -> Result<usize> {
        if chunks.is_empty() {
            return Err(RagError::EmptyIngestion);
        }

        let mut embedded = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = self.embedder.embed_batch(&texts).await.map_err(|e| {
                error!(error = %e, "embedding failed during build");
                e
            })?;
            embedded.extend(
                batch
                    .iter()
                    .zip(vectors)
                    .map(|(record, embedding)| EmbeddedChunk { record: record.clone(), embedding }),
            );
            info!(embedded = embedded.len(), total = chunks.len(), "embedding progress");
        }

        let dimensions = embedded.first().map(|c| c.embedding.len()).unwrap_or_default();

        if self.store.has_collection(&self.collection).await? {
            info!(collection = %self.collection, "deleting existing collection");
            self.store.delete_collection(&self.collection).await?;
        }
        self.store.create_collection(&self.collection, dimensions).await?;
        self.store.add(&self.collection, &embedded).await?;

        self.store.count(&self.collection).await
    }
}

impl std::fmt::Debug for IndexBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("embedder", &self.embedder)
            .field("collection", &self.collection)
            .field("data_dir", &self.data_dir)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}
