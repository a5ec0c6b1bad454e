//! File-backed vector store.
//!
//! Each collection lives in `<root>/<name>.json`. Writes go to a hidden temp
//! file that is renamed over the target, so a reader sees either the previous
//! or the new collection, never a partial one. Loaded collections are cached
//! as immutable snapshots; searches score a snapshot on the blocking pool
//! without holding any lock.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::document::{EmbeddedChunk, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, rank_chunks};

const BACKEND: &str = "File";
const EXTENSION: &str = "json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCollection {
    name: String,
    dimensions: usize,
    chunks: Vec<EmbeddedChunk>,
}

/// A vector store persisting each collection as one JSON document.
#[derive(Debug)]
pub struct FileVectorStore {
    root: PathBuf,
    cache: RwLock<HashMap<String, Arc<StoredCollection>>>,
    write_lock: Mutex<()>,
}

fn store_error(message: impl Into<String>) -> RagError {
    RagError::VectorStoreError { backend: BACKEND.to_string(), message: message.into() }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid { Ok(()) } else { Err(store_error(format!("invalid collection name '{name}'"))) }
}

impl FileVectorStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, cache: RwLock::new(HashMap::new()), write_lock: Mutex::new(()) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{EXTENSION}"))
    }

    async fn load(&self, name: &str) -> Result<Option<Arc<StoredCollection>>> {
        validate_name(name)?;
        if let Some(cached) = self.cache.read().await.get(name) {
            return Ok(Some(Arc::clone(cached)));
        }

        let bytes = match tokio::fs::read(self.path_for(name)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let collection: StoredCollection = serde_json::from_slice(&bytes)
            .map_err(|e| store_error(format!("corrupt collection '{name}': {e}")))?;
        debug!(collection = name, chunk_count = collection.chunks.len(), "loaded collection");

        let collection = Arc::new(collection);
        self.cache.write().await.insert(name.to_string(), Arc::clone(&collection));
        Ok(Some(collection))
    }

    async fn load_existing(&self, name: &str) -> Result<Arc<StoredCollection>> {
        self.load(name)
            .await?
            .ok_or_else(|| store_error(format!("collection '{name}' does not exist")))
    }

    async fn persist(&self, collection: StoredCollection) -> Result<()> {
        let target = self.path_for(&collection.name);
        let temp = self.root.join(format!(".{}.{EXTENSION}.tmp", collection.name));
        let bytes = serde_json::to_vec(&collection)?;
        tokio::fs::write(&temp, bytes).await?;
        tokio::fs::rename(&temp, &target).await?;

        let name = collection.name.clone();
        self.cache.write().await.insert(name, Arc::new(collection));
        Ok(())
    }
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.load(name).await?.is_some() {
            return Ok(());
        }
        self.persist(StoredCollection { name: name.to_string(), dimensions, chunks: Vec::new() })
            .await?;
        info!(collection = name, dimensions, "created collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let _guard = self.write_lock.lock().await;
        self.cache.write().await.remove(name);
        match tokio::fs::remove_file(self.path_for(name)).await {
            Ok(()) => {
                info!(collection = name, "deleted collection");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn add(&self, collection: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let existing = self.load_existing(collection).await?;
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != existing.dimensions) {
            return Err(store_error(format!(
                "expected {}-dimensional embedding, got {}",
                existing.dimensions,
                bad.embedding.len()
            )));
        }

        let mut updated = StoredCollection::clone(&existing);
        updated.chunks.extend_from_slice(chunks);
        self.persist(updated).await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        Ok(self.load_existing(collection).await?.chunks.len())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let snapshot = self.load_existing(collection).await?;
        if embedding.len() != snapshot.dimensions {
            return Err(store_error(format!(
                "expected {}-dimensional query, got {}",
                snapshot.dimensions,
                embedding.len()
            )));
        }

        let query = embedding.to_vec();
        tokio::task::spawn_blocking(move || rank_chunks(&snapshot.chunks, &query, top_k))
            .await
            .map_err(|e| RagError::PipelineError(format!("search task failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ChunkMetadata, ChunkRecord};

    fn chunk(id: &str, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            record: ChunkRecord {
                id: id.into(),
                text: format!("Question: {id}\nAnswer: x"),
                metadata: ChunkMetadata { source: "test.json".into() },
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn collections_survive_reopen() {
        let temp = tempfile::tempdir().unwrap();
        {
            let store = FileVectorStore::open(temp.path()).unwrap();
            store.create_collection("qa", 2).await.unwrap();
            store.add("qa", &[chunk("id_0", vec![1.0, 0.0]), chunk("id_1", vec![0.0, 1.0])])
                .await
                .unwrap();
        }

        let reopened = FileVectorStore::open(temp.path()).unwrap();
        assert_eq!(reopened.list_collections().await.unwrap(), vec!["qa".to_string()]);
        assert_eq!(reopened.count("qa").await.unwrap(), 2);
        let results = reopened.search("qa", &[0.0, 1.0], 1).await.unwrap();
        assert_eq!(results[0].chunk.id, "id_1");
    }

    #[tokio::test]
    async fn delete_removes_file_and_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(temp.path()).unwrap();
        store.create_collection("qa", 1).await.unwrap();
        assert!(temp.path().join("qa.json").exists());

        store.delete_collection("qa").await.unwrap();
        store.delete_collection("qa").await.unwrap();
        assert!(!temp.path().join("qa.json").exists());
        assert!(store.count("qa").await.is_err());
    }

    #[tokio::test]
    async fn rejects_wrong_dimensions_and_bad_names() {
        let temp = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(temp.path()).unwrap();
        store.create_collection("qa", 2).await.unwrap();
        assert!(store.add("qa", &[chunk("id_0", vec![1.0])]).await.is_err());
        assert!(store.search("qa", &[1.0, 0.0, 0.0], 3).await.is_err());
        assert!(store.create_collection("../escape", 2).await.is_err());
    }
}
