//! Data types for source records, chunks, and search results.

use serde::{Deserialize, Serialize};

/// One question/answer pair as read from a source file.
///
/// Either text field may be absent in malformed input; such records are
/// skipped by the chunker rather than rejected at parse time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRecord {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl SourceRecord {
    /// Create a record with all three fields present.
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        url: Option<String>,
    ) -> Self {
        Self { question: Some(question.into()), answer: Some(answer.into()), url }
    }
}

/// Attribution carried alongside every chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// The record's url, or the source file name when the record has none.
    pub source: String,
}

/// A retrievable unit: a question header plus one window of its answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Sequential id (`id_0`, `id_1`, ...) assigned in chunk order.
    pub id: String,
    /// `"Question: <question>\nAnswer: <window>"`.
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A [`ChunkRecord`] paired with its unit-length embedding, as stored in a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedChunk {
    #[serde(flatten)]
    pub record: ChunkRecord,
    pub embedding: Vec<f32>,
}

/// A retrieved [`ChunkRecord`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: ChunkRecord,
    /// Inner product with the query vector (cosine similarity for unit vectors).
    pub score: f32,
}
