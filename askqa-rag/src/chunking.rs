//! Question deduplication and fixed-size word-window chunking.
//!
//! The [`DeduplicatingChunker`] is fed one source file at a time and keeps the
//! set of question keys it has already accepted, so the first occurrence of a
//! question across the whole scan wins.

use std::collections::HashSet;

use crate::document::{ChunkMetadata, ChunkRecord, SourceRecord};

/// Produce the deduplication key for a question: trimmed, lowercased text.
pub fn normalize_question(question: &str) -> String {
    question.trim().to_lowercase()
}

/// Split `text` on whitespace and join consecutive runs of `window` words.
///
/// Windows never overlap; the last one may be shorter than `window`.
/// A `window` of zero is treated as one word per chunk.
pub fn split_into_windows(text: &str, window: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words.chunks(window.max(1)).map(|w| w.join(" ")).collect()
}

/// The output of a chunking pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkSet {
    /// Chunks in file-then-record-then-window order, ids already assigned.
    pub chunks: Vec<ChunkRecord>,
    /// Distinct question keys in first-seen order.
    pub questions: Vec<String>,
}

impl ChunkSet {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Splits source records into [`ChunkRecord`]s, dropping repeated questions.
///
/// # Example
///
/// ```rust,ignore
/// use askqa_rag::DeduplicatingChunker;
///
/// let mut chunker = DeduplicatingChunker::new(300);
/// chunker.push_records("fiqh.json", &records);
/// let chunk_set = chunker.finish();
/// ```
#[derive(Debug, Clone)]
pub struct DeduplicatingChunker {
    chunk_size: usize,
    seen: HashSet<String>,
    output: ChunkSet,
}

impl DeduplicatingChunker {
    /// Create a chunker producing windows of `chunk_size` words.
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size, seen: HashSet::new(), output: ChunkSet::default() }
    }

    /// Chunk the records of one source file.
    ///
    /// `source_id` identifies the file and is used as the chunk source when a
    /// record has no url. Returns the number of chunks added.
    pub fn push_records(&mut self, source_id: &str, records: &[SourceRecord]) -> usize {
        let before = self.output.chunks.len();
        for record in records {
            self.push_record(source_id, record);
        }
        self.output.chunks.len() - before
    }

    fn push_record(&mut self, source_id: &str, record: &SourceRecord) {
        let (Some(question), Some(answer)) = (record.question.as_deref(), record.answer.as_deref())
        else {
            return;
        };
        let question = question.trim();
        if question.is_empty() || answer.trim().is_empty() {
            return;
        }

        let key = normalize_question(question);
        if !self.seen.insert(key.clone()) {
            return;
        }
        self.output.questions.push(key);

        let source = match record.url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => source_id.to_string(),
        };

        for window in split_into_windows(answer, self.chunk_size) {
            let id = format!("id_{}", self.output.chunks.len());
            self.output.chunks.push(ChunkRecord {
                id,
                text: format!("Question: {question}\nAnswer: {window}"),
                metadata: ChunkMetadata { source: source.clone() },
            });
        }
    }

    /// Number of distinct questions accepted so far.
    pub fn question_count(&self) -> usize {
        self.output.questions.len()
    }

    /// Consume the chunker and return everything it produced.
    pub fn finish(self) -> ChunkSet {
        self.output
    }
}
