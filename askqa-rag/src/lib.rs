//! Retrieval-augmented question answering over a corpus of prior Q&A records.
//!
//! The crate covers two pipelines:
//!
//! - **Ingestion**: source files are parsed into [`SourceRecord`]s, deduplicated
//!   and split into word windows by the [`DeduplicatingChunker`], embedded through a
//!   [`NormalizedEmbedder`] and written to a [`VectorStore`] by the [`IndexBuilder`].
//! - **Query**: the [`RateLimiter`] gates each request, the [`Retriever`] embeds the
//!   query and searches the collection, and the [`GenerationStreamer`] streams a
//!   grounded answer back as an [`AnswerStream`].
//!
//! External models are reached through the [`EmbeddingProvider`] and
//! [`GenerationProvider`] traits so each one can be swapped or faked in tests.

pub mod builder;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filestore;
pub mod generation;
pub mod inmemory;
pub mod pipeline;
pub mod ratelimit;
pub mod retrieval;
pub mod source;
pub mod vectorstore;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;

pub use builder::{BuildReport, IndexBuilder, collect_chunks};
pub use chunking::{ChunkSet, DeduplicatingChunker, normalize_question, split_into_windows};
pub use config::{Settings, SettingsBuilder};
pub use document::{ChunkMetadata, ChunkRecord, EmbeddedChunk, SearchResult, SourceRecord};
pub use embedding::{EmbeddingProvider, NormalizedEmbedder, l2_normalize};
pub use error::{RagError, Result};
pub use filestore::FileVectorStore;
pub use generation::{AnswerStream, FragmentStream, GenerationProvider, GenerationStreamer};
pub use inmemory::InMemoryVectorStore;
pub use pipeline::{AnswerPipeline, AnswerPipelineBuilder};
pub use ratelimit::{RateDecision, RateLimiter};
pub use retrieval::{Retriever, build_context, build_prompt};
pub use vectorstore::VectorStore;
