//! Error types for the `askqa-rag` crate.

use thiserror::Error;

/// Errors that can occur while ingesting, indexing, retrieving or generating.
#[derive(Debug, Error)]
pub enum RagError {
    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The generative model failed to start or continue a response.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A single source file could not be read or parsed.
    ///
    /// The index builder logs and skips these; they never abort a build.
    #[error("Failed to ingest '{path}': {message}")]
    IngestError {
        /// The offending source file.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// Ingestion finished without producing a single chunk.
    #[error("No valid data chunks were created from source files")]
    EmptyIngestion,

    /// The configured collection is missing or empty at startup.
    #[error("Collection '{name}' is unavailable: {reason}")]
    CollectionUnavailable {
        /// The configured collection name.
        name: String,
        /// Why the collection cannot be served.
        reason: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in pipeline orchestration (task failures, mismatched batches).
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
