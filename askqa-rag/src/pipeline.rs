//! Query-time orchestration: retrieve context, build the prompt, stream the answer.
//!
//! # Example
//!
//! ```rust,ignore
//! use askqa_rag::{AnswerPipeline, GenerationStreamer, Retriever};
//!
//! let pipeline = AnswerPipeline::builder()
//!     .retriever(Retriever::connect(embedder, store, "qa", 5).await?)
//!     .streamer(GenerationStreamer::new(Arc::new(gemini)))
//!     .build()?;
//!
//! let mut answer = pipeline.answer("What is Zakat?").await?;
//! while let Some(fragment) = answer.next().await {
//!     print!("{fragment}");
//! }
//! ```

use tracing::{debug, info};

use crate::error::{RagError, Result};
use crate::generation::{AnswerStream, GenerationStreamer};
use crate::retrieval::{Retriever, build_prompt};

/// Answers questions from the indexed collection.
///
/// Construct one via [`AnswerPipeline::builder()`].
#[derive(Debug, Clone)]
pub struct AnswerPipeline {
    retriever: Retriever,
    streamer: GenerationStreamer,
}

impl AnswerPipeline {
    /// Create a new [`AnswerPipelineBuilder`].
    pub fn builder() -> AnswerPipelineBuilder {
        AnswerPipelineBuilder::default()
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn streamer(&self) -> &GenerationStreamer {
        &self.streamer
    }

    /// Retrieve context for `query` and start streaming a grounded answer.
    ///
    /// # Errors
    ///
    /// Retrieval failures are returned before any fragment is produced.
    /// Generation failures arrive as the final fragment of the stream.
    pub async fn answer(&self, query: &str) -> Result<AnswerStream> {
        let results = self.retriever.retrieve(query).await?;
        let prompt = build_prompt(query, &results);
        debug!(prompt_len = prompt.len(), "prompt assembled");
        info!(
            result_count = results.len(),
            model = self.streamer.provider_name(),
            "streaming answer"
        );
        Ok(self.streamer.stream(prompt))
    }
}

/// Builder for constructing an [`AnswerPipeline`].
///
/// Both fields are required.
#[derive(Debug, Default)]
pub struct AnswerPipelineBuilder {
    retriever: Option<Retriever>,
    streamer: Option<GenerationStreamer>,
}

impl AnswerPipelineBuilder {
    pub fn retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn streamer(mut self, streamer: GenerationStreamer) -> Self {
        self.streamer = Some(streamer);
        self
    }

    /// Build the [`AnswerPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing.
    pub fn build(self) -> Result<AnswerPipeline> {
        let retriever =
            self.retriever.ok_or_else(|| RagError::ConfigError("retriever is required".to_string()))?;
        let streamer =
            self.streamer.ok_or_else(|| RagError::ConfigError("streamer is required".to_string()))?;
        Ok(AnswerPipeline { retriever, streamer })
    }
}
