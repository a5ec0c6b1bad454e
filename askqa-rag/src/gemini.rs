//! Gemini generation provider streaming over server-sent events.
//!
//! This module is only available when the `gemini` feature is enabled.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::config::Settings;
use crate::error::{RagError, Result};
use crate::generation::{FragmentStream, GenerationProvider};

const PROVIDER: &str = "Gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A [`GenerationProvider`] calling `models/{model}:streamGenerateContent`.
///
/// # Example
///
/// ```rust,ignore
/// use askqa_rag::gemini::GeminiGenerationProvider;
///
/// let provider = GeminiGenerationProvider::new(api_key, "gemini-1.5-flash-latest")?;
/// let mut fragments = provider.generate_stream("Say hello").await?;
/// ```
pub struct GeminiGenerationProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiGenerationProvider {
    /// Create a provider for `model`. A leading `models/` is accepted.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(generation_error("API key must not be empty".into()));
        }
        let model = model.into();
        let model = model.strip_prefix("models/").unwrap_or(&model).to_string();
        if model.is_empty() {
            return Err(generation_error("model must not be empty".into()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Create a provider from `GEMINI_API_KEY` and `GEMINI_MODEL_NAME`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.require_gemini_api_key()?, &settings.generation_model)
    }

    /// Point the client at another API root, e.g. a proxy or a test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn stream_url(&self) -> String {
        format!("{}/models/{}:streamGenerateContent?alt=sse", self.base_url, self.model)
    }
}

fn generation_error(message: String) -> RagError {
    RagError::GenerationError { provider: PROVIDER.into(), message }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerationResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

/// Extract the text carried by one streamed response event.
///
/// Returns an empty string for events without text, such as a final event
/// holding only usage metadata.
fn parse_chunk(data: &str) -> Result<String> {
    let response: GenerationResponse = serde_json::from_str(data)
        .map_err(|e| generation_error(format!("malformed stream event: {e}")))?;

    if let Some(err) = response.error {
        return Err(generation_error(err.message));
    }
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(generation_error(format!("prompt blocked: {reason}")));
    }

    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
        .unwrap_or_default();
    Ok(text)
}

#[async_trait]
impl GenerationProvider for GeminiGenerationProvider {
    fn name(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream> {
        let body = GenerateContentRequest {
            contents: [Content { role: "user", parts: [RequestPart { text: prompt }] }],
        };

        let response = self
            .client
            .post(self.stream_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                generation_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!(provider = PROVIDER, %status, "API error");
            return Err(generation_error(format!("API returned {status}: {detail}")));
        }

        debug!(provider = PROVIDER, "generation stream opened");
        let fragments = response.bytes_stream().eventsource().map(|event| match event {
            Ok(event) => parse_chunk(&event.data),
            Err(e) => Err(generation_error(format!("stream interrupted: {e}"))),
        });
        Ok(Box::pin(fragments))
    }
}
