//! Process configuration.
//!
//! A single [`Settings`] value is built once at startup (usually with
//! [`Settings::from_env`]) and passed to every component's constructor.
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `GEMINI_API_KEY` | `gemini_api_key` | none (required to serve) |
//! | `GEMINI_MODEL_NAME` | `generation_model` | `gemini-1.5-flash-latest` |
//! | `EMBEDDING_MODEL_NAME` | `embedding_model` | `all-MiniLM-L6-v2` |
//! | `EMBEDDING_BASE_URL` | `embedding_base_url` | `http://127.0.0.1:8080/v1` |
//! | `EMBEDDING_API_KEY` | `embedding_api_key` | none |
//! | `DATA_DIR` | `data_dir` | `data` |
//! | `CHROMA_PERSIST_DIR` | `persist_dir` | `chroma_db_store` |
//! | `COLLECTION_NAME` | `collection_name` | `islamqa_collection_v1` |
//! | `N_RESULTS_RETRIEVAL` | `top_k` | 5 |
//! | `CHUNK_SIZE_WORDS` | `chunk_size_words` | 300 |
//! | `RATE_LIMIT_REQUESTS` | `rate_limit_requests` | 20 |
//! | `RATE_LIMIT_TIMEFRAME_SECONDS` | `rate_limit_window_secs` | 60 |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Every recognized configuration option.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// API key for the generative model.
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
    /// Generative model identifier.
    pub generation_model: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Base URL of the OpenAI-compatible embeddings endpoint.
    pub embedding_base_url: String,
    /// Optional bearer token for the embeddings endpoint.
    #[serde(skip_serializing)]
    pub embedding_api_key: Option<String>,
    /// Directory scanned for `.json` source files.
    pub data_dir: PathBuf,
    /// Directory holding persisted collections.
    pub persist_dir: PathBuf,
    /// Name of the collection to build and serve.
    pub collection_name: String,
    /// Results retrieved per query.
    pub top_k: usize,
    /// Words per answer chunk.
    pub chunk_size_words: usize,
    /// Requests admitted per client per window.
    pub rate_limit_requests: usize,
    /// Rate-limit window length in seconds.
    pub rate_limit_window_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            generation_model: "gemini-1.5-flash-latest".to_string(),
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_base_url: "http://127.0.0.1:8080/v1".to_string(),
            embedding_api_key: None,
            data_dir: PathBuf::from("data"),
            persist_dir: PathBuf::from("chroma_db_store"),
            collection_name: "islamqa_collection_v1".to_string(),
            top_k: 5,
            chunk_size_words: 300,
            rate_limit_requests: 20,
            rate_limit_window_secs: 60,
        }
    }
}

impl Settings {
    /// Create a new builder for constructing [`Settings`].
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    ///
    /// Unset or blank variables fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Settings::default();

        let mut builder = Settings::builder();
        builder.config.gemini_api_key = get("GEMINI_API_KEY");
        builder.config.embedding_api_key = get("EMBEDDING_API_KEY");
        if let Some(v) = get("GEMINI_MODEL_NAME") {
            builder = builder.generation_model(v);
        }
        if let Some(v) = get("EMBEDDING_MODEL_NAME") {
            builder = builder.embedding_model(v);
        }
        if let Some(v) = get("EMBEDDING_BASE_URL") {
            builder = builder.embedding_base_url(v);
        }
        if let Some(v) = get("DATA_DIR") {
            builder = builder.data_dir(v);
        }
        if let Some(v) = get("CHROMA_PERSIST_DIR") {
            builder = builder.persist_dir(v);
        }
        if let Some(v) = get("COLLECTION_NAME") {
            builder = builder.collection_name(v);
        }

        builder = builder
            .top_k(parse_var(&get, "N_RESULTS_RETRIEVAL", defaults.top_k)?)
            .chunk_size_words(parse_var(&get, "CHUNK_SIZE_WORDS", defaults.chunk_size_words)?)
            .rate_limit(
                parse_var(&get, "RATE_LIMIT_REQUESTS", defaults.rate_limit_requests)?,
                parse_var(&get, "RATE_LIMIT_TIMEFRAME_SECONDS", defaults.rate_limit_window_secs)?,
            );

        builder.build()
    }

    /// The rate-limit window as a [`Duration`].
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// The generation API key, which only the serving path needs.
    pub fn require_gemini_api_key(&self) -> Result<&str> {
        self.gemini_api_key
            .as_deref()
            .ok_or_else(|| RagError::ConfigError("GEMINI_API_KEY is not set".to_string()))
    }
}

fn parse_var<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| RagError::ConfigError(format!("{key}={raw:?} is not valid: {e}"))),
    }
}

/// Builder for constructing validated [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    config: Settings,
}

impl SettingsBuilder {
    pub fn gemini_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.gemini_api_key = Some(key.into());
        self
    }

    pub fn generation_model(mut self, model: impl Into<String>) -> Self {
        self.config.generation_model = model.into();
        self
    }

    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = model.into();
        self
    }

    pub fn embedding_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.embedding_base_url = url.into();
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.persist_dir = dir.into();
        self
    }

    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.config.collection_name = name.into();
        self
    }

    /// Set the number of results retrieved per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the chunk size in words.
    pub fn chunk_size_words(mut self, words: usize) -> Self {
        self.config.chunk_size_words = words;
        self
    }

    /// Admit `requests` per client within each `window_secs` window.
    pub fn rate_limit(mut self, requests: usize, window_secs: u64) -> Self {
        self.config.rate_limit_requests = requests;
        self.config.rate_limit_window_secs = window_secs;
        self
    }

    /// Build the [`Settings`], validating that parameters are usable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any count or window is zero or the
    /// collection name is blank.
    pub fn build(self) -> Result<Settings> {
        let c = &self.config;
        if c.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if c.chunk_size_words == 0 {
            return Err(RagError::ConfigError(
                "chunk_size_words must be greater than zero".to_string(),
            ));
        }
        if c.rate_limit_requests == 0 || c.rate_limit_window_secs == 0 {
            return Err(RagError::ConfigError(
                "rate limit requests and window must be greater than zero".to_string(),
            ));
        }
        if c.collection_name.trim().is_empty() {
            return Err(RagError::ConfigError("collection_name must not be empty".to_string()));
        }
        Ok(self.config)
    }
}
