//! Streaming answer generation.
//!
//! A [`GenerationProvider`] turns a prompt into a stream of text fragments.
//! The [`GenerationStreamer`] runs that stream on its own task and hands the
//! caller an [`AnswerStream`] fed through a bounded channel. Dropping the
//! `AnswerStream` cancels the producer, which stops pulling from the backend
//! at its next suspension point.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::error::{RagError, Result};

/// A finite, non-restartable stream of generated text fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Marker written before the message of a terminal error fragment.
pub const ERROR_FRAGMENT_PREFIX: &str = "\n[ERROR] ";

const DEFAULT_BUFFER: usize = 16;

/// A generative model that streams its output.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// The model identifier, used in logs.
    fn name(&self) -> &str;

    /// Start generating a response to `prompt`.
    ///
    /// Errors before the first fragment are returned directly; errors after it
    /// arrive as `Err` items in the stream.
    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream>;
}

/// Text of the fragment emitted when generation fails.
pub fn error_fragment(err: &RagError) -> String {
    format!("{ERROR_FRAGMENT_PREFIX}{err}")
}

/// The consumer side of a streamed answer.
///
/// Yields plain text fragments and ends when the model finishes or after a
/// single error fragment.
#[derive(Debug)]
pub struct AnswerStream {
    rx: mpsc::Receiver<String>,
    _cancel_on_drop: DropGuard,
}

impl Stream for AnswerStream {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Runs generation off the request path and streams fragments to the caller.
#[derive(Clone)]
pub struct GenerationStreamer {
    provider: Arc<dyn GenerationProvider>,
    buffer: usize,
}

impl GenerationStreamer {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider, buffer: DEFAULT_BUFFER }
    }

    /// Set how many fragments may be produced ahead of the consumer.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Start generating an answer for `prompt`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn stream(&self, prompt: String) -> AnswerStream {
        let (tx, rx) = mpsc::channel(self.buffer);
        let token = CancellationToken::new();
        tokio::spawn(produce(Arc::clone(&self.provider), prompt, tx, token.clone()));
        AnswerStream { rx, _cancel_on_drop: token.drop_guard() }
    }
}

impl std::fmt::Debug for GenerationStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationStreamer")
            .field("provider", &self.provider.name())
            .field("buffer", &self.buffer)
            .finish()
    }
}

async fn produce(
    provider: Arc<dyn GenerationProvider>,
    prompt: String,
    tx: mpsc::Sender<String>,
    token: CancellationToken,
) {
    let started = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        started = provider.generate_stream(&prompt) => started,
    };

    let mut upstream = match started {
        Ok(stream) => stream,
        Err(e) => {
            warn!(provider = provider.name(), error = %e, "generation failed to start");
            let _ = tx.send(error_fragment(&e)).await;
            return;
        }
    };

    let mut fragments = 0usize;
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(provider = provider.name(), fragments, "answer stream dropped by consumer");
                return;
            }
            next = upstream.next() => next,
        };

        match next {
            Some(Ok(fragment)) => {
                if fragment.is_empty() {
                    continue;
                }
                fragments += 1;
                if tx.send(fragment).await.is_err() {
                    debug!(provider = provider.name(), fragments, "answer stream closed");
                    return;
                }
            }
            Some(Err(e)) => {
                warn!(provider = provider.name(), fragments, error = %e, "generation failed mid-stream");
                let _ = tx.send(error_fragment(&e)).await;
                return;
            }
            None => {
                debug!(provider = provider.name(), fragments, "generation completed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::stream;

    use super::*;

    struct Scripted {
        items: Vec<std::result::Result<&'static str, &'static str>>,
    }

    #[async_trait]
    impl GenerationProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate_stream(&self, _prompt: &str) -> Result<FragmentStream> {
            let items: Vec<Result<String>> = self
                .items
                .iter()
                .map(|item| match item {
                    Ok(text) => Ok(text.to_string()),
                    Err(message) => Err(RagError::GenerationError {
                        provider: "scripted".into(),
                        message: message.to_string(),
                    }),
                })
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    struct Endless {
        pulled: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl GenerationProvider for Endless {
        fn name(&self) -> &str {
            "endless"
        }

        async fn generate_stream(&self, _prompt: &str) -> Result<FragmentStream> {
            let pulled = Arc::clone(&self.pulled);
            Ok(Box::pin(stream::repeat_with(move || {
                pulled.fetch_add(1, Ordering::SeqCst);
                Ok("tok ".to_string())
            })))
        }
    }

    struct FailsToStart;

    #[async_trait]
    impl GenerationProvider for FailsToStart {
        fn name(&self) -> &str {
            "down"
        }

        async fn generate_stream(&self, _prompt: &str) -> Result<FragmentStream> {
            Err(RagError::GenerationError { provider: "down".into(), message: "503".into() })
        }
    }

    #[tokio::test]
    async fn forwards_fragments_in_order() {
        let streamer = GenerationStreamer::new(Arc::new(Scripted {
            items: vec![Ok("Zakat "), Ok(""), Ok("is "), Ok("obligatory.")],
        }));
        let fragments: Vec<String> = streamer.stream("p".into()).collect().await;
        assert_eq!(fragments, vec!["Zakat ", "is ", "obligatory."]);
    }

    #[tokio::test]
    async fn mid_stream_failure_ends_with_error_fragment() {
        let streamer = GenerationStreamer::new(Arc::new(Scripted {
            items: vec![Ok("partial "), Err("quota exceeded"), Ok("never sent")],
        }));
        let fragments: Vec<String> = streamer.stream("p".into()).collect().await;
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], "partial ");
        assert!(fragments[1].starts_with(ERROR_FRAGMENT_PREFIX));
        assert!(fragments[1].contains("quota exceeded"));
    }

    #[tokio::test]
    async fn start_failure_yields_single_error_fragment() {
        let streamer = GenerationStreamer::new(Arc::new(FailsToStart));
        let fragments: Vec<String> = streamer.stream("p".into()).collect().await;
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].contains("503"));
    }

    #[tokio::test]
    async fn dropping_the_stream_stops_upstream_pulls() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let streamer =
            GenerationStreamer::new(Arc::new(Endless { pulled: Arc::clone(&pulled) })).with_buffer(1);

        let mut answer = streamer.stream("p".into());
        assert!(answer.next().await.is_some());
        assert!(answer.next().await.is_some());
        drop(answer);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let after_drop = pulled.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pulled.load(Ordering::SeqCst), after_drop);
    }
}
