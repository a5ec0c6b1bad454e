use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use anyhow::Context;
use askqa_rag::{
    AnswerPipeline, FileVectorStore, GenerationStreamer, NormalizedEmbedder, RateDecision,
    RateLimiter, Retriever, Settings, gemini::GeminiGenerationProvider,
    openai::OpenAIEmbeddingProvider,
};
use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, Request, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info};

/// Accepted query length in characters, measured before trimming.
pub const QUERY_CHARS: std::ops::RangeInclusive<usize> = 3..=200;

#[derive(Clone, Debug)]
pub struct AppState {
    pipeline: Arc<AnswerPipeline>,
    limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(pipeline: AnswerPipeline, limiter: RateLimiter) -> Self {
        Self { pipeline: Arc::new(pipeline), limiter: Arc::new(limiter) }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8000 }
    }
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let ask_route =
        post(ask).route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/ask", ask_route)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Connect every collaborator described by `settings` into an [`AppState`].
///
/// Fails when the collection is missing or empty, or the generation key is unset.
pub async fn build_state(settings: &Settings) -> anyhow::Result<AppState> {
    let embedder = NormalizedEmbedder::new(Arc::new(
        OpenAIEmbeddingProvider::from_settings(settings).context("invalid embedding settings")?,
    ));
    let store = Arc::new(
        FileVectorStore::open(&settings.persist_dir).with_context(|| {
            format!("cannot open index directory {}", settings.persist_dir.display())
        })?,
    );
    let retriever =
        Retriever::connect(embedder, store, settings.collection_name.clone(), settings.top_k)
            .await
            .context("failed to connect to the collection; did you run `askqa build-db`?")?;

    let generator =
        GeminiGenerationProvider::from_settings(settings).context("invalid generation settings")?;
    let pipeline = AnswerPipeline::builder()
        .retriever(retriever)
        .streamer(GenerationStreamer::new(Arc::new(generator)))
        .build()?;

    Ok(AppState::new(pipeline, RateLimiter::from_settings(settings)))
}

pub async fn run_server(settings: Settings, config: ServerConfig) -> anyhow::Result<()> {
    let state = build_state(&settings).await?;
    spawn_sweeper(Arc::clone(state.limiter()));

    let app = app_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| "invalid host/port for askqa server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("askqa listening on http://{}", addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Periodically forget clients whose window has emptied.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(limiter.window());
        loop {
            ticker.tick().await;
            limiter.sweep();
            debug!(tracked_clients = limiter.tracked_clients(), "rate limiter swept");
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

/// The first `X-Forwarded-For` entry when present, else the peer IP.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(first), _) => first.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "detail": message.into() }))).into_response()
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| *addr);
    let client = client_identity(request.headers(), peer);

    match state.limiter.check(&client) {
        RateDecision::Admitted => next.run(request).await,
        RateDecision::Rejected { retry_after } => {
            info!(%client, retry_after_secs = retry_after.as_secs(), "rate limit exceeded");
            let mut response = detail(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests");
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
            response
        }
    }
}

async fn index() -> impl IntoResponse {
    Html(include_str!("../ui/index.html"))
}

async fn health(State(state): State<AppState>) -> Response {
    let retriever = state.pipeline.retriever();
    match retriever.collection_size().await {
        Ok(chunks) => Json(json!({
            "status": "ok",
            "collection": retriever.collection(),
            "chunks": chunks,
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "health check failed");
            detail(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

async fn ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            debug!(error = %rejection, "rejected malformed ask body");
            return detail(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text());
        }
    };

    let length = request.query.chars().count();
    if !QUERY_CHARS.contains(&length) {
        debug!(length, "rejected query length");
        return detail(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!(
                "query must be between {} and {} characters",
                QUERY_CHARS.start(),
                QUERY_CHARS.end()
            ),
        );
    }

    let answer = match state.pipeline.answer(request.query.trim()).await {
        Ok(answer) => answer,
        Err(e) => {
            error!(error = %e, "retrieval failed");
            return detail(StatusCode::INTERNAL_SERVER_ERROR, "failed to retrieve context");
        }
    };

    let body = Body::from_stream(answer.map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}
