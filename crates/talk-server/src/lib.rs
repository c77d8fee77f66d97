//! Talk server library logic.

pub mod api;
pub mod api_sse;
pub mod api_ws;
pub mod config;
pub mod events;
pub mod hub;
pub mod middleware;
pub mod pipeline;
pub mod speech;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use config::Config;
use hub::EventHub;
use pipeline::ConversationPipeline;
use serde_json::{json, Value};
use speech::SpeechCache;
use std::sync::Arc;
use talk_providers::stt::MAX_STT_INPUT_BYTES;
use talk_providers::CapabilityRegistry;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registered providers and the cached ability snapshot.
    pub registry: Arc<CapabilityRegistry>,
    /// Subscriber routing for SSE and WebSocket clients.
    pub hub: EventHub,
    /// Runs conversation turns and publishes their events.
    pub pipeline: ConversationPipeline,
    /// Synthesized audio served by `/api/speech/{speechId}`.
    pub speech: SpeechCache,
}

impl AppState {
    /// Wires the hub, speech cache and pipeline around `registry`.
    pub fn new(registry: Arc<CapabilityRegistry>, config: &Config) -> Self {
        let hub = EventHub::new(
            registry.clone(),
            config.stream.heartbeat_interval(),
            config.stream.queue_capacity,
        );
        let speech = SpeechCache::new(config.speech.ttl());
        let pipeline =
            ConversationPipeline::new(hub.clone(), registry.clone(), speech.clone(), config.pace);
        Self {
            registry,
            hub,
            pipeline,
            speech,
        }
    }
}

/// Maximum JSON request body size (2 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let chat_routes = Router::new()
        .route("/api/chat", post(api::chat_handler))
        .route(
            "/api/audio-chat",
            post(api::audio_chat_handler)
                .layer(DefaultBodyLimit::max(MAX_STT_INPUT_BYTES + MAX_REQUEST_BODY_BYTES)),
        )
        .layer(axum::middleware::from_fn(middleware::stream_id_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/api/ability", get(api::ability_handler))
        .route("/api/events", get(api_sse::get_event_stream_handler))
        .route("/api/ws", get(api_ws::ws_handler))
        .route("/api/speech/{speechId}", get(api::speech_handler))
        .merge(chat_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
