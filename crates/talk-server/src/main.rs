//! Talk server binary: the voice and text conversation gateway.
//!
//! Starts an axum HTTP server with structured logging, provider registration,
//! and graceful shutdown on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use talk_providers::CapabilityRegistry;
use talk_server::config;
use talk_server::{app, AppState};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// How often expired synthesized audio is swept from memory.
const SPEECH_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("TALK_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("talk.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path).expect("failed to load configuration");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Register providers
    let registry = CapabilityRegistry::from_config(&config.providers, config.ability.clone())
        .expect("failed to register providers, check the [providers] section");
    if registry.is_empty() {
        tracing::warn!("no providers registered; every conversation turn will report an error");
    }
    let registry = Arc::new(registry);

    if config.server.check_providers_on_startup {
        match registry.check_all().await {
            Ok(_) => tracing::info!("all providers described themselves"),
            Err(e) => {
                tracing::error!("provider check failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    // Build application
    let state = AppState::new(registry, &config);
    let hub = state.hub.clone();
    let sweeper = state.speech.spawn_sweeper(SPEECH_SWEEP_INTERVAL);
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, demo = config.providers.demo, "starting talk server");

    let listener = TcpListener::bind(addr).await.expect("failed to bind to address");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await
        .expect("server error");

    sweeper.abort();
    tracing::info!("talk server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal, then drops every subscription
/// so open SSE and WebSocket connections stop receiving heartbeats.
async fn shutdown_signal(hub: talk_server::hub::EventHub) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }

    hub.close_all().await;
}
