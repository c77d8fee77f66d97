//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use talk_providers::{AbilityConfig, PaceConfig, ProvidersConfig};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-subscriber event stream settings.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Typing cadence for streamed completions.
    #[serde(default)]
    pub pace: PaceConfig,

    /// Ability snapshot caching.
    #[serde(default)]
    pub ability: AbilityConfig,

    /// Synthesized audio retention.
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Backend credentials.
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Describe every provider before accepting traffic and refuse to start
    /// if any of them fails.
    #[serde(default)]
    pub check_providers_on_startup: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "talk_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Interval between keep-alive heartbeats on an idle subscription.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Outbound events buffered per subscriber before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    /// How long synthesized audio stays downloadable via `/api/speech/{id}`.
    #[serde(default = "default_speech_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_heartbeat_secs() -> u64 {
    15
}

fn default_queue_capacity() -> usize {
    256
}

fn default_speech_ttl_secs() -> u64 {
    600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            check_providers_on_startup: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl StreamConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_speech_ttl_secs(),
        }
    }
}

impl SpeechConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `TALK_HOST` overrides `server.host`
/// - `TALK_PORT` overrides `server.port`
/// - `TALK_LOG_LEVEL` overrides `logging.level`
/// - `TALK_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `TALK_DEMO` overrides `providers.demo`
/// - `TALK_OPENAI_API_KEY` overrides `providers.openai.api_key`
/// - `TALK_ELEVENLABS_API_KEY` overrides `providers.elevenlabs.api_key`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn is_truthy(value: &str) -> bool {
    value == "true" || value == "1"
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("TALK_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("TALK_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = var("TALK_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("TALK_LOG_JSON") {
        config.logging.json = is_truthy(&json);
    }
    if let Some(demo) = var("TALK_DEMO") {
        config.providers.demo = is_truthy(&demo);
    }
    if let Some(key) = var("TALK_OPENAI_API_KEY") {
        config.providers.openai.api_key = key;
    }
    if let Some(key) = var("TALK_ELEVENLABS_API_KEY") {
        config.providers.elevenlabs.api_key = key;
    }
}
