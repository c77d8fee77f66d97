use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_elevenlabs_base_url() -> String {
    DEFAULT_ELEVENLABS_BASE_URL.to_string()
}

/// Which backend providers to register at startup.
///
/// A provider is registered only when its credentials are present. In demo
/// mode the canned demo providers are registered instead of any real backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub demo: bool,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub elevenlabs: ElevenLabsConfig,
}

/// Credentials for an OpenAI-compatible API (chat completions and Whisper).
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_openai_base_url(),
        }
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Credentials for the ElevenLabs text-to-speech API.
#[derive(Clone, Serialize, Deserialize)]
pub struct ElevenLabsConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_elevenlabs_base_url")]
    pub base_url: String,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_elevenlabs_base_url(),
        }
    }
}

impl fmt::Debug for ElevenLabsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevenLabsConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn default_ability_ttl_secs() -> u64 {
    600
}

fn default_degraded_ttl_secs() -> u64 {
    60
}

fn default_refresh_timeout_secs() -> u64 {
    20
}

/// Caching and deadline settings for ability snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbilityConfig {
    /// How long a snapshot is reused when every provider described itself.
    #[serde(default = "default_ability_ttl_secs")]
    pub ttl_secs: u64,
    /// Shorter reuse window after a partial failure, so the next refresh comes sooner.
    #[serde(default = "default_degraded_ttl_secs")]
    pub degraded_ttl_secs: u64,
    /// Deadline for a single provider's self-description.
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,
}

impl Default for AbilityConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ability_ttl_secs(),
            degraded_ttl_secs: default_degraded_ttl_secs(),
            refresh_timeout_secs: default_refresh_timeout_secs(),
        }
    }
}

impl AbilityConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn degraded_ttl(&self) -> Duration {
        Duration::from_secs(self.degraded_ttl_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }
}
