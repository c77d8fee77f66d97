use crate::config::ElevenLabsConfig;
use crate::error::{ensure_success, ProviderError};
use crate::provider::{Provider, TtsProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use talk_types::{ProviderAbility, TaggedItem, TtsOption};
use tokio::sync::RwLock;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
pub const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Timeout for a synthesis request.
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v1";

/// Text-to-speech via the ElevenLabs API.
#[derive(Clone)]
pub struct ElevenLabs {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    /// Last fetched voice list, used to pick a voice when the request names none.
    voices: Arc<RwLock<Vec<TaggedItem>>>,
}

#[derive(Deserialize)]
struct VoiceList {
    voices: Vec<Voice>,
}

#[derive(Deserialize)]
struct Voice {
    voice_id: String,
    name: String,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

fn voice_to_item(voice: Voice) -> TaggedItem {
    let mut seen = HashSet::new();
    let tags = voice
        .labels
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .filter(|tag| seen.insert(tag.clone()))
        .collect();
    TaggedItem {
        id: voice.voice_id,
        name: voice.name,
        tags,
    }
}

impl ElevenLabs {
    pub fn new(config: &ElevenLabsConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::Config(
                "ElevenLabs API key is empty".to_string(),
            ));
        }
        let http = reqwest::Client::builder().timeout(TTS_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            voices: Arc::new(RwLock::new(Vec::new())),
        })
    }

    /// Fetches the voice list and refreshes the local copy.
    pub async fn voices(&self) -> Result<Vec<TaggedItem>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/v1/voices", self.base_url))
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;
        let list: VoiceList = ensure_success(response).await?.json().await?;
        let voices: Vec<TaggedItem> = list.voices.into_iter().map(voice_to_item).collect();
        tracing::debug!(count = voices.len(), "fetched voices");
        *self.voices.write().await = voices.clone();
        Ok(voices)
    }

    /// Uses `requested` when set, otherwise the last listed voice, which is where
    /// user-created voices end up.
    async fn choose_voice(&self, requested: &str) -> Result<String, ProviderError> {
        if !requested.is_empty() {
            return Ok(requested.to_string());
        }
        if let Some(voice) = self.voices.read().await.last() {
            return Ok(voice.id.clone());
        }
        self.voices()
            .await?
            .last()
            .map(|v| v.id.clone())
            .ok_or_else(|| ProviderError::Tts("found no voice from ElevenLabs".to_string()))
    }
}

#[async_trait]
impl Provider for ElevenLabs {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    async fn describe(&self) -> Result<ProviderAbility, ProviderError> {
        let voices = self.voices().await?;
        Ok(ProviderAbility::available().with_voices(voices))
    }
}

#[async_trait]
impl TtsProvider for ElevenLabs {
    fn supports(&self, option: &TtsOption) -> bool {
        matches!(option, TtsOption::Elevenlabs(_))
    }

    async fn synthesize(&self, text: &str, option: &TtsOption) -> Result<Vec<u8>, ProviderError> {
        let TtsOption::Elevenlabs(option) = option else {
            return Err(ProviderError::UnsupportedOption {
                provider: self.name(),
            });
        };
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(ProviderError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let voice_id = self.choose_voice(&option.voice_id).await?;
        tracing::info!(voice_id = %voice_id, length = text.len(), "text to speech");
        let request = SpeechRequest {
            text,
            model_id: DEFAULT_MODEL_ID,
            voice_settings: VoiceSettings {
                stability: option.stability,
                similarity_boost: option.clarity,
            },
        };
        let response = self
            .http
            .post(format!("{}/v1/text-to-speech/{}", self.base_url, voice_id))
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;
        let audio = ensure_success(response).await?.bytes().await?;
        tracing::debug!(bytes = audio.len(), "speech synthesized");
        Ok(audio.to_vec())
    }
}
