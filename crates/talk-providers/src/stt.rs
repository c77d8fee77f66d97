use crate::error::{ensure_success, ProviderError};
use crate::openai::OpenAiClient;
use crate::provider::{AudioInput, Provider, SttProvider};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use talk_types::{ProviderAbility, SttOption};

/// Maximum audio upload accepted by the transcription endpoint (25 MiB).
pub const MAX_STT_INPUT_BYTES: usize = 25 * 1024 * 1024;

/// Timeout for a transcription request.
const STT_TIMEOUT: Duration = Duration::from_secs(120);

/// Speech-to-text via the OpenAI-compatible `/audio/transcriptions` endpoint.
pub struct Whisper {
    client: OpenAiClient,
}

#[derive(Deserialize)]
struct Transcription {
    text: String,
}

impl Whisper {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Provider for Whisper {
    fn name(&self) -> &'static str {
        "whisper"
    }

    async fn describe(&self) -> Result<ProviderAbility, ProviderError> {
        let models = self.client.list_models("whisper").await?;
        Ok(ProviderAbility::available().with_models(models))
    }
}

#[async_trait]
impl SttProvider for Whisper {
    fn supports(&self, option: &SttOption) -> bool {
        matches!(option, SttOption::Whisper(_))
    }

    async fn transcribe(
        &self,
        audio: &AudioInput,
        option: &SttOption,
    ) -> Result<String, ProviderError> {
        let SttOption::Whisper(option) = option else {
            return Err(ProviderError::UnsupportedOption {
                provider: self.name(),
            });
        };
        if audio.bytes.len() > MAX_STT_INPUT_BYTES {
            return Err(ProviderError::Stt(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.bytes.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        tracing::info!(file_name = %audio.file_name, model = %option.model, "transcribe");
        let file = Part::bytes(audio.bytes.clone()).file_name(audio.file_name.clone());
        let form = Form::new()
            .text("model", option.model.clone())
            .part("file", file);

        let response = self
            .client
            .post("/audio/transcriptions")
            .timeout(STT_TIMEOUT)
            .multipart(form)
            .send()
            .await?;
        let transcription: Transcription = ensure_success(response).await?.json().await?;
        tracing::info!(length = transcription.text.len(), "transcription finished");
        Ok(transcription.text.trim().to_string())
    }
}
