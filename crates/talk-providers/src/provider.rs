//! Capability traits implemented by every backend.
//!
//! A provider serves exactly one capability. Providers are registered once at
//! startup and shared behind `Arc`, so every method takes `&self` and must be
//! safe to call from many pipelines at once.

use crate::error::ProviderError;
use crate::pace::PacedWriter;
use async_trait::async_trait;
use talk_types::{LlmOption, Message, ProviderAbility, SttOption, TtsOption};

/// Behaviour shared by all providers regardless of capability.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Key under which the provider appears in the ability snapshot.
    fn name(&self) -> &'static str;

    /// Describes what the provider can currently do (models, voices).
    ///
    /// Usually a network round-trip; callers bound it with a deadline.
    async fn describe(&self) -> Result<ProviderAbility, ProviderError>;
}

#[async_trait]
pub trait LlmProvider: Provider {
    fn supports(&self, option: &LlmOption) -> bool;

    /// Returns the whole reply in one piece.
    async fn completion(
        &self,
        messages: &[Message],
        option: &LlmOption,
    ) -> Result<String, ProviderError>;

    /// Streams the reply into `writer` and terminates it.
    ///
    /// Implementations must end the stream with `done` or `fail`. The default
    /// writes the non-streamed completion in one burst and lets the reader's
    /// pacing smooth it out.
    async fn completion_stream(&self, messages: &[Message], option: &LlmOption, writer: PacedWriter) {
        match self.completion(messages, option).await {
            Ok(text) => {
                if writer.write_str(&text).await.is_ok() {
                    writer.done().await;
                }
            }
            Err(e) => writer.fail(e).await,
        }
    }
}

/// Uploaded audio awaiting transcription.
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub bytes: Vec<u8>,
    /// Original file name; backends sniff the container format from its extension.
    pub file_name: String,
}

impl AudioInput {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[async_trait]
pub trait SttProvider: Provider {
    fn supports(&self, option: &SttOption) -> bool;

    async fn transcribe(&self, audio: &AudioInput, option: &SttOption)
        -> Result<String, ProviderError>;
}

#[async_trait]
pub trait TtsProvider: Provider {
    fn supports(&self, option: &TtsOption) -> bool;

    /// Returns encoded audio (mp3 or wav, depending on the backend).
    async fn synthesize(&self, text: &str, option: &TtsOption) -> Result<Vec<u8>, ProviderError>;
}
