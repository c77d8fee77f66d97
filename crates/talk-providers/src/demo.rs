//! Canned providers for running without any backend credentials.
//!
//! They register under the same names and option variants as the real
//! providers so clients cannot tell the difference apart from the `[demo]`
//! suffix on model and voice names.

use crate::error::ProviderError;
use crate::pace::PacedWriter;
use crate::provider::{AudioInput, LlmProvider, Provider, SttProvider, TtsProvider};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use talk_types::{LlmOption, Message, ProviderAbility, SttOption, TaggedItem, TtsOption};

pub const DEMO_TRANSCRIPT: &str = "Greetings! Please share with me any arbitrary subject.";

const DEMO_REPLIES: &[&str] = &[
    "This is a demo reply. Configure an OpenAI API key to talk to a real model.",
    "Demo mode is on, so every answer comes from a short list of canned replies.",
    "Hello from the demo provider! Speech and text work end to end without credentials.",
];

const DEMO_MODELS: &[&str] = &[
    "gpt-3.5-turbo-16k[demo]",
    "gpt-3.5-turbo[demo]",
    "gpt-4-32k[demo]",
    "gpt-4[demo]",
];

const SAMPLE_RATE: u32 = 8000;

/// Canned LLM that types its reply at roughly 50 characters per second.
pub struct DemoLlm {
    next: AtomicUsize,
    symbol_delay: Duration,
}

impl Default for DemoLlm {
    fn default() -> Self {
        Self::new(Duration::from_millis(20))
    }
}

impl DemoLlm {
    pub fn new(symbol_delay: Duration) -> Self {
        Self {
            next: AtomicUsize::new(0),
            symbol_delay,
        }
    }

    fn reply(&self) -> &'static str {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        DEMO_REPLIES[i % DEMO_REPLIES.len()]
    }
}

#[async_trait]
impl Provider for DemoLlm {
    fn name(&self) -> &'static str {
        "chatGPT"
    }

    async fn describe(&self) -> Result<ProviderAbility, ProviderError> {
        Ok(ProviderAbility::available()
            .with_models(DEMO_MODELS.iter().map(|m| m.to_string()).collect()))
    }
}

#[async_trait]
impl LlmProvider for DemoLlm {
    fn supports(&self, option: &LlmOption) -> bool {
        matches!(option, LlmOption::ChatGpt(_))
    }

    async fn completion(
        &self,
        _messages: &[Message],
        option: &LlmOption,
    ) -> Result<String, ProviderError> {
        if !self.supports(option) {
            return Err(ProviderError::UnsupportedOption {
                provider: self.name(),
            });
        }
        Ok(self.reply().to_string())
    }

    async fn completion_stream(&self, messages: &[Message], option: &LlmOption, writer: PacedWriter) {
        tracing::info!(messages = messages.len(), "demo completion stream");
        if !self.supports(option) {
            let error = ProviderError::UnsupportedOption {
                provider: self.name(),
            };
            return writer.fail(error).await;
        }
        for symbol in self.reply().chars() {
            if writer.write(symbol).await.is_err() {
                return;
            }
            if !self.symbol_delay.is_zero() {
                tokio::time::sleep(self.symbol_delay).await;
            }
        }
        writer.done().await;
    }
}

/// Returns the same transcript for any audio.
pub struct DemoStt {
    latency: Duration,
}

impl Default for DemoStt {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl DemoStt {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl Provider for DemoStt {
    fn name(&self) -> &'static str {
        "whisper"
    }

    async fn describe(&self) -> Result<ProviderAbility, ProviderError> {
        Ok(ProviderAbility::available().with_models(vec!["whisper-1[demo]".to_string()]))
    }
}

#[async_trait]
impl SttProvider for DemoStt {
    fn supports(&self, option: &SttOption) -> bool {
        matches!(option, SttOption::Whisper(_))
    }

    async fn transcribe(
        &self,
        audio: &AudioInput,
        _option: &SttOption,
    ) -> Result<String, ProviderError> {
        tracing::debug!(file_name = %audio.file_name, bytes = audio.bytes.len(), "demo transcribe");
        tokio::time::sleep(self.latency).await;
        Ok(DEMO_TRANSCRIPT.to_string())
    }
}

/// Produces a silent WAV whose length grows with the text.
pub struct DemoTts {
    latency: Duration,
}

impl Default for DemoTts {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl DemoTts {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    fn voices() -> Vec<TaggedItem> {
        let voice = |id: &str, name: &str, tags: &[&str]| TaggedItem {
            id: id.to_string(),
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        };
        vec![
            voice(
                "21m00Tcm4TlvDq8ikWAM",
                "Rachel[demo]",
                &["accent=american", "age=young", "gender=female", "use case=narration"],
            ),
            voice(
                "IKne3meq5aSn9XLyUdCD",
                "Charlie[demo]",
                &["accent=australian", "age=middle aged", "gender=male", "use case=conversational"],
            ),
        ]
    }
}

/// 16-bit mono PCM silence wrapped in a RIFF header.
pub fn silent_wav(duration: Duration) -> Vec<u8> {
    let samples = (duration.as_secs_f64() * SAMPLE_RATE as f64) as u32;
    let data_len = samples * 2;
    let mut wav = Vec::with_capacity(44 + data_len as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    wav.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.resize(44 + data_len as usize, 0);
    wav
}

#[async_trait]
impl Provider for DemoTts {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    async fn describe(&self) -> Result<ProviderAbility, ProviderError> {
        Ok(ProviderAbility::available().with_voices(Self::voices()))
    }
}

#[async_trait]
impl TtsProvider for DemoTts {
    fn supports(&self, option: &TtsOption) -> bool {
        matches!(option, TtsOption::Elevenlabs(_))
    }

    async fn synthesize(&self, text: &str, _option: &TtsOption) -> Result<Vec<u8>, ProviderError> {
        tokio::time::sleep(self.latency).await;
        // Roughly 15 characters per second of speech, capped at ten seconds.
        let millis = (text.chars().count() as u64 * 1000 / 15).min(10_000);
        Ok(silent_wav(Duration::from_millis(millis)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pace::{paced_stream, PaceConfig};
    use talk_types::{ChatGptOption, ElevenlabsTtsOption, WhisperOption};

    #[test]
    fn silent_wav_has_valid_header() {
        let wav = silent_wav(Duration::from_millis(500));
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 4000 * 2);
        assert!(wav[44..].iter().all(|b| *b == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn demo_stt_returns_canned_transcript() {
        let stt = DemoStt::default();
        let text = stt
            .transcribe(
                &AudioInput::new(vec![1], "a.webm"),
                &SttOption::Whisper(WhisperOption::default()),
            )
            .await
            .unwrap();
        assert_eq!(text, DEMO_TRANSCRIPT);
    }

    #[tokio::test(start_paused = true)]
    async fn demo_llm_streams_a_whole_reply() {
        let llm = DemoLlm::default();
        let option = LlmOption::ChatGpt(ChatGptOption::default());
        let (writer, mut reader) = paced_stream(PaceConfig::default());
        tokio::spawn(async move {
            llm.completion_stream(&[Message::user("hi")], &option, writer).await;
        });

        let mut text = String::new();
        while let Some(item) = reader.recv().await {
            text.push(item.unwrap());
        }
        assert_eq!(text, DEMO_REPLIES[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn demo_tts_lists_voices_and_synthesizes() {
        let tts = DemoTts::default();
        let ability = tts.describe().await.unwrap();
        assert_eq!(ability.voices.len(), 2);
        let audio = tts
            .synthesize("hello", &TtsOption::Elevenlabs(ElevenlabsTtsOption::default()))
            .await
            .unwrap();
        assert_eq!(&audio[0..4], b"RIFF");
    }
}
