//! Per-request capability options.
//!
//! A request carries at most one concrete option variant per capability.
//! The unions are externally tagged, so the wire shape names the provider
//! family directly: `{"chatGPT": {...}}`, `{"whisper": {...}}`. A missing
//! union means the corresponding stage is skipped.

use crate::Message;
use serde::{Deserialize, Serialize};

/// Options steering an LLM completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LlmOption {
    #[serde(rename = "chatGPT")]
    ChatGpt(ChatGptOption),
    #[serde(rename = "gemini")]
    Gemini(GeminiOption),
}

/// OpenAI chat completion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatGptOption {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl Default for ChatGptOption {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 2000,
            temperature: 1.0,
            top_p: 1.0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
        }
    }
}

/// Gemini generation parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeminiOption {
    pub model: String,
    pub stop_sequences: Vec<String>,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

/// Options steering a transcription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SttOption {
    #[serde(rename = "whisper")]
    Whisper(WhisperOption),
    #[serde(rename = "google")]
    Google(GoogleSttOption),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WhisperOption {
    pub model: String,
}

impl Default for WhisperOption {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleSttOption {
    pub recognizer: String,
    pub model: String,
    pub language: String,
}

/// Options steering a synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TtsOption {
    #[serde(rename = "elevenlabs")]
    Elevenlabs(ElevenlabsTtsOption),
    #[serde(rename = "google")]
    Google(GoogleTtsOption),
}

/// ElevenLabs voice settings. An empty `voice_id` lets the provider choose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElevenlabsTtsOption {
    pub voice_id: String,
    pub stability: f32,
    pub clarity: f32,
}

impl Default for ElevenlabsTtsOption {
    fn default() -> Self {
        Self {
            voice_id: String::new(),
            stability: 0.3,
            clarity: 0.5,
        }
    }
}

/// Google voice settings. When `voice_id` is set, language and gender are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleTtsOption {
    pub voice_id: String,
    pub language_code: String,
    pub gender: String,
    pub speaking_rate: f64,
    pub pitch: f64,
    pub volume_gain_db: f64,
}

/// Which pipeline stages a request wants, plus the options for each.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TalkOption {
    /// Transcribe the uploaded audio.
    pub to_text: bool,
    /// Synthesize the user's own text when no audio was uploaded.
    pub to_speech: bool,
    /// Ask the LLM for a reply.
    pub completion: bool,
    /// Synthesize the LLM reply.
    pub completion_to_speech: bool,
    pub llm_option: Option<LlmOption>,
    pub stt_option: Option<SttOption>,
    pub tts_option: Option<TtsOption>,
}

/// A conversation request as posted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub ms: Vec<Message>,
    #[serde(default)]
    pub talk_option: TalkOption,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    #[test]
    fn option_union_uses_provider_tag() {
        let json = serde_json::to_value(LlmOption::ChatGpt(ChatGptOption::default())).unwrap();
        assert_eq!(json["chatGPT"]["model"], "gpt-3.5-turbo");
        assert_eq!(json["chatGPT"]["maxTokens"], 2000);
    }

    #[test]
    fn partial_option_fills_defaults() {
        let opt: SttOption = serde_json::from_str(r#"{"whisper":{}}"#).unwrap();
        assert_eq!(opt, SttOption::Whisper(WhisperOption::default()));

        let opt: TtsOption =
            serde_json::from_str(r#"{"elevenlabs":{"voiceId":"abc"}}"#).unwrap();
        match opt {
            TtsOption::Elevenlabs(o) => {
                assert_eq!(o.voice_id, "abc");
                assert!((o.stability - 0.3).abs() < f32::EPSILON);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn two_variants_in_one_union_are_rejected() {
        let parsed =
            serde_json::from_str::<SttOption>(r#"{"whisper":{},"google":{}}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn chat_request_parses_client_payload() {
        let raw = r#"{
            "chatId": "c1",
            "ms": [{"role": "user", "content": "hello"}],
            "talkOption": {
                "completion": true,
                "completionToSpeech": true,
                "llmOption": {"chatGPT": {"model": "gpt-4"}},
                "ttsOption": {"google": {"languageCode": "en-GB"}}
            }
        }"#;
        let chat: Chat = serde_json::from_str(raw).unwrap();
        assert_eq!(chat.chat_id, "c1");
        assert_eq!(chat.ticket_id, None);
        assert_eq!(chat.ms[0].role, Role::User);
        assert!(chat.talk_option.completion);
        assert!(!chat.talk_option.to_text);
        assert!(chat.talk_option.stt_option.is_none());
        match chat.talk_option.llm_option {
            Some(LlmOption::ChatGpt(o)) => {
                assert_eq!(o.model, "gpt-4");
                assert_eq!(o.max_tokens, 2000);
            }
            other => panic!("unexpected llm option: {:?}", other),
        }
    }
}
