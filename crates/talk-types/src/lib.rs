//! Shared types for the Talk conversational gateway.
//!
//! This crate provides the wire and data types used across all Talk
//! crates: conversation messages and roles, the per-capability option
//! unions a client sends with each request, the ability snapshot shown to
//! clients, and the stream identifier that ties a request to its event
//! channel.
//!
//! No crate in the workspace depends on anything *except* `talk-types` for
//! cross-cutting type definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod ability;
pub mod option;

pub use ability::{Ability, CapabilityAbility, ProviderAbility, TaggedItem};
pub use option::{
    Chat, ChatGptOption, ElevenlabsTtsOption, GeminiOption, GoogleSttOption, GoogleTtsOption,
    LlmOption, SttOption, TalkOption, TtsOption, WhisperOption,
};

/// Length of a client-generated stream identifier.
pub const STREAM_ID_LENGTH: usize = 32;

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human side of the conversation.
    User,
    /// Model-generated replies.
    Assistant,
    /// Instructions that steer the model.
    System,
}

impl Role {
    /// Returns the wire label for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a conversation.
///
/// Conversations are passed to LLM providers oldest-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// The three capabilities a provider can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    /// Large-language-model completion.
    Llm,
    /// Speech-to-text transcription.
    Stt,
    /// Text-to-speech synthesis.
    Tts,
}

impl CapabilityKind {
    /// Returns the canonical label for this capability.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Stt => "stt",
            Self::Tts => "tts",
        }
    }

    /// Human-readable description used in client-facing messages.
    pub fn description(self) -> &'static str {
        match self {
            Self::Llm => "large language model",
            Self::Stt => "speech-to-text",
            Self::Tts => "text-to-speech",
        }
    }
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stream identifier has the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stream id must be {STREAM_ID_LENGTH} alphanumeric characters, got {len} characters")]
pub struct InvalidStreamId {
    pub len: usize,
}

/// Client-held token identifying its long-lived event channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Validates and wraps a raw identifier.
    pub fn parse(raw: &str) -> Result<Self, InvalidStreamId> {
        let len = raw.chars().count();
        if len != STREAM_ID_LENGTH || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(InvalidStreamId { len });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for StreamId {
    type Err = InvalidStreamId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for StreamId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);

        let parsed: Message = serde_json::from_str(r#"{"role":"system","content":"x"}"#).unwrap();
        assert_eq!(parsed.role, Role::System);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let parsed = serde_json::from_str::<Message>(r#"{"role":"function","content":"x"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn stream_id_requires_exact_length() {
        let ok = "a".repeat(STREAM_ID_LENGTH);
        assert_eq!(StreamId::parse(&ok).unwrap().as_str(), ok);

        let short = "a".repeat(STREAM_ID_LENGTH - 1);
        assert_eq!(
            StreamId::parse(&short),
            Err(InvalidStreamId {
                len: STREAM_ID_LENGTH - 1
            })
        );
        assert!(StreamId::parse(&"a".repeat(STREAM_ID_LENGTH + 1)).is_err());
        assert!(StreamId::parse("").is_err());
    }

    #[test]
    fn stream_id_rejects_non_alphanumeric() {
        let mut raw = "a".repeat(STREAM_ID_LENGTH - 1);
        raw.push('-');
        assert!(StreamId::parse(&raw).is_err());
    }

    #[test]
    fn stream_id_deserialize_validates() {
        let good = format!("\"{}\"", "Z9".repeat(16));
        assert!(serde_json::from_str::<StreamId>(&good).is_ok());
        assert!(serde_json::from_str::<StreamId>("\"short\"").is_err());
    }

    #[test]
    fn capability_labels() {
        assert_eq!(CapabilityKind::Llm.as_str(), "llm");
        assert_eq!(CapabilityKind::Stt.to_string(), "stt");
        assert_eq!(CapabilityKind::Tts.description(), "text-to-speech");
    }
}
