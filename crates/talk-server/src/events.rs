//! Events pushed to a subscriber's stream.

use base64::Engine;
use serde::Serialize;
use talk_types::{Ability, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    #[serde(rename = "thinking")]
    Thinking,
    #[serde(rename = "typing")]
    Typing,
    #[serde(rename = "text-eof")]
    TextEof,
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "ability")]
    Ability,
    #[serde(rename = "heartbeat")]
    Heartbeat,
}

impl EventKind {
    /// Name used for the SSE `event:` field and the `type` body field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::Typing => "typing",
            Self::TextEof => "text-eof",
            Self::Audio => "audio",
            Self::Error => "error",
            Self::Ability => "ability",
            Self::Heartbeat => "heartbeat",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the message an event belongs to.
///
/// One pipeline stage produces one message, so every event of a stage shares
/// the same `message_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMeta {
    pub chat_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    pub message_id: String,
    pub role: Role,
}

/// JSON body of an event. Fields irrelevant to the kind are omitted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(flatten)]
    pub meta: Option<MessageMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64-encoded audio bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eof: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ability: Option<Ability>,
}

impl Event {
    fn new(kind: EventKind, meta: Option<MessageMeta>) -> Self {
        Self {
            kind,
            meta,
            text: None,
            audio: None,
            speech_id: None,
            eof: None,
            err: None,
            ability: None,
        }
    }

    pub fn thinking(meta: &MessageMeta) -> Self {
        Self::new(EventKind::Thinking, Some(meta.clone()))
    }

    pub fn typing(meta: &MessageMeta, text: impl Into<String>) -> Self {
        let mut event = Self::new(EventKind::Typing, Some(meta.clone()));
        event.text = Some(text.into());
        event.eof = Some(false);
        event
    }

    pub fn text_eof(meta: &MessageMeta, text: impl Into<String>) -> Self {
        let mut event = Self::new(EventKind::TextEof, Some(meta.clone()));
        event.text = Some(text.into());
        event.eof = Some(true);
        event
    }

    pub fn audio(meta: &MessageMeta, audio: &[u8], speech_id: String) -> Self {
        let mut event = Self::new(EventKind::Audio, Some(meta.clone()));
        event.audio = Some(base64::engine::general_purpose::STANDARD.encode(audio));
        event.speech_id = Some(speech_id);
        event
    }

    pub fn error(meta: &MessageMeta, err: impl Into<String>) -> Self {
        let mut event = Self::new(EventKind::Error, Some(meta.clone()));
        event.err = Some(err.into());
        event
    }

    /// An error not tied to any message, e.g. a rejected inbound frame.
    pub fn rejected(err: impl Into<String>) -> Self {
        let mut event = Self::new(EventKind::Error, None);
        event.err = Some(err.into());
        event
    }

    pub fn ability(ability: &Ability) -> Self {
        let mut event = Self::new(EventKind::Ability, None);
        event.ability = Some(ability.clone());
        event
    }

    pub fn heartbeat() -> Self {
        Self::new(EventKind::Heartbeat, None)
    }
}

/// An event serialized once, ready for any transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: EventKind,
    pub data: String,
}

impl Frame {
    pub fn encode(event: &Event) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: event.kind,
            data: serde_json::to_string(event)?,
        })
    }
}
