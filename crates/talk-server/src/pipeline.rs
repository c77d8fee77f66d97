//! One conversation turn: transcribe, complete, synthesize.
//!
//! ```text
//! with audio:     audio --[to text]--> text --[completion]--> text --[to speech]--> audio
//!                                       |                       |                     |
//!                                       v                       v                     v
//!                                     client                  client               client
//!
//! without audio:  text --[completion]--> text --[to speech]--> audio
//!                  |
//!                  +--[to speech]--> audio (concurrently)
//! ```
//!
//! Results never flow back to the caller; every stage reports through the
//! [`EventHub`]. Stages that fail publish an `error` event and stop the turn.

use crate::events::{Event, MessageMeta};
use crate::hub::EventHub;
use crate::speech::SpeechCache;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use talk_providers::{paced_stream, AudioInput, CapabilityRegistry, PaceConfig, ProviderError};
use talk_types::{
    CapabilityKind, Chat, LlmOption, Message, Role, StreamId, SttOption, TalkOption, TtsOption,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

static FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("fenced code pattern is valid"));

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rejected before any stage runs.
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("no {} providers are available", .0.description())]
    NoProvider(CapabilityKind),

    #[error("failed to get a response from the {} provider: {source}", .kind.description())]
    Provider {
        kind: CapabilityKind,
        #[source]
        source: ProviderError,
    },

    #[error("empty content from the {} provider", .0.description())]
    EmptyResult(CapabilityKind),
}

/// Everything needed to run one turn.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub stream_id: StreamId,
    pub chat: Chat,
    pub audio: Option<AudioInput>,
}

impl ChatRequest {
    /// Checks the request shape before any provider is touched.
    ///
    /// Without audio the conversation must end with a user message, since that
    /// is what the model answers and what `toSpeech` reads aloud. Audio that
    /// will not be transcribed adds no user message, so a completion on top of
    /// it needs the same history as a text-only request.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let option = &self.chat.talk_option;
        match &self.audio {
            Some(audio) if audio.is_empty() => {
                return Err(PipelineError::Malformed("uploaded audio is empty".to_string()))
            }
            Some(_) if option.to_text && option.stt_option.is_some() => return Ok(()),
            Some(_) if !option.completion => return Ok(()),
            _ => {}
        }

        let source = if self.audio.is_some() {
            "with untranscribed audio"
        } else {
            "without audio"
        };
        match self.chat.ms.last() {
            Some(last) if last.role == Role::User => Ok(()),
            Some(last) => Err(PipelineError::Malformed(format!(
                "{source} the last message must come from the user, got {}",
                last.role
            ))),
            None => Err(PipelineError::Malformed(format!(
                "{source} at least one message is required"
            ))),
        }
    }
}

/// Per-turn identifiers shared by every event of the turn.
#[derive(Debug, Clone)]
struct Turn {
    stream_id: StreamId,
    chat_id: String,
    ticket_id: Option<String>,
    option: TalkOption,
}

impl Turn {
    /// Fresh message metadata; each stage produces a separate message.
    fn meta(&self, role: Role) -> MessageMeta {
        MessageMeta {
            chat_id: self.chat_id.clone(),
            ticket_id: self.ticket_id.clone(),
            message_id: message_id(),
            role,
        }
    }
}

/// A stage was requested without options for its capability.
fn skipped(turn: &Turn, stage: &'static str) {
    tracing::debug!(stream_id = %turn.stream_id, chat_id = %turn.chat_id, stage, "no option given, stage skipped");
}

fn message_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

/// Removes fenced code blocks, which read badly when spoken.
pub fn strip_code(text: &str) -> String {
    FENCED_CODE.replace_all(text, "\n").into_owned()
}

/// Runs conversation turns against the registered providers.
#[derive(Clone)]
pub struct ConversationPipeline {
    hub: EventHub,
    registry: Arc<CapabilityRegistry>,
    speech: SpeechCache,
    pace: PaceConfig,
}

impl ConversationPipeline {
    pub fn new(
        hub: EventHub,
        registry: Arc<CapabilityRegistry>,
        speech: SpeechCache,
        pace: PaceConfig,
    ) -> Self {
        Self {
            hub,
            registry,
            speech,
            pace,
        }
    }

    /// Validates `request` and runs the turn in the background.
    ///
    /// Only malformed requests fail here; everything later is reported as events.
    pub fn start(&self, request: ChatRequest) -> Result<JoinHandle<()>, PipelineError> {
        request.validate()?;
        let pipeline = self.clone();
        Ok(tokio::spawn(async move { pipeline.run(request).await }))
    }

    /// Runs every requested stage to completion. Assumes a validated request.
    pub async fn run(&self, request: ChatRequest) {
        let ChatRequest {
            stream_id,
            chat,
            audio,
        } = request;
        let turn = Turn {
            stream_id,
            chat_id: chat.chat_id,
            ticket_id: chat.ticket_id,
            option: chat.talk_option,
        };
        let mut messages = chat.ms;

        tracing::info!(
            stream_id = %turn.stream_id,
            chat_id = %turn.chat_id,
            messages = messages.len(),
            audio = audio.is_some(),
            "conversation turn started"
        );

        match audio {
            Some(audio) if turn.option.to_text => match &turn.option.stt_option {
                Some(option) => match self.transcribe(&turn, &audio, option).await {
                    Ok(text) => messages.push(Message::user(text)),
                    Err(_) => return,
                },
                None => skipped(&turn, "transcribe"),
            },
            Some(_) => {}
            None => {
                if turn.option.to_speech {
                    if let (Some(option), Some(last)) = (&turn.option.tts_option, messages.last()) {
                        let pipeline = self.clone();
                        let turn = turn.clone();
                        let option = option.clone();
                        let text = last.content.clone();
                        tokio::spawn(async move {
                            let _ = pipeline.synthesize(&turn, &text, &option, Role::User).await;
                        });
                    } else {
                        skipped(&turn, "synthesize");
                    }
                }
            }
        }

        if !turn.option.completion {
            return;
        }
        let Some(llm_option) = &turn.option.llm_option else {
            skipped(&turn, "completion");
            return;
        };
        let reply = match self.complete(&turn, &messages, llm_option).await {
            Ok(reply) => reply,
            Err(_) => return,
        };
        if turn.option.completion_to_speech {
            match &turn.option.tts_option {
                Some(option) => {
                    let _ = self.synthesize(&turn, &reply, option, Role::Assistant).await;
                }
                None => skipped(&turn, "synthesize"),
            }
        }
    }

    async fn fail(&self, turn: &Turn, meta: &MessageMeta, error: PipelineError) -> PipelineError {
        tracing::warn!(
            stream_id = %turn.stream_id,
            chat_id = %turn.chat_id,
            message_id = %meta.message_id,
            error = %error,
            "stage failed"
        );
        self.hub
            .publish(&turn.stream_id, Event::error(meta, error.to_string()))
            .await;
        error
    }

    async fn transcribe(
        &self,
        turn: &Turn,
        audio: &AudioInput,
        option: &SttOption,
    ) -> Result<String, PipelineError> {
        let meta = turn.meta(Role::User);
        let Some(stt) = self.registry.select_stt(Some(option)) else {
            return Err(self
                .fail(turn, &meta, PipelineError::NoProvider(CapabilityKind::Stt))
                .await);
        };

        self.hub.publish(&turn.stream_id, Event::thinking(&meta)).await;
        tracing::debug!(stream_id = %turn.stream_id, provider = stt.name(), stage = "transcribe", "calling provider");

        let text = match stt.transcribe(audio, option).await {
            Ok(text) => text,
            Err(source) => {
                let error = PipelineError::Provider {
                    kind: CapabilityKind::Stt,
                    source,
                };
                return Err(self.fail(turn, &meta, error).await);
            }
        };
        if text.trim().is_empty() {
            return Err(self
                .fail(turn, &meta, PipelineError::EmptyResult(CapabilityKind::Stt))
                .await);
        }

        self.hub
            .publish(&turn.stream_id, Event::text_eof(&meta, text.clone()))
            .await;
        Ok(text)
    }

    async fn complete(
        &self,
        turn: &Turn,
        messages: &[Message],
        option: &LlmOption,
    ) -> Result<String, PipelineError> {
        let meta = turn.meta(Role::Assistant);
        let Some(llm) = self.registry.select_llm(Some(option)) else {
            return Err(self
                .fail(turn, &meta, PipelineError::NoProvider(CapabilityKind::Llm))
                .await);
        };

        self.hub.publish(&turn.stream_id, Event::thinking(&meta)).await;
        tracing::debug!(stream_id = %turn.stream_id, provider = llm.name(), stage = "completion", "calling provider");

        let (writer, mut reader) = paced_stream(self.pace);
        let history = messages.to_vec();
        let option = option.clone();
        let producer = tokio::spawn(async move {
            llm.completion_stream(&history, &option, writer).await;
        });

        let mut reply = String::new();
        while let Some(item) = reader.recv().await {
            match item {
                Ok(symbol) => {
                    reply.push(symbol);
                    self.hub
                        .publish(&turn.stream_id, Event::typing(&meta, symbol.to_string()))
                        .await;
                }
                Err(source) => {
                    producer.abort();
                    let error = PipelineError::Provider {
                        kind: CapabilityKind::Llm,
                        source,
                    };
                    return Err(self.fail(turn, &meta, error).await);
                }
            }
        }

        self.hub
            .publish(&turn.stream_id, Event::text_eof(&meta, reply.clone()))
            .await;
        if reply.is_empty() {
            // nothing to say: not reported as an error
            tracing::info!(stream_id = %turn.stream_id, chat_id = %turn.chat_id, "completion was empty");
            return Err(PipelineError::EmptyResult(CapabilityKind::Llm));
        }
        Ok(reply)
    }

    async fn synthesize(
        &self,
        turn: &Turn,
        text: &str,
        option: &TtsOption,
        role: Role,
    ) -> Result<(), PipelineError> {
        let meta = turn.meta(role);
        let Some(tts) = self.registry.select_tts(Some(option)) else {
            return Err(self
                .fail(turn, &meta, PipelineError::NoProvider(CapabilityKind::Tts))
                .await);
        };

        self.hub.publish(&turn.stream_id, Event::thinking(&meta)).await;
        tracing::debug!(stream_id = %turn.stream_id, provider = tts.name(), stage = "synthesize", "calling provider");

        let spoken = strip_code(text);
        let audio = match tts.synthesize(&spoken, option).await {
            Ok(audio) if audio.is_empty() => {
                return Err(self
                    .fail(turn, &meta, PipelineError::EmptyResult(CapabilityKind::Tts))
                    .await);
            }
            Ok(audio) => audio,
            Err(source) => {
                let error = PipelineError::Provider {
                    kind: CapabilityKind::Tts,
                    source,
                };
                return Err(self.fail(turn, &meta, error).await);
            }
        };

        let event_audio = audio.clone();
        let speech_id = self.speech.insert(audio);
        self.hub
            .publish(&turn.stream_id, Event::audio(&meta, &event_audio, speech_id))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(ms: Vec<Message>, audio: Option<AudioInput>) -> ChatRequest {
        ChatRequest {
            stream_id: StreamId::parse(&"s".repeat(32)).unwrap(),
            chat: Chat {
                chat_id: "c".to_string(),
                ticket_id: None,
                ms,
                talk_option: TalkOption::default(),
            },
            audio,
        }
    }

    #[test]
    fn strips_each_fenced_block() {
        let text = "Try this:\n```rust\nfn main() {}\n```\nor this:\n```\nls\n```\nDone.";
        assert_eq!(strip_code(text), "Try this:\n\nor this:\n\nDone.");
        assert_eq!(strip_code("no code here"), "no code here");
    }

    #[test]
    fn message_ids_are_short_and_unique() {
        let a = message_id();
        let b = message_id();
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn text_only_request_must_end_with_user() {
        assert!(request(vec![Message::user("hi")], None).validate().is_ok());
        assert!(matches!(
            request(vec![Message::user("hi"), Message::assistant("yo")], None).validate(),
            Err(PipelineError::Malformed(_))
        ));
        assert!(matches!(
            request(Vec::new(), None).validate(),
            Err(PipelineError::Malformed(_))
        ));
    }

    #[test]
    fn transcribed_audio_may_have_any_history() {
        let option = TalkOption {
            to_text: true,
            completion: true,
            stt_option: Some(SttOption::Whisper(Default::default())),
            ..TalkOption::default()
        };
        let audio = AudioInput::new(vec![1, 2, 3], "a.webm");
        let mut req = request(Vec::new(), Some(audio));
        req.chat.talk_option = option;
        assert!(req.validate().is_ok());

        let empty = AudioInput::new(Vec::new(), "a.webm");
        assert!(request(Vec::new(), Some(empty)).validate().is_err());
    }

    #[test]
    fn untranscribed_audio_needs_user_message_for_completion() {
        let audio = AudioInput::new(vec![1, 2, 3], "a.webm");
        let completion = TalkOption {
            completion: true,
            ..TalkOption::default()
        };

        // nothing asks for a reply, so the history does not matter
        assert!(request(Vec::new(), Some(audio.clone())).validate().is_ok());

        let mut req = request(vec![Message::assistant("hello")], Some(audio.clone()));
        req.chat.talk_option = TalkOption {
            to_text: false,
            ..completion.clone()
        };
        assert!(matches!(req.validate(), Err(PipelineError::Malformed(_))));

        // toText without an sttOption skips transcription too
        let mut req = request(Vec::new(), Some(audio.clone()));
        req.chat.talk_option = TalkOption {
            to_text: true,
            ..completion.clone()
        };
        assert!(matches!(req.validate(), Err(PipelineError::Malformed(_))));

        let mut req = request(vec![Message::user("what is this?")], Some(audio));
        req.chat.talk_option = completion;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn no_provider_messages() {
        assert_eq!(
            PipelineError::NoProvider(CapabilityKind::Stt).to_string(),
            "no speech-to-text providers are available"
        );
        assert_eq!(
            PipelineError::NoProvider(CapabilityKind::Llm).to_string(),
            "no large language model providers are available"
        );
        assert_eq!(
            PipelineError::NoProvider(CapabilityKind::Tts).to_string(),
            "no text-to-speech providers are available"
        );
    }
}
