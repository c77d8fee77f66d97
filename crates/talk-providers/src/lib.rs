//! Provider layer for the Talk conversational gateway.
//!
//! Wraps LLM, speech-to-text and text-to-speech backends behind capability
//! traits, resolves a request's options to a concrete provider through the
//! [`CapabilityRegistry`], and caches the aggregated [`talk_types::Ability`]
//! snapshot shown to clients.
//!
//! Streamed completions are delivered through a [`pace::PacedReader`], which
//! releases text at a human reading cadence regardless of how bursty the
//! backend is.

pub mod config;
pub mod demo;
pub mod error;
pub mod llm;
pub mod openai;
pub mod pace;
pub mod provider;
pub mod registry;
pub mod stt;
pub mod tts;

pub use config::{AbilityConfig, ElevenLabsConfig, OpenAiConfig, ProvidersConfig};
pub use demo::{DemoLlm, DemoStt, DemoTts};
pub use error::ProviderError;
pub use llm::ChatGpt;
pub use openai::OpenAiClient;
pub use pace::{paced_stream, PaceConfig, PacedReader, PacedWriter};
pub use provider::{AudioInput, LlmProvider, Provider, SttProvider, TtsProvider};
pub use registry::{AbilityFailure, AbilityReport, CapabilityRegistry};
pub use stt::Whisper;
pub use tts::ElevenLabs;
