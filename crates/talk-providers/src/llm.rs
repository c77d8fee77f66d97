use crate::error::{ensure_success, ProviderError};
use crate::openai::OpenAiClient;
use crate::pace::PacedWriter;
use crate::provider::{LlmProvider, Provider};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use talk_types::{ChatGptOption, LlmOption, Message, ProviderAbility};

/// Whole-request deadline for non-streamed completions.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(120);

/// Chat completions against an OpenAI-compatible API.
pub struct ChatGpt {
    client: OpenAiClient,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    presence_penalty: f32,
    frequency_penalty: f32,
    stream: bool,
}

impl<'a> CompletionRequest<'a> {
    fn new(messages: &'a [Message], option: &'a ChatGptOption, stream: bool) -> Self {
        Self {
            model: &option.model,
            messages,
            max_tokens: option.max_tokens,
            temperature: option.temperature,
            top_p: option.top_p,
            presence_penalty: option.presence_penalty,
            frequency_penalty: option.frequency_penalty,
            stream,
        }
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Message,
}

#[derive(Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// One line of a server-sent completion stream.
#[derive(Debug, PartialEq)]
enum StreamLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_stream_line(line: &str) -> Result<StreamLine, ProviderError> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(StreamLine::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(StreamLine::Done);
    }
    let chunk: StreamResponse = serde_json::from_str(data)
        .map_err(|e| ProviderError::Llm(format!("malformed stream chunk: {}", e)))?;
    let text = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect::<String>();
    if text.is_empty() {
        Ok(StreamLine::Skip)
    } else {
        Ok(StreamLine::Delta(text))
    }
}

impl ChatGpt {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }

    fn option<'a>(&self, option: &'a LlmOption) -> Result<&'a ChatGptOption, ProviderError> {
        match option {
            LlmOption::ChatGpt(o) => Ok(o),
            _ => Err(ProviderError::UnsupportedOption {
                provider: self.name(),
            }),
        }
    }

    /// Pumps the SSE body into `writer`. Returns without terminating the writer.
    async fn stream_into(
        &self,
        messages: &[Message],
        option: &ChatGptOption,
        writer: &PacedWriter,
    ) -> Result<(), ProviderError> {
        let response = self
            .client
            .post("/chat/completions")
            .json(&CompletionRequest::new(messages, option, true))
            .send()
            .await?;
        let mut body = ensure_success(response).await?.bytes_stream();

        let mut pending: Vec<u8> = Vec::new();
        while let Some(bytes) = body.next().await {
            pending.extend_from_slice(&bytes?);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                match parse_stream_line(&line)? {
                    StreamLine::Delta(text) => writer.write_str(&text).await?,
                    StreamLine::Done => return Ok(()),
                    StreamLine::Skip => {}
                }
            }
        }
        // Some compatible servers close without sending [DONE].
        Ok(())
    }
}

#[async_trait]
impl Provider for ChatGpt {
    fn name(&self) -> &'static str {
        "chatGPT"
    }

    async fn describe(&self) -> Result<ProviderAbility, ProviderError> {
        let models = self.client.list_models("gpt").await?;
        Ok(ProviderAbility::available().with_models(models))
    }
}

#[async_trait]
impl LlmProvider for ChatGpt {
    fn supports(&self, option: &LlmOption) -> bool {
        matches!(option, LlmOption::ChatGpt(_))
    }

    async fn completion(
        &self,
        messages: &[Message],
        option: &LlmOption,
    ) -> Result<String, ProviderError> {
        let option = self.option(option)?;
        tracing::info!(model = %option.model, messages = messages.len(), "completion");
        let response = self
            .client
            .post("/chat/completions")
            .timeout(COMPLETION_TIMEOUT)
            .json(&CompletionRequest::new(messages, option, false))
            .send()
            .await?;
        let parsed: CompletionResponse = ensure_success(response).await?.json().await?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        tracing::info!(length = reply.len(), "completion finished");
        Ok(reply)
    }

    async fn completion_stream(&self, messages: &[Message], option: &LlmOption, writer: PacedWriter) {
        let option = match self.option(option) {
            Ok(o) => o,
            Err(e) => return writer.fail(e).await,
        };
        tracing::info!(model = %option.model, messages = messages.len(), "completion stream");
        match self.stream_into(messages, option, &writer).await {
            Ok(()) => writer.done().await,
            Err(ProviderError::ReaderClosed) => {
                tracing::debug!("completion reader went away, stopping stream");
            }
            Err(e) => writer.fail(e).await,
        }
    }
}
