use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("provider {provider} does not accept this option")]
    UnsupportedOption { provider: &'static str },

    #[error("provider did not answer within {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("stream ended before the provider finished writing")]
    StreamAborted,

    #[error("stream reader has gone away")]
    ReaderClosed,

    #[error("{failed} provider(s) failed the health check: {summary}")]
    CheckFailed { failed: usize, summary: String },
}

/// Passes a successful response through, turning any other status into
/// [`ProviderError::Api`] with the response body as the message.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
    Err(ProviderError::Api {
        status: status.as_u16(),
        message,
    })
}
