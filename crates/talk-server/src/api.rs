//! API handlers for the Talk server.

use crate::middleware::StreamContext;
use crate::pipeline::{ChatRequest, PipelineError};
use crate::AppState;
use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, Extension, Json, Multipart, Path,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use talk_providers::AudioInput;
use talk_types::{Ability, Chat};
use thiserror::Error;

/// File name used when an upload does not carry one.
const DEFAULT_AUDIO_FILE_NAME: &str = "audio.webm";

/// Response body for an accepted conversation turn.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatAccepted {
    #[serde(rename = "chatId")]
    pub chat_id: String,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Malformed(msg) => ApiError::BadRequest(msg),
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadRequest(format!("invalid multipart body: {}", e.body_text()))
    }
}

/// Handler for `GET /api/ability`.
///
/// Returns the cached snapshot, describing every provider first when the
/// cache has expired.
pub async fn ability_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Ability> {
    let report = state.registry.refresh_ability().await;
    for failure in &report.failures {
        tracing::warn!(
            kind = %failure.kind,
            provider = failure.provider,
            "provider failed to describe itself: {}",
            failure.message
        );
    }
    Json(report.ability.as_ref().clone())
}

/// Handler for `POST /api/chat`.
///
/// Accepts a text-only turn. The reply arrives on the client's event stream.
pub async fn chat_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(StreamContext(stream_id)): Extension<StreamContext>,
    payload: Result<Json<Chat>, JsonRejection>,
) -> Result<Json<ChatAccepted>, ApiError> {
    let Json(chat) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let chat_id = chat.chat_id.clone();

    state.pipeline.start(ChatRequest {
        stream_id,
        chat,
        audio: None,
    })?;

    Ok(Json(ChatAccepted { chat_id }))
}

/// Handler for `POST /api/audio-chat`.
///
/// Expects a multipart body with a `chat` field holding the JSON request and
/// an `audio` file field.
pub async fn audio_chat_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(StreamContext(stream_id)): Extension<StreamContext>,
    mut multipart: Multipart,
) -> Result<Json<ChatAccepted>, ApiError> {
    let mut chat: Option<Chat> = None;
    let mut audio: Option<AudioInput> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("chat") => {
                let text = field.text().await?;
                chat = Some(
                    serde_json::from_str(&text)
                        .map_err(|e| ApiError::BadRequest(format!("invalid chat json: {}", e)))?,
                );
            }
            Some("audio") => {
                let file_name = field
                    .file_name()
                    .filter(|name| !name.is_empty())
                    .unwrap_or(DEFAULT_AUDIO_FILE_NAME)
                    .to_string();
                let bytes = field.bytes().await?;
                audio = Some(AudioInput::new(bytes.to_vec(), file_name));
            }
            other => {
                tracing::debug!(field = ?other, "ignoring unknown multipart field");
            }
        }
    }

    let chat = chat.ok_or_else(|| ApiError::BadRequest("missing chat field".to_string()))?;
    let audio = audio.ok_or_else(|| ApiError::BadRequest("missing audio field".to_string()))?;
    let chat_id = chat.chat_id.clone();

    state.pipeline.start(ChatRequest {
        stream_id,
        chat,
        audio: Some(audio),
    })?;

    Ok(Json(ChatAccepted { chat_id }))
}

/// Handler for `GET /api/speech/{speechId}`.
pub async fn speech_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(speech_id): Path<String>,
) -> Result<Response, ApiError> {
    let audio = state
        .speech
        .get(&speech_id)
        .ok_or_else(|| ApiError::NotFound(format!("speech {}", speech_id)))?;

    let content_type = audio_content_type(&audio);
    Ok(([(header::CONTENT_TYPE, content_type)], audio.as_ref().clone()).into_response())
}

/// Guesses the MIME type of synthesized audio from its header bytes.
fn audio_content_type(audio: &[u8]) -> &'static str {
    if audio.starts_with(b"RIFF") {
        "audio/wav"
    } else if audio.starts_with(b"OggS") {
        "audio/ogg"
    } else {
        "audio/mpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_sniffing() {
        assert_eq!(audio_content_type(b"RIFF\0\0\0\0WAVE"), "audio/wav");
        assert_eq!(audio_content_type(b"OggS\0"), "audio/ogg");
        assert_eq!(audio_content_type(b"ID3\x04"), "audio/mpeg");
        assert_eq!(audio_content_type(b""), "audio/mpeg");
    }

    #[test]
    fn malformed_pipeline_error_is_bad_request() {
        let error: ApiError = PipelineError::Malformed("empty".to_string()).into();
        assert!(matches!(error, ApiError::BadRequest(_)));
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
