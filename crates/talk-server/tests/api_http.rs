use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use talk_providers::{AbilityConfig, CapabilityRegistry, DemoLlm, DemoStt, DemoTts};
use talk_server::config::Config;
use talk_server::{app, AppState};
use tower::ServiceExt;

const STREAM_ID: &str = "0123456789abcdefABCDEF0123456789";

fn state() -> AppState {
    let registry = CapabilityRegistry::new(AbilityConfig::default())
        .with_llm(Arc::new(DemoLlm::new(Duration::ZERO)))
        .with_stt(Arc::new(DemoStt::new(Duration::ZERO)))
        .with_tts(Arc::new(DemoTts::new(Duration::ZERO)));
    AppState::new(Arc::new(registry), &Config::default())
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn chat_request(stream_id: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json");
    if let Some(id) = stream_id {
        builder = builder.header("stream-id", id);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn text_chat(last_role: &str) -> String {
    json!({
        "chatId": "chat-9",
        "ms": [{"role": last_role, "content": "hello"}],
        "talkOption": {"completion": true, "llmOption": {"chatGPT": {}}}
    })
    .to_string()
}

fn multipart_body(boundary: &str, chat: &str, audio: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"chat\"\r\n\r\n{chat}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"q.webm\"\r\nContent-Type: audio/webm\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(audio);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

fn audio_chat_request(chat: &str, audio: &[u8]) -> Request<Body> {
    let boundary = "talk-test-boundary";
    Request::builder()
        .method("POST")
        .uri("/api/audio-chat")
        .header("stream-id", STREAM_ID)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(multipart_body(boundary, chat, audio)))
        .unwrap()
}

#[tokio::test]
async fn health_check_returns_ok() {
    let response = app(state())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn ability_lists_registered_providers() {
    let response = app(state())
        .oneshot(Request::builder().uri("/api/ability").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["llm"]["available"], true);
    assert_eq!(json["llm"]["chatGPT"]["available"], true);
    assert_eq!(json["stt"]["whisper"]["available"], true);
    assert_eq!(json["tts"]["elevenlabs"]["voices"][0]["name"], "Rachel[demo]");
}

#[tokio::test]
async fn chat_without_stream_id_is_rejected() {
    let response = app(state())
        .oneshot(chat_request(None, &text_chat("user")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("stream-id"));
}

#[tokio::test]
async fn chat_with_short_stream_id_is_rejected() {
    let response = app(state())
        .oneshot(chat_request(Some("abc"), &text_chat("user")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_ending_with_assistant_is_rejected() {
    let response = app(state())
        .oneshot(chat_request(Some(STREAM_ID), &text_chat("assistant")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("user"));
}

#[tokio::test]
async fn chat_with_invalid_json_is_rejected() {
    let response = app(state())
        .oneshot(chat_request(Some(STREAM_ID), "{\"chatId\": 1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn valid_chat_is_accepted() {
    let response = app(state())
        .oneshot(chat_request(Some(STREAM_ID), &text_chat("user")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["chatId"], "chat-9");
}

#[tokio::test]
async fn audio_chat_is_accepted() {
    let chat = json!({"chatId": "voice-1", "talkOption": {"toText": true}}).to_string();
    let response = app(state())
        .oneshot(audio_chat_request(&chat, b"not really webm"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["chatId"], "voice-1");
}

#[tokio::test]
async fn audio_chat_with_empty_audio_is_rejected() {
    let chat = json!({"chatId": "voice-2"}).to_string();
    let response = app(state())
        .oneshot(audio_chat_request(&chat, b""))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_speech_is_not_found() {
    let response = app(state())
        .oneshot(
            Request::builder()
                .uri("/api/speech/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cached_speech_is_served() {
    let state = state();
    let speech_id = state
        .speech
        .insert(talk_providers::demo::silent_wav(Duration::from_millis(10)));

    let response = app(state)
        .oneshot(
            Request::builder()
                .uri(format!("/api/speech/{}", speech_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "audio/wav");
}

#[tokio::test]
async fn events_without_stream_is_rejected() {
    let response = app(state())
        .oneshot(Request::builder().uri("/api/events").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
