//! SSE and WebSocket subscriptions against a live server.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use talk_providers::{AbilityConfig, CapabilityRegistry, DemoLlm, DemoStt, DemoTts};
use talk_server::config::Config;
use talk_server::{app, AppState};
use talk_types::StreamId;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

async fn start_server() -> (String, AppState) {
    let mut config = Config::default();
    config.pace.total_ms_when_done = 50.0;
    config.pace.min_speed_when_done = 1.0;
    start_server_with(config).await
}

async fn start_server_with(config: Config) -> (String, AppState) {
    let registry = CapabilityRegistry::new(AbilityConfig::default())
        .with_llm(Arc::new(DemoLlm::new(Duration::ZERO)))
        .with_stt(Arc::new(DemoStt::new(Duration::ZERO)))
        .with_tts(Arc::new(DemoTts::new(Duration::ZERO)));
    let state = AppState::new(Arc::new(registry), &config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr.to_string(), state)
}

fn chat_body() -> Value {
    json!({
        "chatId": "live-1",
        "ms": [{"role": "user", "content": "tell me something"}],
        "talkOption": {"completion": true, "llmOption": {"chatGPT": {}}}
    })
}

/// Reads SSE chunks until `needle` shows up, returning everything read.
async fn read_sse_until(response: &mut reqwest::Response, needle: &str) -> String {
    let mut seen = String::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while !seen.contains(needle) {
            let chunk = response
                .chunk()
                .await
                .expect("failed to read chunk")
                .expect("stream closed");
            seen.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await
    .expect("timed out waiting for SSE event");
    seen
}

/// Next text frame as JSON, skipping pings and other control frames.
async fn next_event<S>(ws: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("timed out")
            .expect("socket closed")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn wait_until_unsubscribed(state: &AppState, stream_id: &StreamId) {
    for _ in 0..100 {
        if !state.hub.is_subscribed(stream_id).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("subscription was not removed");
}

#[tokio::test]
async fn sse_first_event_is_ability_then_chat_events() {
    let (addr, state) = start_server().await;
    let stream = "S".repeat(32);
    let client = reqwest::Client::new();

    let mut response = client
        .get(format!("http://{}/api/events?stream={}", addr, stream))
        .send()
        .await
        .expect("failed to connect to SSE stream");
    assert!(response.status().is_success());

    let first = read_sse_until(&mut response, "\n\n").await;
    assert!(first.starts_with("event: ability"), "got {:?}", first);
    assert!(first.contains("\"chatGPT\""));

    let accepted = client
        .post(format!("http://{}/api/chat", addr))
        .header("stream-id", &stream)
        .json(&chat_body())
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), reqwest::StatusCode::OK);

    let seen = read_sse_until(&mut response, "event: text-eof").await;
    assert!(seen.contains("event: thinking"));
    assert!(seen.contains("event: typing"));
    assert!(seen.find("event: thinking") < seen.find("event: typing"));
    assert!(state.hub.is_subscribed(&StreamId::parse(&stream).unwrap()).await);
}

#[tokio::test]
async fn sse_idle_stream_gets_hub_heartbeats_only() {
    let mut config = Config::default();
    config.stream.heartbeat_secs = 1;
    let (addr, _state) = start_server_with(config).await;

    let stream = "H".repeat(32);
    let mut response = reqwest::get(format!("http://{}/api/events?stream={}", addr, stream))
        .await
        .unwrap();
    assert!(response.status().is_success());

    let seen = read_sse_until(&mut response, "event: heartbeat").await;
    assert!(seen.starts_with("event: ability"));
    // no transport-level comment frames besides the hub's own events
    assert!(!seen.lines().any(|line| line.starts_with(':')), "got {:?}", seen);
}

#[tokio::test]
async fn sse_rejects_malformed_stream() {
    let (addr, _state) = start_server().await;
    let response = reqwest::get(format!("http://{}/api/events?stream=short", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn websocket_chat_round_trip() {
    let (addr, state) = start_server().await;
    let stream = "W".repeat(32);

    let (mut ws, _) = connect_async(format!("ws://{}/api/ws?stream={}", addr, stream))
        .await
        .expect("failed to connect");

    let first = next_event(&mut ws).await;
    assert_eq!(first["type"], "ability");

    let mut frame = chat_body();
    frame["type"] = json!("chat");
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();

    let mut kinds = Vec::new();
    let reply = loop {
        let event = next_event(&mut ws).await;
        let kind = event["type"].as_str().unwrap().to_string();
        if kind == "text-eof" {
            break event;
        }
        kinds.push(kind);
    };

    assert_eq!(kinds.first().map(String::as_str), Some("thinking"));
    assert!(kinds[1..].iter().all(|k| k == "typing" || k == "heartbeat"));
    assert_eq!(reply["chatId"], "live-1");
    assert!(!reply["text"].as_str().unwrap().is_empty());

    ws.close(None).await.unwrap();
    wait_until_unsubscribed(&state, &StreamId::parse(&stream).unwrap()).await;
}

#[tokio::test]
async fn websocket_invalid_frame_gets_error() {
    let (addr, _state) = start_server().await;
    let stream = "E".repeat(32);

    let (mut ws, _) = connect_async(format!("ws://{}/api/ws?stream={}", addr, stream))
        .await
        .expect("failed to connect");
    assert_eq!(next_event(&mut ws).await["type"], "ability");

    let frame = json!({
        "type": "chat",
        "chatId": "bad",
        "ms": [{"role": "assistant", "content": "no question here"}]
    });
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();

    let event = next_event(&mut ws).await;
    assert_eq!(event["type"], "error");
    assert!(event["err"].as_str().unwrap().contains("malformed request"));
}
