//! WebSocket subscription handler.
//!
//! A WebSocket carries the same events as the SSE endpoint and additionally
//! accepts text-only conversation turns from the client.

use crate::events::{Event, Frame};
use crate::middleware::StreamQuery;
use crate::pipeline::ChatRequest;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        Extension, Query, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use talk_types::{Chat, StreamId};
use tokio::sync::mpsc;

/// Incoming WebSocket message types.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    /// Starts a text-only conversation turn on this stream.
    #[serde(rename = "chat")]
    Chat(Chat),
}

/// Handler for `GET /api/ws?stream=<id>`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
    Query(params): Query<StreamQuery>,
) -> Response {
    let stream_id = match params.stream_id() {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("websocket connect rejected: {}", e);
            return e.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, stream_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, stream_id: StreamId) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = state.hub.channel();
    let session_id = state.hub.subscribe(stream_id.clone(), tx.clone()).await;

    // Single writer for this connection; everything else goes through `tx`.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(AxumMessage::Text(frame.data.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            AxumMessage::Text(text) => handle_text(&state, &stream_id, &tx, text.as_str()),
            AxumMessage::Close(_) => break,
            _ => {}
        }
    }

    state.hub.remove_session(&stream_id, session_id).await;
    send_task.abort();
    tracing::debug!(stream_id = %stream_id, "websocket closed");
}

fn handle_text(state: &AppState, stream_id: &StreamId, tx: &mpsc::Sender<Frame>, text: &str) {
    let incoming = match serde_json::from_str::<IncomingMessage>(text) {
        Ok(incoming) => incoming,
        Err(e) => {
            send_ws_error(stream_id, tx, format!("invalid message: {}", e));
            return;
        }
    };

    match incoming {
        IncomingMessage::Chat(chat) => {
            let request = ChatRequest {
                stream_id: stream_id.clone(),
                chat,
                audio: None,
            };
            if let Err(e) = state.pipeline.start(request) {
                send_ws_error(stream_id, tx, e.to_string());
            }
        }
    }
}

/// Queues an error straight onto this connection, bypassing the hub.
fn send_ws_error(stream_id: &StreamId, tx: &mpsc::Sender<Frame>, message: String) {
    match Frame::encode(&Event::rejected(message)) {
        Ok(frame) => {
            if let Err(e) = tx.try_send(frame) {
                tracing::warn!(stream_id = %stream_id, "failed to send WebSocket error to client: {}", e);
            }
        }
        Err(e) => tracing::error!("failed to serialize WebSocket error: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_frame_parses() {
        let text = r#"{"type":"chat","chatId":"c1","ms":[{"role":"user","content":"hi"}],"talkOption":{"completion":true}}"#;
        let IncomingMessage::Chat(chat) = serde_json::from_str(text).unwrap();
        assert_eq!(chat.chat_id, "c1");
        assert!(chat.talk_option.completion);
        assert_eq!(chat.ms.len(), 1);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<IncomingMessage>(r#"{"type":"subscribe"}"#).is_err());
    }
}
