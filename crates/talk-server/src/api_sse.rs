//! SSE event stream handler.

use crate::api::ApiError;
use crate::hub::SubscriptionGuard;
use crate::middleware::StreamQuery;
use crate::AppState;
use axum::{
    extract::{Extension, Query},
    response::{sse::Event, Sse},
};
use futures_util::Stream;
use std::{convert::Infallible, sync::Arc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Handler for `GET /api/events?stream=<id>`.
///
/// Streams every event published for the stream id, starting with the
/// ability snapshot, with a `heartbeat` event whenever the stream is idle
/// for the configured interval. The subscription ends when the client
/// disconnects.
pub async fn get_event_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let stream_id = params.stream_id()?;

    let (tx, rx) = state.hub.channel();
    let session_id = state.hub.subscribe(stream_id.clone(), tx).await;
    let guard = SubscriptionGuard::new(state.hub.clone(), stream_id, session_id);

    let stream = ReceiverStream::new(rx).map(move |frame| {
        // the guard lives as long as the response stream
        let _ = &guard;
        Ok(Event::default().event(frame.kind.as_str()).data(frame.data))
    });

    // idle connections are kept open by the hub's heartbeat events
    Ok(Sse::new(stream))
}
