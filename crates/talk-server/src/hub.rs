//! Per-client event routing.
//!
//! Every client holds one long-lived subscription (SSE or WebSocket) keyed by
//! its [`StreamId`]. Pipelines publish events by stream id; the hub forwards
//! them to that subscriber's bounded outbound queue. A single writer task per
//! connection drains the queue, so events for one stream reach the wire in
//! publish order.

use crate::events::{Event, Frame};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use talk_providers::CapabilityRegistry;
use talk_types::StreamId;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

struct Subscriber {
    session_id: Uuid,
    sender: mpsc::Sender<Frame>,
    heartbeat: JoinHandle<()>,
}

type SubscriberMap = HashMap<StreamId, Subscriber>;

/// Routes events to subscribers and keeps idle subscriptions alive.
#[derive(Clone)]
pub struct EventHub {
    subscribers: Arc<RwLock<SubscriberMap>>,
    registry: Arc<CapabilityRegistry>,
    heartbeat_interval: Duration,
    queue_capacity: usize,
}

impl EventHub {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        heartbeat_interval: Duration,
        queue_capacity: usize,
    ) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            registry,
            heartbeat_interval,
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Creates an outbound queue sized for one subscriber.
    pub fn channel(&self) -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        mpsc::channel(self.queue_capacity)
    }

    /// Registers `sender` as the subscriber for `stream_id`.
    ///
    /// The current ability snapshot is queued before the subscription becomes
    /// visible to publishers, so it is always the first event a client sees.
    /// An existing subscriber for the same stream id is replaced and its
    /// heartbeat stopped.
    ///
    /// Returns the session id to pass to [`remove_session`](Self::remove_session).
    pub async fn subscribe(&self, stream_id: StreamId, sender: mpsc::Sender<Frame>) -> Uuid {
        let session_id = Uuid::new_v4();

        let report = self.registry.refresh_ability().await;
        push(&stream_id, &sender, &Event::ability(&report.ability));

        let heartbeat = spawn_heartbeat(stream_id.clone(), sender.clone(), self.heartbeat_interval);
        let previous = self.subscribers.write().await.insert(
            stream_id.clone(),
            Subscriber {
                session_id,
                sender,
                heartbeat,
            },
        );

        if let Some(previous) = previous {
            previous.heartbeat.abort();
            tracing::info!(stream_id = %stream_id, "replaced existing subscription");
        } else {
            tracing::info!(stream_id = %stream_id, %session_id, "subscribed");
        }
        session_id
    }

    /// Removes the subscriber for `stream_id` and stops its heartbeat.
    ///
    /// Idempotent: returns `false` when nothing was subscribed.
    pub async fn unsubscribe(&self, stream_id: &StreamId) -> bool {
        let removed = self.subscribers.write().await.remove(stream_id);
        match removed {
            Some(subscriber) => {
                subscriber.heartbeat.abort();
                tracing::info!(stream_id = %stream_id, "unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Removes the subscriber only if it is still the session that connected.
    ///
    /// Connection handlers call this on disconnect; a client that already
    /// reconnected with the same stream id keeps its new subscription.
    pub async fn remove_session(&self, stream_id: &StreamId, session_id: Uuid) {
        let mut subscribers = self.subscribers.write().await;
        match subscribers.get(stream_id) {
            Some(current) if current.session_id == session_id => {}
            // stale removal or already gone
            _ => return,
        }
        if let Some(subscriber) = subscribers.remove(stream_id) {
            subscriber.heartbeat.abort();
            tracing::info!(stream_id = %stream_id, %session_id, "subscription closed");
        }
    }

    /// Delivers `event` to the subscriber of `stream_id`.
    ///
    /// Best effort: returns `false` without error when no one is subscribed or
    /// the subscriber's queue is full.
    pub async fn publish(&self, stream_id: &StreamId, event: Event) -> bool {
        let subscribers = self.subscribers.read().await;
        match subscribers.get(stream_id) {
            Some(subscriber) => push(stream_id, &subscriber.sender, &event),
            None => {
                tracing::debug!(stream_id = %stream_id, kind = %event.kind, "no subscriber, dropping event");
                false
            }
        }
    }

    pub async fn is_subscribed(&self, stream_id: &StreamId) -> bool {
        self.subscribers.read().await.contains_key(stream_id)
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Stops every heartbeat and forgets all subscribers. Used at shutdown.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.subscribers.write().await.drain().collect();
        for (_, subscriber) in &drained {
            subscriber.heartbeat.abort();
        }
        tracing::info!(count = drained.len(), "closed all subscriptions");
    }
}

fn push(stream_id: &StreamId, sender: &mpsc::Sender<Frame>, event: &Event) -> bool {
    let frame = match Frame::encode(event) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(stream_id = %stream_id, kind = %event.kind, "failed to serialize event: {}", e);
            return false;
        }
    };
    match sender.try_send(frame) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(frame)) => {
            tracing::warn!(
                stream_id = %stream_id,
                kind = %frame.kind,
                "dropping event for slow consumer"
            );
            false
        }
        Err(mpsc::error::TrySendError::Closed(frame)) => {
            tracing::debug!(stream_id = %stream_id, kind = %frame.kind, "subscriber gone, dropping event");
            false
        }
    }
}

fn spawn_heartbeat(
    stream_id: StreamId,
    sender: mpsc::Sender<Frame>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if sender.is_closed() {
                break;
            }
            push(&stream_id, &sender, &Event::heartbeat());
        }
    })
}

/// Removes a subscription when the connection that owns it goes away.
///
/// SSE handlers cannot observe client disconnects directly; the response
/// stream is dropped instead, and this guard travels with it.
pub struct SubscriptionGuard {
    hub: EventHub,
    stream_id: StreamId,
    session_id: Uuid,
}

impl SubscriptionGuard {
    pub fn new(hub: EventHub, stream_id: StreamId, session_id: Uuid) -> Self {
        Self {
            hub,
            stream_id,
            session_id,
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let hub = self.hub.clone();
        let stream_id = self.stream_id.clone();
        let session_id = self.session_id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { hub.remove_session(&stream_id, session_id).await });
        }
    }
}
