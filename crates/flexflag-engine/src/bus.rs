//! Subscription bus: fans catalog change events out to in-process
//! subscribers (the cache) and, through a pluggable delivery adapter, to
//! connected SDK streams.
//!
//! `SubscriptionBus` is the per-environment fan-out: any number of
//! subscribers per environment over `tokio::sync::broadcast`, with
//! `DeliveryAdapter` as the pluggable transport seam on the SDK-facing
//! consumer side.

use crate::model::Flag;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;

/// Backlog capacity per environment channel. A slow subscriber that falls
/// this far behind the newest event sees a `Lagged` error on its next
/// `recv` and should resubscribe with `hello_snapshot` to recover —
/// at-least-once delivery, not exactly-once.
pub const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

/// `{ event_type, environment_key, flag_key, flag_snapshot?, version }`.
///
/// Consumers are expected to be idempotent and version-gated: replaying
/// or re-delivering the same event, or receiving it after a newer one for
/// a different key, must never regress observed state.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub environment_key: String,
    pub flag_key: String,
    pub flag_snapshot: Option<Arc<Flag>>,
    pub version: u64,
}

/// Per-environment broadcast fan-out.
///
/// Every event for a given `(environment_key, flag_key)` is published to
/// the same environment's channel in call order, so per-key delivery is
/// FIFO; events for different keys within the same environment share a
/// channel too, but nothing here orders them against each other —
/// cross-key ordering is explicitly not guaranteed.
#[derive(Clone)]
pub struct SubscriptionBus {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<Event>>>>,
}

impl SubscriptionBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn channel(&self, env: &str) -> broadcast::Sender<Event> {
        if let Some(sender) = self.channels.read().unwrap().get(env) {
            return sender.clone();
        }
        self.channels
            .write()
            .unwrap()
            .entry(env.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publishes an event to every current subscriber of its environment.
    /// A channel with no subscribers silently drops the event — there is
    /// nothing to replay to, and the cache always re-derives state from
    /// the catalog on its next miss regardless.
    pub fn publish(&self, event: Event) {
        let _ = self.channel(&event.environment_key).send(event);
    }

    /// Subscribes to incremental events for `env`. This is the raw
    /// broadcast primitive with no state snapshot attached; a caller that
    /// needs the current-state "hello" message delivered atomically with
    /// registration should go through `Catalog::subscribe`, which holds
    /// the catalog's state lock across both the snapshot read and this
    /// call so no event can land in the gap between them.
    pub fn subscribe(&self, env: &str) -> broadcast::Receiver<Event> {
        self.channel(env).subscribe()
    }
}

impl Default for SubscriptionBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport-agnostic delivery adapter for SDK-facing streams (SSE,
/// long-polling). The engine only calls `deliver`; choosing and driving
/// the actual transport lives outside this crate.
#[async_trait::async_trait]
pub trait DeliveryAdapter: Send + Sync {
    async fn deliver(&self, event: Event);
}

/// A delivery adapter that simply drops events — the default when no SDK
/// stream transport is wired in. Exercises the pluggable seam in tests
/// without pulling in a real transport.
#[derive(Default)]
pub struct NullDeliveryAdapter;

#[async_trait::async_trait]
impl DeliveryAdapter for NullDeliveryAdapter {
    async fn deliver(&self, _event: Event) {}
}

/// Drives a subscriber's receiver into a `DeliveryAdapter`, forwarding
/// events until the channel closes or the task is aborted. A `Lagged`
/// error just means the bus dropped events the subscriber didn't consume
/// fast enough; delivery resumes from the next available event rather
/// than terminating the stream (at-least-once, not exactly-once).
pub async fn pump(receiver: broadcast::Receiver<Event>, adapter: Arc<dyn DeliveryAdapter>) {
    let mut stream = BroadcastStream::new(receiver);
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => adapter.deliver(event).await,
            Err(BroadcastStreamRecvError::Lagged(_)) => continue,
        }
    }
}
