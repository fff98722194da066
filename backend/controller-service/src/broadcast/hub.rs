use crate::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

/// Unique identifier for a connected WebSocket subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Subscribers connected to this instance.
///
/// Every subscriber receives every frame; there is no per-topic routing.
/// Dead senders are pruned during broadcast so a session that went away
/// without deregistering does not leak.
#[derive(Default, Clone)]
pub struct SubscriberHub {
    inner: Arc<RwLock<HashMap<SubscriberId, UnboundedSender<String>>>>,
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and return the channel its frames arrive on.
    pub async fn add_subscriber(&self) -> (SubscriberId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let subscriber_id = SubscriberId::new();

        let mut guard = self.inner.write().await;
        guard.insert(subscriber_id, tx);
        metrics::set_connected_subscribers(guard.len());

        tracing::debug!(
            subscriber_id = %subscriber_id,
            total = guard.len(),
            "Subscriber connected"
        );

        (subscriber_id, rx)
    }

    /// Must be called when a WebSocket session ends.
    pub async fn remove_subscriber(&self, subscriber_id: SubscriberId) -> bool {
        let mut guard = self.inner.write().await;
        let removed = guard.remove(&subscriber_id).is_some();
        metrics::set_connected_subscribers(guard.len());

        if removed {
            tracing::debug!(
                subscriber_id = %subscriber_id,
                remaining = guard.len(),
                "Subscriber disconnected"
            );
        }
        removed
    }

    /// Push a frame to every subscriber; returns how many accepted it.
    pub async fn broadcast(&self, frame: String) -> usize {
        let mut guard = self.inner.write().await;
        let before = guard.len();

        guard.retain(|_, sender| sender.send(frame.clone()).is_ok());

        let after = guard.len();
        if before != after {
            metrics::set_connected_subscribers(after);
            tracing::debug!(
                pruned = before - after,
                active = after,
                "Cleaned up dead subscribers during broadcast"
            );
        }
        after
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.read().await.len()
    }
}
