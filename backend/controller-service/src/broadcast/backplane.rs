//! Redis pub/sub backplane
//!
//! `publish` puts every event on one Redis channel. Each instance runs
//! [`RedisBackplane::run_relay`], which listens on that channel and pushes the
//! event to its own WebSocket subscribers. Local publishes travel the same
//! path, so a client sees each event once no matter which instance consumed it.

use super::{BroadcastError, Broadcaster, ClientFrame, SubscriberHub};
use crate::ingest::{BackoffConfig, BackoffController};
use crate::metrics;
use crate::models::Measurement;
use crate::shutdown::{self, ShutdownReceiver};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Message format on the Redis channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackplaneEnvelope {
    /// Instance that consumed the event from Kafka
    pub origin: String,
    pub event: String,
    pub data: Measurement,
}

impl BackplaneEnvelope {
    /// Client frame for an envelope read off the channel.
    pub fn frame_from_json(payload: &str) -> Result<String, serde_json::Error> {
        let envelope: BackplaneEnvelope = serde_json::from_str(payload)?;
        ClientFrame::new(envelope.event, envelope.data).to_json()
    }
}

/// Publisher side of the backplane plus the relay loop.
///
/// Construction does no I/O. The shared connection is opened on first use and
/// a failed attempt is retried by the next publish, so Redis being down at
/// boot does not take the instance with it.
#[derive(Clone)]
pub struct RedisBackplane {
    client: Client,
    manager: Arc<OnceCell<ConnectionManager>>,
    channel: String,
    origin: String,
}

impl RedisBackplane {
    /// Validates the URL only.
    pub fn new(
        redis_url: &str,
        channel: impl Into<String>,
        origin: impl Into<String>,
    ) -> RedisResult<Self> {
        let client = Client::open(redis_url)?;

        Ok(Self {
            client,
            manager: Arc::new(OnceCell::new()),
            channel: channel.into(),
            origin: origin.into(),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    async fn connection(&self) -> RedisResult<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(manager.clone())
    }

    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<_, ()>(&mut conn).await
    }

    /// Relay backplane events to local subscribers until shutdown.
    ///
    /// Pub/sub needs a dedicated connection; when it drops, the relay
    /// reconnects with exponential backoff.
    pub async fn run_relay(
        &self,
        hub: SubscriberHub,
        mut shutdown: ShutdownReceiver,
        backoff_config: BackoffConfig,
    ) {
        let mut backoff = BackoffController::new(backoff_config);

        while !shutdown::is_cancelled(&shutdown) {
            match self.relay_until_disconnect(&hub, &mut shutdown, &mut backoff).await {
                Ok(()) => {
                    if shutdown::is_cancelled(&shutdown) {
                        break;
                    }
                    warn!(channel = %self.channel, "Backplane subscription ended, reconnecting");
                }
                Err(e) => {
                    warn!(
                        channel = %self.channel,
                        error = %e,
                        retry_in_secs = backoff.current_delay().as_secs_f64(),
                        "Backplane relay failed, retrying"
                    );
                }
            }

            backoff.on_failure();
            tokio::select! {
                biased;
                _ = shutdown::cancelled(&mut shutdown) => break,
                _ = tokio::time::sleep(backoff.current_delay()) => {}
            }
        }

        info!(channel = %self.channel, "Backplane relay stopped");
    }

    async fn relay_until_disconnect(
        &self,
        hub: &SubscriberHub,
        shutdown: &mut ShutdownReceiver,
        backoff: &mut BackoffController,
    ) -> RedisResult<()> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        backoff.on_success();
        info!(channel = %self.channel, "Backplane relay subscribed");

        let mut messages = pubsub.on_message();
        loop {
            let msg = tokio::select! {
                biased;
                _ = shutdown::cancelled(shutdown) => return Ok(()),
                msg = messages.next() => msg,
            };

            let Some(msg) = msg else {
                return Ok(());
            };

            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "Non-text backplane payload, skipping");
                    continue;
                }
            };

            match BackplaneEnvelope::frame_from_json(&payload) {
                Ok(frame) => {
                    let delivered = hub.broadcast(frame).await;
                    metrics::record_backplane_relay();
                    debug!(delivered, "Relayed backplane event");
                }
                Err(e) => warn!(error = %e, "Malformed backplane envelope, skipping"),
            }
        }
    }
}

#[async_trait]
impl Broadcaster for RedisBackplane {
    async fn publish(&self, event: &str, record: &Measurement) -> Result<(), BroadcastError> {
        let envelope = BackplaneEnvelope {
            origin: self.origin.clone(),
            event: event.to_string(),
            data: record.clone(),
        };
        let payload = serde_json::to_string(&envelope)?;

        let mut conn = self.connection().await?;
        conn.publish::<_, _, ()>(&self.channel, payload).await?;
        Ok(())
    }
}
