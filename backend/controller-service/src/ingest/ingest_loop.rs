//! Kafka → broadcast ingest loop
//!
//! One loop runs per instance for the lifetime of the process:
//!
//! ```text
//! Starting ──subscribe ok──▶ Consuming ◀──re-subscribe ok── Backoff
//!    │                          │  broker error                ▲
//!    │ subscribe error          └──────────────────────────────┘
//!    └──────────────────────────────────────────────────────▶ Backoff
//! any state ──shutdown──▶ Stopping (close session, exit)
//! ```
//!
//! Broker failures never end the loop: an instance that stops consuming drops
//! out of the fan-out set without any external signal.

use super::backoff::{BackoffConfig, BackoffController};
use super::codec;
use super::source::{MessageSource, RawMessage, SourceError};
use crate::broadcast::{BroadcastError, Broadcaster, MEASUREMENT_EVENT};
use crate::metrics;
use crate::shutdown::{self, ShutdownReceiver};
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    Starting,
    Consuming,
    Backoff,
    Stopping,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub topic: String,
    pub group_id: String,
    /// Upper bound on a single blocking pull
    pub poll_timeout: Duration,
    /// A publish still pending after this is abandoned and the record dropped
    pub publish_timeout: Duration,
    pub backoff: BackoffConfig,
}

impl IngestConfig {
    pub fn new(topic: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            group_id: group_id.into(),
            poll_timeout: Duration::from_secs(1),
            publish_timeout: Duration::from_secs(5),
            backoff: BackoffConfig::default(),
        }
    }
}

pub struct IngestLoop<S: MessageSource> {
    config: IngestConfig,
    source: S,
    backoff: BackoffController,
    broadcaster: Arc<dyn Broadcaster>,
    shutdown: ShutdownReceiver,
    state_tx: watch::Sender<IngestState>,
}

impl<S: MessageSource> IngestLoop<S> {
    pub fn new(
        config: IngestConfig,
        source: S,
        broadcaster: Arc<dyn Broadcaster>,
        shutdown: ShutdownReceiver,
    ) -> Self {
        let (state_tx, _) = watch::channel(IngestState::Starting);
        Self {
            backoff: BackoffController::new(config.backoff),
            config,
            source,
            broadcaster,
            shutdown,
            state_tx,
        }
    }

    /// Observe lifecycle transitions (used by the readiness probe).
    pub fn state(&self) -> watch::Receiver<IngestState> {
        self.state_tx.subscribe()
    }

    /// Run until shutdown, then close the broker session.
    pub async fn run(mut self) {
        info!(
            topic = %self.config.topic,
            group_id = %self.config.group_id,
            poll_timeout_ms = self.config.poll_timeout.as_millis() as u64,
            "Ingest loop starting"
        );

        let mut state = IngestState::Starting;
        loop {
            if shutdown::is_cancelled(&self.shutdown) {
                state = IngestState::Stopping;
            }
            self.state_tx.send_replace(state);

            state = match state {
                IngestState::Starting => self.subscribe().await,
                IngestState::Consuming => self.consume().await,
                IngestState::Backoff => self.back_off().await,
                IngestState::Stopping => break,
            };
        }

        if let Err(e) = self.source.close().await {
            debug!(error = %e, "Ignoring error while closing broker session");
        }
        info!(group_id = %self.config.group_id, "Ingest loop stopped");
    }

    async fn subscribe(&mut self) -> IngestState {
        match self
            .source
            .subscribe(&self.config.topic, &self.config.group_id)
            .await
        {
            Ok(()) => IngestState::Consuming,
            Err(e) => {
                self.record_broker_failure(&e);
                IngestState::Backoff
            }
        }
    }

    async fn consume(&mut self) -> IngestState {
        loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown::cancelled(&mut self.shutdown) => return IngestState::Stopping,
                polled = self.source.poll_next(self.config.poll_timeout) => polled,
            };

            match polled {
                Ok(None) => continue,
                Ok(Some(message)) => {
                    if self.handle_message(message).await.is_break() {
                        return IngestState::Stopping;
                    }
                }
                Err(e) => {
                    self.record_broker_failure(&e);
                    return IngestState::Backoff;
                }
            }
        }
    }

    /// Sleep out the current delay, then try to subscribe again.
    async fn back_off(&mut self) -> IngestState {
        let delay = self.backoff.current_delay();

        let interrupted = tokio::select! {
            biased;
            _ = shutdown::cancelled(&mut self.shutdown) => true,
            _ = tokio::time::sleep(delay) => false,
        };

        if interrupted {
            IngestState::Stopping
        } else {
            self.subscribe().await
        }
    }

    async fn handle_message(&mut self, message: RawMessage) -> ControlFlow<()> {
        let Some(payload) = message.non_empty_payload() else {
            debug!(
                partition = message.partition,
                offset = message.offset,
                "Empty Kafka message, skipping"
            );
            return ControlFlow::Continue(());
        };

        let measurement = match codec::decode(payload) {
            Ok(m) => m,
            Err(e) => {
                metrics::record_decode_failure();
                warn!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Invalid message payload (skipping)"
                );
                return ControlFlow::Continue(());
            }
        };
        metrics::record_message_consumed();

        let publish_timeout = self.config.publish_timeout;
        let publish = tokio::time::timeout(
            publish_timeout,
            self.broadcaster.publish(MEASUREMENT_EVENT, &measurement),
        );
        let published = tokio::select! {
            biased;
            _ = shutdown::cancelled(&mut self.shutdown) => return ControlFlow::Break(()),
            published = publish => published
                .unwrap_or_else(|_| Err(BroadcastError::Timeout(publish_timeout))),
        };

        if let Err(e) = published {
            metrics::record_broadcast_failure();
            warn!(
                sensor_id = %measurement.sensor_id,
                error = %e,
                "Failed to broadcast measurement, continuing"
            );
        }

        self.backoff.on_success();
        metrics::set_backoff(self.backoff.current_delay());
        ControlFlow::Continue(())
    }

    fn record_broker_failure(&mut self, err: &SourceError) {
        self.backoff.on_failure();
        let delay = self.backoff.current_delay();
        metrics::record_broker_failure(err.kind());
        metrics::set_backoff(delay);

        match err {
            SourceError::Transient(_) => warn!(
                topic = %self.config.topic,
                error = %err,
                retry_in_secs = delay.as_secs_f64(),
                "Kafka topic not ready or broker unavailable, retrying"
            ),
            SourceError::Unexpected(_) => error!(
                topic = %self.config.topic,
                error = %err,
                retry_in_secs = delay.as_secs_f64(),
                "Unexpected Kafka failure, retrying"
            ),
        }
    }
}
