//! Fan-out of decoded measurements to connected subscribers
//!
//! - `hub`: WebSocket subscribers connected to this instance
//! - `backplane`: Redis pub/sub relay so every instance serves every event

use crate::models::Measurement;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod backplane;
pub mod hub;

pub use backplane::{BackplaneEnvelope, RedisBackplane};
pub use hub::{SubscriberHub, SubscriberId};

/// Logical event name clients listen for.
pub const MEASUREMENT_EVENT: &str = "measurement";

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("backplane error: {0}")]
    Backplane(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport closed")]
    Closed,
}

/// Hands a record to the subscriber transport.
///
/// `Ok` means the transport accepted the event, not that any subscriber has
/// received it. Delivery to individual clients is fire-and-forget.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, event: &str, record: &Measurement) -> Result<(), BroadcastError>;
}

/// Text frame pushed to WebSocket clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    pub data: Measurement,
}

impl ClientFrame {
    pub fn new(event: impl Into<String>, data: Measurement) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
