//! Broker abstraction used by the ingest loop
//!
//! The loop only needs to subscribe, pull the next message with a bounded
//! wait, and close. Kafka satisfies this through [`super::KafkaMessageSource`];
//! tests drive the loop with in-memory sources.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// A message as pulled from the broker, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub payload: Option<Vec<u8>>,
    pub partition: i32,
    pub offset: i64,
}

impl RawMessage {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: Some(payload.into()),
            partition: 0,
            offset: 0,
        }
    }

    /// Payload bytes, or `None` for a tombstone or empty value.
    pub fn non_empty_payload(&self) -> Option<&[u8]> {
        self.payload.as_deref().filter(|p| !p.is_empty())
    }
}

/// Broker failures, classified for retry handling.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Topic not yet created, connection drop, broker-side error. Retried quietly.
    #[error("transient broker failure: {0}")]
    Transient(String),

    /// Anything not otherwise classified. Retried as well, but logged as an error.
    #[error("unexpected broker failure: {0}")]
    Unexpected(String),
}

impl SourceError {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Transient(_) => "transient",
            SourceError::Unexpected(_) => "unexpected",
        }
    }
}

#[async_trait]
pub trait MessageSource: Send {
    /// Join `group_id` and subscribe to `topic`. Called again after a backoff.
    async fn subscribe(&mut self, topic: &str, group_id: &str) -> Result<(), SourceError>;

    /// Next message, or `None` if nothing arrived within `timeout`.
    async fn poll_next(&mut self, timeout: Duration) -> Result<Option<RawMessage>, SourceError>;

    /// Leave the group and release the client.
    async fn close(&mut self) -> Result<(), SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_payload() {
        assert_eq!(RawMessage::new("x").non_empty_payload(), Some(&b"x"[..]));
        assert_eq!(RawMessage::new("").non_empty_payload(), None);

        let tombstone = RawMessage {
            payload: None,
            partition: 3,
            offset: 17,
        };
        assert_eq!(tombstone.non_empty_payload(), None);
    }

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(SourceError::Transient("x".into()).kind(), "transient");
        assert_eq!(SourceError::Unexpected("x".into()).kind(), "unexpected");
        assert!(SourceError::Transient("topic missing".into())
            .to_string()
            .contains("topic missing"));
    }
}
