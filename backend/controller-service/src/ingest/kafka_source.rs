//! Kafka implementation of [`MessageSource`]
//!
//! Wraps an rdkafka `StreamConsumer`. The consumer is created lazily on the
//! first `subscribe` so that a broker that is not up yet surfaces as a retryable
//! failure inside the ingest loop rather than a startup error.

use super::source::{MessageSource, RawMessage, SourceError};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where a brand-new consumer group starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    /// Replay everything still retained on the topic
    Earliest,
    /// Only events produced after the instance joined
    Latest,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

impl fmt::Display for OffsetReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OffsetReset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "earliest" | "smallest" | "beginning" => Ok(OffsetReset::Earliest),
            "latest" | "largest" | "end" => Ok(OffsetReset::Latest),
            other => Err(format!("unknown offset reset policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KafkaSourceConfig {
    pub bootstrap_servers: String,
    pub offset_reset: OffsetReset,
    pub session_timeout_ms: u64,
}

impl Default for KafkaSourceConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            offset_reset: OffsetReset::Latest,
            session_timeout_ms: 10_000,
        }
    }
}

pub struct KafkaMessageSource {
    config: KafkaSourceConfig,
    consumer: Option<StreamConsumer>,
    group_id: Option<String>,
}

impl KafkaMessageSource {
    pub fn new(config: KafkaSourceConfig) -> Self {
        Self {
            config,
            consumer: None,
            group_id: None,
        }
    }

    fn client_config(&self, group_id: &str) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.config.bootstrap_servers)
            .set("group.id", group_id)
            .set("auto.offset.reset", self.config.offset_reset.as_str())
            .set("enable.auto.commit", "true")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", self.config.session_timeout_ms.to_string());
        client_config
    }

    /// Classify `err`; a fatal error also discards the client so the next
    /// `subscribe` starts from a fresh one.
    fn on_client_error(&mut self, err: KafkaError) -> SourceError {
        if is_fatal(&err) && self.consumer.take().is_some() {
            self.group_id = None;
            warn!(error = %err, "Fatal Kafka error, discarding consumer");
        }
        classify(&err)
    }
}

#[async_trait]
impl MessageSource for KafkaMessageSource {
    async fn subscribe(&mut self, topic: &str, group_id: &str) -> Result<(), SourceError> {
        if self.group_id.as_deref() != Some(group_id) {
            self.consumer = None;
        }

        if self.consumer.is_none() {
            let consumer: StreamConsumer = self
                .client_config(group_id)
                .create()
                .map_err(|e| classify(&e))?;
            self.consumer = Some(consumer);
            self.group_id = Some(group_id.to_string());
        }

        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| SourceError::Unexpected("kafka consumer missing".to_string()))?;
        if let Err(e) = consumer.subscribe(&[topic]) {
            return Err(self.on_client_error(e));
        }

        info!(
            bootstrap = %self.config.bootstrap_servers,
            topic = %topic,
            group_id = %group_id,
            offset_reset = %self.config.offset_reset,
            "Subscribed to Kafka topic"
        );
        Ok(())
    }

    async fn poll_next(&mut self, timeout: Duration) -> Result<Option<RawMessage>, SourceError> {
        let consumer = self.consumer.as_ref().ok_or_else(|| {
            SourceError::Unexpected("poll before subscribe".to_string())
        })?;

        let polled = match tokio::time::timeout(timeout, consumer.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Ok(message)) => Ok(Some(RawMessage {
                payload: message.payload().map(<[u8]>::to_vec),
                partition: message.partition(),
                offset: message.offset(),
            })),
            Ok(Err(e)) => Err(e),
        };

        polled.map_err(|e| self.on_client_error(e))
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        if let Some(consumer) = self.consumer.take() {
            consumer.unsubscribe();
            // Dropping the consumer leaves the group and closes the client
            drop(consumer);
            debug!("Kafka consumer closed");
        }
        self.group_id = None;
        Ok(())
    }
}

fn is_fatal(err: &KafkaError) -> bool {
    err.rdkafka_error_code() == Some(RDKafkaErrorCode::Fatal)
}

/// Map an rdkafka error onto the retry taxonomy.
pub fn classify(err: &KafkaError) -> SourceError {
    if is_fatal(err) {
        return SourceError::Unexpected(err.to_string());
    }

    match err {
        KafkaError::MessageConsumption(_)
        | KafkaError::Global(_)
        | KafkaError::MetadataFetch(_)
        | KafkaError::Subscription(_)
        | KafkaError::PartitionEOF(_)
        | KafkaError::NoMessageReceived => SourceError::Transient(err.to_string()),
        _ => SourceError::Unexpected(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_reset_parse() {
        assert_eq!("earliest".parse::<OffsetReset>(), Ok(OffsetReset::Earliest));
        assert_eq!(" Latest ".parse::<OffsetReset>(), Ok(OffsetReset::Latest));
        assert_eq!("smallest".parse::<OffsetReset>(), Ok(OffsetReset::Earliest));
        assert!("sometimes".parse::<OffsetReset>().is_err());
    }

    #[test]
    fn test_offset_reset_display() {
        assert_eq!(OffsetReset::Earliest.to_string(), "earliest");
        assert_eq!(OffsetReset::Latest.as_str(), "latest");
    }

    #[test]
    fn test_client_config_carries_group_and_offset_policy() {
        let source = KafkaMessageSource::new(KafkaSourceConfig {
            bootstrap_servers: "kafka-1:9092,kafka-2:9092".to_string(),
            offset_reset: OffsetReset::Earliest,
            session_timeout_ms: 10_000,
        });

        let cfg = source.client_config("controller-pod-1");
        assert_eq!(cfg.get("bootstrap.servers"), Some("kafka-1:9092,kafka-2:9092"));
        assert_eq!(cfg.get("group.id"), Some("controller-pod-1"));
        assert_eq!(cfg.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(cfg.get("session.timeout.ms"), Some("10000"));
    }

    #[test]
    fn test_unknown_topic_is_transient() {
        let err = KafkaError::MessageConsumption(RDKafkaErrorCode::UnknownTopicOrPartition);
        assert!(matches!(classify(&err), SourceError::Transient(_)));
    }

    #[test]
    fn test_broker_transport_error_is_transient() {
        let err = KafkaError::Global(RDKafkaErrorCode::BrokerTransportFailure);
        assert!(matches!(classify(&err), SourceError::Transient(_)));
    }

    #[test]
    fn test_client_creation_error_is_unexpected() {
        let err = KafkaError::ClientCreation("bad config".to_string());
        assert!(matches!(classify(&err), SourceError::Unexpected(_)));
    }

    #[test]
    fn test_fatal_code_is_unexpected() {
        let err = KafkaError::MessageConsumption(RDKafkaErrorCode::Fatal);
        assert!(matches!(classify(&err), SourceError::Unexpected(_)));
    }

    #[tokio::test]
    async fn test_poll_before_subscribe_is_unexpected() {
        let mut source = KafkaMessageSource::new(KafkaSourceConfig::default());
        let result = source.poll_next(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(SourceError::Unexpected(_))));
    }

    #[tokio::test]
    async fn test_close_without_consumer_is_ok() {
        let mut source = KafkaMessageSource::new(KafkaSourceConfig::default());
        assert!(source.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_fatal_error_discards_consumer() {
        let mut source = KafkaMessageSource::new(KafkaSourceConfig::default());
        source.subscribe("measurements", "controller-pod-1").await.unwrap();
        assert!(source.consumer.is_some());

        let transient = source.on_client_error(KafkaError::Global(
            RDKafkaErrorCode::BrokerTransportFailure,
        ));
        assert!(matches!(transient, SourceError::Transient(_)));
        assert!(source.consumer.is_some());

        let fatal = source.on_client_error(KafkaError::MessageConsumption(RDKafkaErrorCode::Fatal));
        assert!(matches!(fatal, SourceError::Unexpected(_)));
        assert!(source.consumer.is_none());

        // Next subscribe builds a new client
        source.subscribe("measurements", "controller-pod-1").await.unwrap();
        assert!(source.consumer.is_some());
        source.close().await.unwrap();
    }
}
