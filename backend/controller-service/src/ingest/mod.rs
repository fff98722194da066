//! Ingestion pipeline: Kafka topic → decode → broadcaster
//!
//! - `codec`: payload decoding
//! - `group_identity`: per-instance consumer group ids
//! - `backoff`: retry pacing after broker failures
//! - `source`: broker abstraction, `kafka_source`: rdkafka implementation
//! - `ingest_loop`: the long-running consumption task

pub mod backoff;
pub mod codec;
pub mod group_identity;
pub mod ingest_loop;
pub mod kafka_source;
pub mod source;

pub use backoff::{BackoffConfig, BackoffController};
pub use codec::{decode, encode, DecodeError};
pub use group_identity::{group_id, instance_identity};
pub use ingest_loop::{IngestConfig, IngestLoop, IngestState};
pub use kafka_source::{KafkaMessageSource, KafkaSourceConfig, OffsetReset};
pub use source::{MessageSource, RawMessage, SourceError};
