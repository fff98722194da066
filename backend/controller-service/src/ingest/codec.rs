//! Measurement payload codec
//!
//! Turns raw Kafka message values into [`Measurement`] records. Decoding never
//! panics: anything that does not match the wire shape comes back as a
//! [`DecodeError`] so the ingest loop can log it and move on.

use crate::models::Measurement;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("SensorId must not be empty")]
    EmptySensorId,
}

/// Decode a raw broker payload into a measurement.
pub fn decode(raw: &[u8]) -> Result<Measurement, DecodeError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }

    let measurement: Measurement = serde_json::from_slice(raw)?;

    if measurement.sensor_id.trim().is_empty() {
        return Err(DecodeError::EmptySensorId);
    }

    Ok(measurement)
}

/// Encode a measurement in the wire shape used by both Kafka and subscribers.
pub fn encode(measurement: &Measurement) -> Result<String, serde_json::Error> {
    serde_json::to_string(measurement)
}
