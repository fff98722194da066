use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A single sensor reading as it travels from the broker to subscribers.
///
/// The same shape is used for the inbound Kafka payload and the outbound
/// broadcast, so records are forwarded without transformation. The timestamp
/// keeps the offset the sensor reported instead of being normalized to UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Measurement {
    pub sensor_id: String,
    pub timestamp: DateTime<FixedOffset>,
    pub value: f64,
}

impl Measurement {
    pub fn new(sensor_id: impl Into<String>, timestamp: DateTime<FixedOffset>, value: f64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            value,
        }
    }
}
