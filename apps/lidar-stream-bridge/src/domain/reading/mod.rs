//! Sensor Reading Type
//!
//! The canonical internal representation of one sensor sample. A reading
//! is constructed once at receipt time and never mutated afterwards; the
//! only way a reading leaves the system is by eviction from the history
//! buffer.
//!
//! # Wire Format
//!
//! Readings serialize to the JSON object consumed by browser clients:
//!
//! ```json
//! {"timestamp": "2026-08-07T12:34:56.789Z", "value": 42.5, "topic": "/esp32/lidar/distance"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped sample from the sensor feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Receipt time on the bridge's clock, serialized as ISO-8601.
    pub timestamp: DateTime<Utc>,
    /// The decoded sensor value.
    pub value: f64,
    /// The MQTT topic the payload arrived on.
    pub topic: String,
}

impl Reading {
    /// Create a reading stamped with the current time.
    #[must_use]
    pub fn now(value: f64, topic: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            value,
            topic: topic.into(),
        }
    }

    /// Create a reading with an explicit timestamp.
    #[must_use]
    pub fn at(timestamp: DateTime<Utc>, value: f64, topic: impl Into<String>) -> Self {
        Self {
            timestamp,
            value,
            topic: topic.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_to_bare_object() {
        let ts = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();
        let reading = Reading::at(ts, 42.5, "/esp32/lidar/distance");

        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["value"], 42.5);
        assert_eq!(json["topic"], "/esp32/lidar/distance");
        // chrono renders an ISO-8601 / RFC 3339 timestamp
        assert_eq!(json["timestamp"], "2026-08-07T12:00:00Z");
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn round_trips_through_json() {
        let reading = Reading::now(17.25, "/esp32/lidar/distance");
        let json = serde_json::to_string(&reading).unwrap();
        let back: Reading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reading);
    }

    #[test]
    fn now_stamps_receipt_time() {
        let before = Utc::now();
        let reading = Reading::now(1.0, "t");
        let after = Utc::now();
        assert!(reading.timestamp >= before && reading.timestamp <= after);
    }
}
