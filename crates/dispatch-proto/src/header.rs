//! Per-topic monotonic headerId stamping.
//!
//! Grounded on the teacher's approach to per-peer sequence counters
//! (hooteproto's frame/envelope sequencing): one counter per outbound
//! topic, shared behind the transport's single MQTT client.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The header fields common to every VDA5050 message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    #[serde(rename = "headerId")]
    pub header_id: u32,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub manufacturer: String,
    #[serde(rename = "serialNumber")]
    pub serial_number: String,
}

/// Issues monotonically increasing `headerId`s, one counter per topic.
///
/// Gaps are tolerated on the receiving side and duplicates are the
/// caller's responsibility to detect (via `orderId`+`orderUpdateId`);
/// this type only guarantees strictly increasing ids for topics this
/// process publishes to.
#[derive(Debug, Default)]
pub struct HeaderStamper {
    counters: Mutex<HashMap<String, u32>>,
}

impl HeaderStamper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps a fresh header for `topic`, incrementing that topic's counter.
    pub fn stamp(&self, topic: &str, manufacturer: &str, serial_number: &str, version: &str) -> Header {
        let mut counters = self.counters.lock().expect("header counter poisoned");
        let id = counters.entry(topic.to_string()).or_insert(0);
        let header_id = *id;
        *id = id.wrapping_add(1);
        Header {
            header_id,
            timestamp: Utc::now(),
            version: version.to_string(),
            manufacturer: manufacturer.to_string(),
            serial_number: serial_number.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_per_topic_independently() {
        let stamper = HeaderStamper::new();
        let h1 = stamper.stamp("uagv/v1/acme/carter01/order", "acme", "carter01", "1.1.0");
        let h2 = stamper.stamp("uagv/v1/acme/carter01/order", "acme", "carter01", "1.1.0");
        let h3 = stamper.stamp("uagv/v1/acme/carter01/instantActions", "acme", "carter01", "1.1.0");

        assert_eq!(h1.header_id, 0);
        assert_eq!(h2.header_id, 1);
        assert_eq!(h3.header_id, 0);
    }
}
