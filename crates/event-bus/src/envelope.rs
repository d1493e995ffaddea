use chrono::{DateTime, Utc};
use common::MessageId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A published message with its delivery metadata.
///
/// Produced once per business fact; consumers may see it more than once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Topic exchange the message was published to.
    pub exchange: String,

    /// Routing key, dot-separated (e.g. `inventory.updated`).
    pub routing_key: String,

    /// Unique message id, the dedupe handle for consumers.
    pub message_id: MessageId,

    /// JSON payload.
    pub payload: serde_json::Value,

    /// Whether the broker should survive a restart with this message.
    pub persistent: bool,

    /// Publish time.
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Creates a persistent envelope with a fresh message id.
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            message_id: MessageId::new(),
            payload,
            persistent: true,
            timestamp: Utc::now(),
        }
    }

    /// Deserializes the payload into a typed message.
    pub fn payload_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Returns true if `routing_key` matches the topic `pattern`.
///
/// Dot-separated segments; `*` matches exactly one segment, `#` matches
/// zero or more trailing segments.
pub fn routing_matches(pattern: &str, routing_key: &str) -> bool {
    fn matches(pattern: &[&str], key: &[&str]) -> bool {
        match (pattern.first(), key.first()) {
            (None, None) => true,
            (Some(&"#"), _) => {
                // '#' absorbs zero or more segments.
                matches(&pattern[1..], key)
                    || (!key.is_empty() && matches(pattern, &key[1..]))
            }
            (Some(&"*"), Some(_)) => matches(&pattern[1..], &key[1..]),
            (Some(seg), Some(actual)) if seg == actual => matches(&pattern[1..], &key[1..]),
            _ => false,
        }
    }

    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches(&pattern, &key)
}
