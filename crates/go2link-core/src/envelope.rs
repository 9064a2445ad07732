//! Topic-tagged unit of data channel traffic

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::topics::kind;

/// One frame on the data channel.
///
/// Serialized as `{"type": ..., "topic": ..., "data": ...}`. Outbound topic
/// traffic always uses the `msg` type; `topic` is omitted when empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type tag
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    /// Topic identifier (empty for untopiced control frames)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topic: String,
    /// Arbitrary structured payload
    #[serde(default)]
    pub data: Value,
}

fn default_kind() -> String {
    kind::MSG.to_string()
}

impl Envelope {
    /// Create a topic message
    pub fn message(topic: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind::MSG.to_string(),
            topic: topic.into(),
            data,
        }
    }

    /// Create a subscribe notice for `topic`
    pub fn subscribe(topic: impl Into<String>) -> Self {
        Self {
            kind: kind::SUBSCRIBE.to_string(),
            topic: topic.into(),
            data: Value::Null,
        }
    }

    /// Create an unsubscribe notice for `topic`
    pub fn unsubscribe(topic: impl Into<String>) -> Self {
        Self {
            kind: kind::UNSUBSCRIBE.to_string(),
            topic: topic.into(),
            data: Value::Null,
        }
    }

    /// Key used to look up subscribers: the topic when present, otherwise
    /// the type tag.
    pub fn route(&self) -> &str {
        if self.topic.is_empty() {
            &self.kind
        } else {
            &self.topic
        }
    }

    /// Check if this is topic traffic
    pub fn is_message(&self) -> bool {
        self.kind == kind::MSG
    }
}
