//! Request payloads for the robot's API topics

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Request published on an API topic such as `rt/api/sport/request`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub header: RequestHeader,
    /// Parameters, JSON-encoded into a string (empty when none)
    pub parameter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub identity: RequestIdentity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestIdentity {
    /// Request id, unique enough for correlating responses
    pub id: u64,
    /// API function number
    pub api_id: u32,
}

impl ApiRequest {
    /// Create a request with a fresh id
    pub fn new(api_id: u32, parameter: impl Into<String>) -> Self {
        Self {
            header: RequestHeader {
                identity: RequestIdentity {
                    id: next_request_id(),
                    api_id,
                },
            },
            parameter: parameter.into(),
        }
    }

    /// Create a request without parameters
    pub fn without_parameter(api_id: u32) -> Self {
        Self::new(api_id, String::new())
    }

    pub fn id(&self) -> u64 {
        self.header.identity.id
    }

    pub fn api_id(&self) -> u32 {
        self.header.identity.api_id
    }
}

/// Millisecond clock folded into 31 bits, offset by a rolling sequence so
/// requests issued within the same millisecond differ.
fn next_request_id() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    (millis % 2_147_483_648) + SEQUENCE.fetch_add(1, Ordering::Relaxed) % 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consecutive_ids_differ() {
        let a = ApiRequest::without_parameter(1008);
        let b = ApiRequest::without_parameter(1008);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_wire_shape() {
        let req = ApiRequest::new(1008, r#"{"x":0.5,"y":0,"z":0}"#);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["header"]["identity"]["api_id"], 1008);
        assert_eq!(value["parameter"], r#"{"x":0.5,"y":0,"z":0}"#);
    }
}
