//! Connection tunables

use serde::{Deserialize, Serialize};
use std::time::Duration;

use go2link_core::{DATA_CHANNEL_LABEL, DEFAULT_SIGNALING_PORT, DEFAULT_STUN_SERVER};

use crate::retry::RetryPolicy;

/// Timing and negotiation settings for a [`Go2Connection`](crate::Go2Connection)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Delay between two reachability probes
    pub reachability_interval_ms: u64,
    pub reachability_max_attempts: Option<u32>,
    /// Delay between two signaling attempts (busy peer or unreachable endpoint)
    pub signaling_retry_interval_ms: u64,
    pub signaling_max_attempts: Option<u32>,
    /// Delay between two automatic reconnect attempts
    pub reconnect_interval_ms: u64,
    pub reconnect_max_attempts: Option<u32>,
    /// Per-request timeout of the local signaling endpoint
    pub signaling_timeout_ms: u64,
    /// Port of the robot's local signaling endpoint
    pub signaling_port: u16,
    /// STUN server added to remote sessions
    pub stun_server: String,
    /// Label of the data channel
    pub channel_label: String,
    /// Offer audio/video transceivers alongside the data channel
    pub media_transceivers: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reachability_interval_ms: 3000,
            reachability_max_attempts: None,
            signaling_retry_interval_ms: 1000,
            signaling_max_attempts: None,
            reconnect_interval_ms: 3000,
            reconnect_max_attempts: None,
            signaling_timeout_ms: 10_000,
            signaling_port: DEFAULT_SIGNALING_PORT,
            stun_server: DEFAULT_STUN_SERVER.to_string(),
            channel_label: DATA_CHANNEL_LABEL.to_string(),
            media_transceivers: true,
        }
    }
}

impl ConnectionConfig {
    pub fn reachability_policy(&self) -> RetryPolicy {
        policy(self.reachability_interval_ms, self.reachability_max_attempts)
    }

    pub fn signaling_policy(&self) -> RetryPolicy {
        policy(self.signaling_retry_interval_ms, self.signaling_max_attempts)
    }

    pub fn reconnect_policy(&self) -> RetryPolicy {
        policy(self.reconnect_interval_ms, self.reconnect_max_attempts)
    }

    pub fn signaling_timeout(&self) -> Duration {
        Duration::from_millis(self.signaling_timeout_ms)
    }
}

fn policy(interval_ms: u64, max_attempts: Option<u32>) -> RetryPolicy {
    RetryPolicy {
        interval: Duration::from_millis(interval_ms),
        max_attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_have_no_caps() {
        let config = ConnectionConfig::default();
        assert_eq!(config.reachability_policy().interval, Duration::from_secs(3));
        assert_eq!(config.reachability_policy().max_attempts, None);
        assert_eq!(config.signaling_policy().max_attempts, None);
        assert_eq!(config.reconnect_policy().max_attempts, None);
        assert_eq!(config.signaling_port, 8081);
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"signaling_max_attempts": 5, "media_transceivers": false}"#)
                .unwrap();
        assert_eq!(config.signaling_max_attempts, Some(5));
        assert!(!config.media_transceivers);
        assert_eq!(config.channel_label, "data");
    }
}
