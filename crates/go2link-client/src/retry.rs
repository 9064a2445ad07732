//! Fixed-interval retry policy
//!
//! Every waiting loop of the orchestrator (reachability, signaling, automatic
//! reconnect) is driven by a [`RetryPolicy`]. The default has no attempt cap;
//! the only way out of an uncapped loop is success or cancellation.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between two attempts
    pub interval: Duration,
    /// Upper bound on attempts, `None` retries forever
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry forever at a fixed interval
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    /// Cap the number of attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Whether another attempt may follow `attempts` completed ones
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }

    /// Sleep for one interval, or return [`ClientError::Cancelled`] as soon
    /// as `cancel` fires
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            _ = tokio::time::sleep(self.interval) => Ok(()),
        }
    }
}
