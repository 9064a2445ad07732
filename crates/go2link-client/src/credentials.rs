//! Cloud credential and broker collaborators (remote method only)
//!
//! The payload encryption scheme of the vendor cloud is owned by the
//! implementor of these traits; the orchestrator only passes the fetched key
//! back in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque public key handed out by the cloud service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(pub String);

/// TURN relay credentials for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnServerInfo {
    pub user: String,
    #[serde(rename = "passwd")]
    pub password: String,
    /// Relay URL, e.g. `turn:host:port`
    pub realm: String,
}

impl TurnServerInfo {
    /// All three fields are required by the ICE agent
    pub fn is_complete(&self) -> bool {
        !self.user.is_empty() && !self.password.is_empty() && !self.realm.is_empty()
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Exchange a login for an access token
    async fn fetch_token(&self, email: &str, password: &str) -> anyhow::Result<String>;

    async fn fetch_public_key(&self) -> anyhow::Result<PublicKey>;

    async fn fetch_turn_info(
        &self,
        serial: &str,
        token: &str,
        key: &PublicKey,
    ) -> anyhow::Result<TurnServerInfo>;
}

/// Relays a signaling offer to a device through the cloud
#[async_trait]
pub trait SignalingBroker: Send + Sync {
    /// Send the JSON offer body and return the raw JSON answer body
    async fn send_offer(
        &self,
        serial: &str,
        body: &str,
        token: &str,
        key: &PublicKey,
    ) -> anyhow::Result<String>;
}
