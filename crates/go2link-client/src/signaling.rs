//! Offer/answer exchange
//!
//! A [`SignalingStrategy`] is picked once when a session is planned and is
//! never re-selected for the lifetime of that session. All variants share
//! one wire format: the offer is `{id, sdp, type, token, [turnserver]}` and
//! the answer is `{sdp, type}`, where `sdp == "reject"` means the robot is
//! already serving another client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

use go2link_transport::SessionDescription;

use crate::credentials::{PublicKey, SignalingBroker, TurnServerInfo};
use crate::error::{ClientError, Result};

/// Answer `sdp` value sent by a busy robot
pub const REJECT_SENTINEL: &str = "reject";

/// Routing id used when the robot is on the station (home) network
pub const STATION_NETWORK_ID: &str = "STA_localNetwork";

/// Which signaling path a session uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalingKind {
    /// Fixed or caller-supplied local address
    LocalDirect,
    /// Local address looked up by serial number
    LocalDiscovered,
    /// Cloud broker keyed by serial number
    RemoteBrokered,
}

impl SignalingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalingKind::LocalDirect => "local-direct",
            SignalingKind::LocalDiscovered => "local-discovered",
            SignalingKind::RemoteBrokered => "remote-brokered",
        }
    }
}

impl std::fmt::Display for SignalingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Offer payload. Immutable once built, so a retry resends exactly the
/// same offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingOffer {
    pub id: String,
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turnserver: Option<TurnServerInfo>,
}

/// Answer payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingAnswer {
    pub sdp: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl SignalingAnswer {
    /// The robot is connected to another client
    pub fn is_rejected(&self) -> bool {
        self.sdp == REJECT_SENTINEL
    }

    pub fn into_description(self) -> SessionDescription {
        SessionDescription::answer(self.sdp)
    }

    /// Parse an answer body. Anything that is not `{sdp, type}` is an
    /// [`ClientError::InvalidAnswer`].
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| ClientError::InvalidAnswer(e.to_string()))
    }
}

#[async_trait]
pub trait SignalingStrategy: Send + Sync {
    fn kind(&self) -> SignalingKind;

    /// Wrap the local description into this strategy's offer payload
    fn offer(&self, description: &SessionDescription) -> SignalingOffer;

    /// Send one offer and wait for the answer.
    ///
    /// Fails with [`ClientError::SignalingTransport`] when the endpoint cannot
    /// be reached. A busy robot is not an error here: it is a well-formed
    /// answer for which [`SignalingAnswer::is_rejected`] holds.
    async fn exchange(&self, offer: &SignalingOffer) -> Result<SignalingAnswer>;
}

/// HTTP signaling against the robot's local endpoint
pub struct LocalSignaling {
    kind: SignalingKind,
    address: IpAddr,
    port: u16,
    id: String,
    token: String,
    http: reqwest::Client,
}

impl LocalSignaling {
    pub fn new(
        kind: SignalingKind,
        address: IpAddr,
        port: u16,
        id: impl Into<String>,
        token: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            kind,
            address,
            port,
            id: id.into(),
            token: token.into(),
            http,
        }
    }

    pub fn url(&self) -> String {
        match self.address {
            IpAddr::V4(ip) => format!("http://{}:{}/offer", ip, self.port),
            IpAddr::V6(ip) => format!("http://[{}]:{}/offer", ip, self.port),
        }
    }
}

#[async_trait]
impl SignalingStrategy for LocalSignaling {
    fn kind(&self) -> SignalingKind {
        self.kind
    }

    fn offer(&self, description: &SessionDescription) -> SignalingOffer {
        SignalingOffer {
            id: self.id.clone(),
            sdp: description.sdp.clone(),
            kind: description.kind.as_str().to_string(),
            token: self.token.clone(),
            turnserver: None,
        }
    }

    async fn exchange(&self, offer: &SignalingOffer) -> Result<SignalingAnswer> {
        let url = self.url();
        debug!("POST {} ({} bytes of SDP)", url, offer.sdp.len());

        let response = self
            .http
            .post(&url)
            .json(offer)
            .send()
            .await
            .map_err(|e| ClientError::SignalingTransport(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::SignalingTransport(format!(
                "{} returned HTTP {}",
                url, status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::SignalingTransport(format!("{}: {}", url, e)))?;

        SignalingAnswer::parse(&body)
    }
}

/// Signaling relayed by the cloud broker
pub struct RemoteSignaling {
    serial: String,
    token: String,
    key: PublicKey,
    turn: TurnServerInfo,
    broker: Arc<dyn SignalingBroker>,
}

impl RemoteSignaling {
    pub fn new(
        serial: impl Into<String>,
        token: impl Into<String>,
        key: PublicKey,
        turn: TurnServerInfo,
        broker: Arc<dyn SignalingBroker>,
    ) -> Self {
        Self {
            serial: serial.into(),
            token: token.into(),
            key,
            turn,
            broker,
        }
    }
}

#[async_trait]
impl SignalingStrategy for RemoteSignaling {
    fn kind(&self) -> SignalingKind {
        SignalingKind::RemoteBrokered
    }

    fn offer(&self, description: &SessionDescription) -> SignalingOffer {
        SignalingOffer {
            id: String::new(),
            sdp: description.sdp.clone(),
            kind: description.kind.as_str().to_string(),
            token: self.token.clone(),
            turnserver: Some(self.turn.clone()),
        }
    }

    async fn exchange(&self, offer: &SignalingOffer) -> Result<SignalingAnswer> {
        let body = serde_json::to_string(offer)
            .map_err(|e| go2link_core::Error::EncodeError(e.to_string()))?;

        let answer = self
            .broker
            .send_offer(&self.serial, &body, &self.token, &self.key)
            .await
            .map_err(|e| ClientError::SignalingTransport(format!("broker: {:#}", e)))?;

        SignalingAnswer::parse(&answer)
    }
}
