//! Transport trait definitions

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::state::PeerEvent;

/// Events that can occur on the data channel
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Channel opened
    Connected,
    /// Channel closed (clean or error)
    Disconnected { reason: Option<String> },
    /// Frame received
    Data(Bytes),
    /// Error occurred
    Error(String),
}

/// Trait for sending frames on the data channel
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send one frame
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Check if the channel is open
    fn is_connected(&self) -> bool;

    /// Close the channel
    async fn close(&self) -> Result<()>;
}

/// Trait for receiving data channel events
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Kind of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

impl SdpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpKind::Offer => "offer",
            SdpKind::Answer => "answer",
        }
    }
}

/// A session description exchanged during signaling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// An ICE server entry (STUN or TURN)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServer {
    /// STUN server without credentials
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }

    /// TURN relay with credentials
    pub fn turn(url: impl Into<String>, username: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

/// Peer connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    /// ICE servers for NAT traversal (empty on the local network)
    pub ice_servers: Vec<IceServer>,
    /// Label of the data channel to create
    pub channel_label: String,
    /// Offer a receive-only video and a send/receive audio transceiver
    pub media_transceivers: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            ice_servers: Vec::new(),
            channel_label: "data".to_string(),
            media_transceivers: true,
        }
    }
}

/// Everything the engine hands back for one new peer connection
pub struct PeerParts {
    /// Handle for offer/answer and teardown
    pub peer: Box<dyn PeerConnection>,
    /// State-change notifications, in the order the engine raised them
    pub events: mpsc::Receiver<PeerEvent>,
    /// Sending half of the data channel
    pub sender: std::sync::Arc<dyn TransportSender>,
    /// Receiving half of the data channel
    pub receiver: Box<dyn TransportReceiver>,
}

/// A single peer connection owned by the orchestrator
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Create the local offer, apply it, and return it once candidate
    /// gathering has finished
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Apply the remote answer
    async fn set_remote_answer(&self, answer: SessionDescription) -> Result<()>;

    /// Close the connection. Closing twice is not an error.
    async fn close(&self) -> Result<()>;
}

/// Factory for peer connections
#[async_trait]
pub trait PeerEngine: Send + Sync {
    /// Create a peer connection with its data channel
    async fn create_peer(&self, config: PeerConfig) -> Result<PeerParts>;
}
