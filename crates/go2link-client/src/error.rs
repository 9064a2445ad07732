//! Client error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("address resolution failed: {0}")]
    AddressResolution(String),

    #[error("credential fetch failed: {0}")]
    CredentialFetch(String),

    #[error("signaling endpoint unreachable: {0}")]
    SignalingTransport(String),

    #[error("peer rejected the offer: connected by another client")]
    PeerRejected,

    #[error("invalid signaling answer: {0}")]
    InvalidAnswer(String),

    #[error("robot at {0} is not reachable")]
    Unreachable(String),

    #[error("channel not open")]
    ChannelNotOpen,

    #[error("channel failed to open: {0}")]
    ChannelOpen(String),

    /// Peer connection kept failing before the channel opened and the
    /// reconnect cap ran out
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("cancelled by disconnect")]
    Cancelled,

    #[error("protocol error: {0}")]
    Protocol(#[from] go2link_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] go2link_transport::TransportError),

    #[error("client error: {0}")]
    Other(String),
}
