//! go2link Transport Layer
//!
//! The real-time transport engine is an external collaborator. This crate
//! defines the interface the connection orchestrator drives:
//! - [`PeerEngine`] creates peer connections from an ICE configuration
//! - [`PeerConnection`] creates the local offer and applies the answer
//! - [`TransportSender`] / [`TransportReceiver`] are the two halves of the
//!   data channel
//! - [`PeerEvent`] carries the engine's state-change notifications
//!
//! With the `webrtc` feature, [`webrtc::WebRtcEngine`] implements the
//! interface on top of the `webrtc` crate.

pub mod error;
pub mod state;
pub mod traits;

#[cfg(feature = "webrtc")]
pub mod webrtc;

pub use error::{Result, TransportError};
pub use state::{IceConnectionState, IceGatheringState, PeerConnectionState, PeerEvent, SignalingState};
pub use traits::{
    IceServer, PeerConfig, PeerConnection, PeerEngine, PeerParts, SdpKind, SessionDescription,
    TransportEvent, TransportReceiver, TransportSender,
};

#[cfg(feature = "webrtc")]
pub use webrtc::WebRtcEngine;
