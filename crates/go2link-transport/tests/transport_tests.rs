//! Transport Interface Tests (go2link-transport)
//!
//! Tests for the engine-facing value types:
//! - ICE server entries
//! - Peer configuration defaults
//! - Session descriptions
//! - State notification names

use go2link_transport::{
    IceConnectionState, IceServer, PeerConfig, PeerConnectionState, PeerEvent, SdpKind,
    SessionDescription, SignalingState,
};

// ============================================================================
// ICE Configuration
// ============================================================================

#[test]
fn test_stun_server_has_no_credentials() {
    let server = IceServer::stun("stun:stun.l.google.com:19302");
    assert_eq!(server.urls, vec!["stun:stun.l.google.com:19302".to_string()]);
    assert!(server.username.is_none());
    assert!(server.credential.is_none());
}

#[test]
fn test_turn_server_carries_credentials() {
    let server = IceServer::turn("turn:relay.example:3478", "user", "secret");
    assert_eq!(server.username.as_deref(), Some("user"));
    assert_eq!(server.credential.as_deref(), Some("secret"));
}

#[test]
fn test_peer_config_default() {
    let config = PeerConfig::default();
    assert!(config.ice_servers.is_empty());
    assert_eq!(config.channel_label, "data");
    assert!(config.media_transceivers);
}

// ============================================================================
// Session Descriptions
// ============================================================================

#[test]
fn test_session_description_kinds() {
    let offer = SessionDescription::offer("v=0");
    assert_eq!(offer.kind, SdpKind::Offer);
    assert_eq!(offer.kind.as_str(), "offer");

    let answer = SessionDescription::answer("v=0");
    assert_eq!(answer.kind.as_str(), "answer");
    assert_ne!(offer, answer);
}

// ============================================================================
// State Notifications
// ============================================================================

#[test]
fn test_observed_state_strings() {
    let ice: Vec<String> = [
        IceConnectionState::Checking,
        IceConnectionState::Completed,
        IceConnectionState::Failed,
        IceConnectionState::Closed,
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    assert_eq!(ice, ["checking", "completed", "failed", "closed"]);

    let peer: Vec<String> = [
        PeerConnectionState::Connecting,
        PeerConnectionState::Connected,
        PeerConnectionState::Closed,
        PeerConnectionState::Failed,
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    assert_eq!(peer, ["connecting", "connected", "closed", "failed"]);

    let signaling: Vec<String> = [
        SignalingState::Stable,
        SignalingState::HaveLocalOffer,
        SignalingState::HaveRemoteOffer,
        SignalingState::Closed,
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    assert_eq!(
        signaling,
        ["stable", "have-local-offer", "have-remote-offer", "closed"]
    );
}

#[test]
fn test_peer_event_equality() {
    assert_eq!(
        PeerEvent::Connection(PeerConnectionState::Failed),
        PeerEvent::Connection(PeerConnectionState::Failed)
    );
    assert_ne!(
        PeerEvent::Track {
            kind: "audio".into()
        },
        PeerEvent::Track {
            kind: "video".into()
        }
    );
}
