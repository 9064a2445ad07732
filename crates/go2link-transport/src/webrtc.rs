//! WebRTC engine on top of the `webrtc` crate
//!
//! The robot is always the answerer: we create the data channel and the
//! media transceivers, gather all candidates, and send one complete offer
//! (no trickle ICE).

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use webrtc_rs::{
    api::{
        interceptor_registry::register_default_interceptors, media_engine::MediaEngine, APIBuilder,
    },
    data_channel::{
        data_channel_init::RTCDataChannelInit, data_channel_message::DataChannelMessage,
        data_channel_state::RTCDataChannelState, RTCDataChannel,
    },
    ice_transport::{
        ice_connection_state::RTCIceConnectionState, ice_gatherer_state::RTCIceGathererState,
        ice_server::RTCIceServer,
    },
    interceptor::registry::Registry,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription, signaling_state::RTCSignalingState,
        RTCPeerConnection,
    },
    rtp_transceiver::{
        rtp_codec::RTPCodecType, rtp_receiver::RTCRtpReceiver,
        rtp_transceiver_direction::RTCRtpTransceiverDirection, RTCRtpTransceiver,
        RTCRtpTransceiverInit,
    },
    track::track_remote::TrackRemote,
};

use crate::error::{Result, TransportError};
use crate::state::{
    IceConnectionState, IceGatheringState, PeerConnectionState, PeerEvent, SignalingState,
};
use crate::traits::{
    PeerConfig, PeerConnection, PeerEngine, PeerParts, SessionDescription, TransportEvent,
    TransportReceiver, TransportSender,
};

const EVENT_BUFFER: usize = 100;

/// Engine creating `webrtc` crate peer connections
#[derive(Debug, Clone, Copy, Default)]
pub struct WebRtcEngine;

impl WebRtcEngine {
    pub fn new() -> Self {
        Self
    }

    async fn create_peer_connection(config: &PeerConfig) -> Result<Arc<RTCPeerConnection>> {
        let mut m = MediaEngine::default();
        m.register_default_codecs().map_err(|e| {
            TransportError::ConnectionFailed(format!("Codec registration failed: {}", e))
        })?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut m).map_err(|e| {
            TransportError::ConnectionFailed(format!("Interceptor registration failed: {}", e))
        })?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection = api.new_peer_connection(rtc_config).await.map_err(|e| {
            TransportError::ConnectionFailed(format!("PeerConnection creation failed: {}", e))
        })?;

        Ok(Arc::new(peer_connection))
    }

    async fn add_media_transceivers(pc: &Arc<RTCPeerConnection>) -> Result<()> {
        for (kind, direction) in [
            (RTPCodecType::Video, RTCRtpTransceiverDirection::Recvonly),
            (RTPCodecType::Audio, RTCRtpTransceiverDirection::Sendrecv),
        ] {
            pc.add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| {
                TransportError::ConnectionFailed(format!("Transceiver creation failed: {}", e))
            })?;
        }
        Ok(())
    }

    /// Forward every engine state callback into one event stream
    fn forward_state_changes(pc: &Arc<RTCPeerConnection>, tx: mpsc::Sender<PeerEvent>) {
        let tx_gathering = tx.clone();
        pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
            let tx = tx_gathering.clone();
            Box::pin(async move {
                if let Some(state) = gathering_state(state) {
                    let _ = tx.send(PeerEvent::IceGathering(state)).await;
                }
            })
        }));

        let tx_ice = tx.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            let tx = tx_ice.clone();
            Box::pin(async move {
                if let Some(state) = ice_connection_state(state) {
                    let _ = tx.send(PeerEvent::IceConnection(state)).await;
                }
            })
        }));

        let tx_peer = tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let tx = tx_peer.clone();
            Box::pin(async move {
                if let Some(state) = peer_connection_state(state) {
                    let _ = tx.send(PeerEvent::Connection(state)).await;
                }
            })
        }));

        let tx_signaling = tx.clone();
        pc.on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
            let tx = tx_signaling.clone();
            Box::pin(async move {
                if let Some(state) = signaling_state(state) {
                    let _ = tx.send(PeerEvent::Signaling(state)).await;
                }
            })
        }));

        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = tx.clone();
                let kind = match track.kind() {
                    RTPCodecType::Audio => "audio",
                    RTPCodecType::Video => "video",
                    _ => "unknown",
                };
                Box::pin(async move {
                    let _ = tx
                        .send(PeerEvent::Track {
                            kind: kind.to_string(),
                        })
                        .await;
                })
            },
        ));
    }

    fn setup_channel_handlers(channel: &Arc<RTCDataChannel>) -> mpsc::Receiver<TransportEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let tx_message = tx.clone();
        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let data = Bytes::copy_from_slice(&msg.data);
            let tx = tx_message.clone();
            Box::pin(async move {
                let _ = tx.send(TransportEvent::Data(data)).await;
            })
        }));

        let tx_open = tx.clone();
        let label = channel.label().to_string();
        channel.on_open(Box::new(move || {
            let tx = tx_open.clone();
            Box::pin(async move {
                info!("DataChannel '{}' opened", label);
                let _ = tx.send(TransportEvent::Connected).await;
            })
        }));

        let tx_close = tx;
        channel.on_close(Box::new(move || {
            let tx = tx_close.clone();
            Box::pin(async move {
                let _ = tx.send(TransportEvent::Disconnected { reason: None }).await;
            })
        }));

        rx
    }
}

#[async_trait]
impl PeerEngine for WebRtcEngine {
    async fn create_peer(&self, config: PeerConfig) -> Result<PeerParts> {
        let pc = Self::create_peer_connection(&config).await?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        Self::forward_state_changes(&pc, event_tx);

        if config.media_transceivers {
            Self::add_media_transceivers(&pc).await?;
        }

        let channel = pc
            .create_data_channel(&config.channel_label, Some(RTCDataChannelInit::default()))
            .await
            .map_err(|e| {
                TransportError::ConnectionFailed(format!("DataChannel creation failed: {}", e))
            })?;
        info!("Created DataChannel '{}'", config.channel_label);

        let rx = Self::setup_channel_handlers(&channel);

        Ok(PeerParts {
            peer: Box::new(WebRtcPeer { pc }),
            events: event_rx,
            sender: Arc::new(WebRtcSender { channel }),
            receiver: Box::new(WebRtcReceiver { rx }),
        })
    }
}

/// A `webrtc` crate peer connection
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("Create offer failed: {}", e)))?;

        let mut gathering_complete = self.pc.gathering_complete_promise().await;

        self.pc.set_local_description(offer).await.map_err(|e| {
            TransportError::ConnectionFailed(format!("Set local description failed: {}", e))
        })?;

        let _ = gathering_complete.recv().await;

        let local = self.pc.local_description().await.ok_or_else(|| {
            TransportError::ConnectionFailed("Local description missing after gathering".into())
        })?;

        debug!("Local offer ready ({} bytes)", local.sdp.len());
        Ok(SessionDescription::offer(local.sdp))
    }

    async fn set_remote_answer(&self, answer: SessionDescription) -> Result<()> {
        let answer = RTCSessionDescription::answer(answer.sdp)
            .map_err(|e| TransportError::InvalidDescription(e.to_string()))?;

        self.pc.set_remote_description(answer).await.map_err(|e| {
            TransportError::ConnectionFailed(format!("Set remote description failed: {}", e))
        })?;

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| TransportError::Other(format!("PeerConnection close failed: {}", e)))
    }
}

/// WebRTC DataChannel sender
pub struct WebRtcSender {
    channel: Arc<RTCDataChannel>,
}

#[async_trait]
impl TransportSender for WebRtcSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        // The robot only parses text messages; frames are JSON so this is
        // the normal path.
        let sent = match std::str::from_utf8(&data) {
            Ok(text) => self.channel.send_text(text.to_string()).await,
            Err(_) => {
                warn!("Sending non-UTF-8 frame as binary");
                self.channel.send(&data).await
            }
        };

        sent.map_err(|e| TransportError::SendFailed(format!("DataChannel send failed: {}", e)))?;

        debug!("WebRTC sent {} bytes", data.len());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.channel.ready_state() == RTCDataChannelState::Open
    }

    async fn close(&self) -> Result<()> {
        self.channel
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(format!("DataChannel close failed: {}", e)))?;
        Ok(())
    }
}

/// WebRTC DataChannel receiver
pub struct WebRtcReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebRtcReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

fn gathering_state(state: RTCIceGathererState) -> Option<IceGatheringState> {
    match state {
        RTCIceGathererState::New => Some(IceGatheringState::New),
        RTCIceGathererState::Gathering => Some(IceGatheringState::Gathering),
        RTCIceGathererState::Complete => Some(IceGatheringState::Complete),
        _ => None,
    }
}

fn ice_connection_state(state: RTCIceConnectionState) -> Option<IceConnectionState> {
    match state {
        RTCIceConnectionState::New => Some(IceConnectionState::New),
        RTCIceConnectionState::Checking => Some(IceConnectionState::Checking),
        RTCIceConnectionState::Connected => Some(IceConnectionState::Connected),
        RTCIceConnectionState::Completed => Some(IceConnectionState::Completed),
        RTCIceConnectionState::Disconnected => Some(IceConnectionState::Disconnected),
        RTCIceConnectionState::Failed => Some(IceConnectionState::Failed),
        RTCIceConnectionState::Closed => Some(IceConnectionState::Closed),
        _ => None,
    }
}

fn peer_connection_state(state: RTCPeerConnectionState) -> Option<PeerConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(PeerConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(PeerConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(PeerConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(PeerConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(PeerConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(PeerConnectionState::Closed),
        _ => None,
    }
}

fn signaling_state(state: RTCSignalingState) -> Option<SignalingState> {
    match state {
        RTCSignalingState::Stable => Some(SignalingState::Stable),
        RTCSignalingState::HaveLocalOffer => Some(SignalingState::HaveLocalOffer),
        RTCSignalingState::HaveRemoteOffer => Some(SignalingState::HaveRemoteOffer),
        RTCSignalingState::Closed => Some(SignalingState::Closed),
        _ => None,
    }
}
