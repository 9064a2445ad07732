//! Common test helpers and utilities for go2link tests
//!
//! This crate provides:
//! - Condition-based waiting (no hardcoded sleeps)
//! - An in-memory transport engine with per-peer controls
//! - A linked pair of in-memory data channel endpoints
//! - A scripted reachability probe
//! - A scripted HTTP signaling endpoint
//! - Fake credential and broker collaborators

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use go2link_client::{
    CredentialProvider, PublicKey, ReachabilityProbe, SignalingBroker, TurnServerInfo,
};
use go2link_core::Envelope;
use go2link_transport::{
    PeerConfig, PeerConnection, PeerConnectionState, PeerEngine, PeerEvent, PeerParts,
    Result as TransportResult, SessionDescription, TransportError, TransportEvent,
    TransportReceiver, TransportSender,
};

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// SDP carried by accepted answers of the fake endpoints
pub const MOCK_ANSWER_SDP: &str = "mock-answer";

// ============================================================================
// Port Allocation
// ============================================================================

/// Find an available TCP port for testing
pub async fn find_available_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait for an atomic counter to reach a target value
pub async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    wait_for(
        || async { counter.load(Ordering::SeqCst) >= target },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

/// Wait for a boolean flag to become true
pub async fn wait_for_flag(flag: &AtomicBool, max_wait: Duration) -> bool {
    wait_for(
        || async { flag.load(Ordering::SeqCst) },
        DEFAULT_CHECK_INTERVAL,
        max_wait,
    )
    .await
}

// ============================================================================
// In-Memory Data Channel
// ============================================================================

/// Sending half of an in-memory channel. Frames land in `sent` and, when
/// linked, are delivered to the peer endpoint.
pub struct MockSender {
    open: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<Bytes>>>,
    link: Option<mpsc::Sender<TransportEvent>>,
}

#[async_trait]
impl TransportSender for MockSender {
    async fn send(&self, data: Bytes) -> TransportResult<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(data.clone());
        if let Some(link) = &self.link {
            link.send(TransportEvent::Data(data))
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> TransportResult<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Receiving half of an in-memory channel
pub struct MockReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for MockReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// One side of a linked channel pair
pub struct Endpoint {
    pub sender: Arc<dyn TransportSender>,
    pub receiver: Box<dyn TransportReceiver>,
}

/// Two open, linked channel endpoints: whatever one side sends, the other
/// receives.
pub fn channel_pair() -> (Endpoint, Endpoint) {
    let (a_tx, a_rx) = mpsc::channel(100);
    let (b_tx, b_rx) = mpsc::channel(100);

    // Both sides see the channel open before any data
    a_tx.try_send(TransportEvent::Connected).unwrap();
    b_tx.try_send(TransportEvent::Connected).unwrap();

    let a = Endpoint {
        sender: Arc::new(MockSender {
            open: Arc::new(AtomicBool::new(true)),
            sent: Arc::new(Mutex::new(Vec::new())),
            link: Some(b_tx),
        }),
        receiver: Box::new(MockReceiver { rx: a_rx }),
    };
    let b = Endpoint {
        sender: Arc::new(MockSender {
            open: Arc::new(AtomicBool::new(true)),
            sent: Arc::new(Mutex::new(Vec::new())),
            link: Some(a_tx),
        }),
        receiver: Box::new(MockReceiver { rx: b_rx }),
    };
    (a, b)
}

/// Controls for a single unlinked in-memory channel
#[derive(Clone)]
pub struct ChannelControl {
    open: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<Bytes>>>,
    events: mpsc::Sender<TransportEvent>,
}

impl ChannelControl {
    /// Report the channel as open
    pub async fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Connected).await;
    }

    /// Report the channel as closed
    pub async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self
            .events
            .send(TransportEvent::Disconnected { reason: None })
            .await;
    }

    /// Deliver a raw inbound frame
    pub async fn deliver(&self, frame: impl Into<Bytes>) {
        let _ = self.events.send(TransportEvent::Data(frame.into())).await;
    }

    /// Deliver an envelope as an inbound frame
    pub async fn deliver_envelope(&self, envelope: &Envelope) {
        self.deliver(go2link_core::encode(envelope).unwrap()).await;
    }

    /// Raw frames sent so far
    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    /// Sent frames decoded as envelopes
    pub fn sent_envelopes(&self) -> Vec<Envelope> {
        self.sent
            .lock()
            .iter()
            .map(|frame| go2link_core::decode(frame).unwrap())
            .collect()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// A single closed in-memory channel and its controls
pub fn mock_channel() -> (ChannelControl, Arc<dyn TransportSender>, Box<dyn TransportReceiver>) {
    let open = Arc::new(AtomicBool::new(false));
    let sent = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel(100);

    let control = ChannelControl {
        open: open.clone(),
        sent: sent.clone(),
        events: tx,
    };
    let sender = Arc::new(MockSender {
        open,
        sent,
        link: None,
    });
    (control, sender, Box::new(MockReceiver { rx }))
}

// ============================================================================
// Mock Transport Engine
// ============================================================================

/// Controls for one peer created by [`MockEngine`]
#[derive(Clone)]
pub struct MockPeerHandle {
    pub index: u32,
    pub config: PeerConfig,
    pub channel: ChannelControl,
    events: mpsc::Sender<PeerEvent>,
    closed: Arc<AtomicBool>,
    answers: Arc<Mutex<Vec<SessionDescription>>>,
}

impl MockPeerHandle {
    /// Raise an engine notification
    pub async fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event).await;
    }

    /// Report the overall connection state
    pub async fn emit_state(&self, state: PeerConnectionState) {
        self.emit(PeerEvent::Connection(state)).await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Answers applied to this peer
    pub fn answers(&self) -> Vec<SessionDescription> {
        self.answers.lock().clone()
    }
}

struct MockPeer {
    handle: MockPeerHandle,
    auto_open: bool,
}

#[async_trait]
impl PeerConnection for MockPeer {
    async fn create_offer(&self) -> TransportResult<SessionDescription> {
        self.handle
            .emit(PeerEvent::IceGathering(go2link_transport::IceGatheringState::Gathering))
            .await;
        self.handle
            .emit(PeerEvent::IceGathering(go2link_transport::IceGatheringState::Complete))
            .await;
        Ok(SessionDescription::offer(format!(
            "mock-offer-{}",
            self.handle.index
        )))
    }

    async fn set_remote_answer(&self, answer: SessionDescription) -> TransportResult<()> {
        self.handle.answers.lock().push(answer);
        if self.auto_open {
            self.handle.emit_state(PeerConnectionState::Connecting).await;
            self.handle.emit_state(PeerConnectionState::Connected).await;
            self.handle.channel.open().await;
        }
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        if !self.handle.closed.swap(true, Ordering::SeqCst) {
            self.handle.channel.open.store(false, Ordering::SeqCst);
            self.handle.emit_state(PeerConnectionState::Closed).await;
        }
        Ok(())
    }
}

/// In-memory transport engine. Every peer it creates is recorded and can be
/// driven from the test through a [`MockPeerHandle`].
pub struct MockEngine {
    auto_open: bool,
    peers: Mutex<Vec<MockPeerHandle>>,
    created: AtomicU32,
}

impl MockEngine {
    /// Engine whose peers connect and open their channel as soon as an
    /// answer is applied
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            auto_open: true,
            peers: Mutex::new(Vec::new()),
            created: AtomicU32::new(0),
        })
    }

    /// Engine whose peers never open on their own
    pub fn manual() -> Arc<Self> {
        Arc::new(Self {
            auto_open: false,
            peers: Mutex::new(Vec::new()),
            created: AtomicU32::new(0),
        })
    }

    /// Number of peer connections created
    pub fn created(&self) -> u32 {
        self.created.load(Ordering::SeqCst)
    }

    pub fn created_counter(&self) -> &AtomicU32 {
        &self.created
    }

    pub fn peer(&self, index: usize) -> Option<MockPeerHandle> {
        self.peers.lock().get(index).cloned()
    }

    pub fn last_peer(&self) -> Option<MockPeerHandle> {
        self.peers.lock().last().cloned()
    }
}

#[async_trait]
impl PeerEngine for MockEngine {
    async fn create_peer(&self, config: PeerConfig) -> TransportResult<PeerParts> {
        let index = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let (events_tx, events_rx) = mpsc::channel(100);
        let (channel, sender, receiver) = mock_channel();

        let handle = MockPeerHandle {
            index,
            config,
            channel,
            events: events_tx,
            closed: Arc::new(AtomicBool::new(false)),
            answers: Arc::new(Mutex::new(Vec::new())),
        };
        self.peers.lock().push(handle.clone());

        Ok(PeerParts {
            peer: Box::new(MockPeer {
                handle,
                auto_open: self.auto_open,
            }),
            events: events_rx,
            sender,
            receiver,
        })
    }
}

// ============================================================================
// Scripted Reachability
// ============================================================================

/// Probe answering from a script; the last answer repeats forever
pub struct ScriptedProbe {
    script: Mutex<VecDeque<bool>>,
    last: AtomicBool,
    calls: AtomicU32,
}

impl ScriptedProbe {
    pub fn always(reachable: bool) -> Arc<Self> {
        Self::sequence(vec![reachable])
    }

    pub fn sequence(script: Vec<bool>) -> Arc<Self> {
        let last = script.last().copied().unwrap_or(true);
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: AtomicBool::new(last),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_counter(&self) -> &AtomicU32 {
        &self.calls
    }
}

#[async_trait]
impl ReachabilityProbe for ScriptedProbe {
    async fn is_reachable(&self, _address: IpAddr) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.last.load(Ordering::SeqCst))
    }
}

// ============================================================================
// Scripted Signaling Endpoint
// ============================================================================

/// One scripted reply of [`FakeSignalingServer`]
#[derive(Debug, Clone)]
pub enum SignalingReply {
    /// `{"sdp": "mock-answer", "type": "answer"}`
    Accept,
    /// `{"sdp": "reject", "type": "answer"}`
    Reject,
    /// Empty body with this HTTP status
    Status(u16),
    /// 200 with a raw body
    Raw(String),
}

/// Scripted stand-in for the robot's `/offer` route.
/// Replies follow the script, then `Accept` forever.
pub struct FakeSignalingServer {
    port: u16,
    requests: Arc<Mutex<Vec<Value>>>,
    handle: tokio::task::JoinHandle<()>,
}

#[derive(Clone)]
struct OfferState {
    requests: Arc<Mutex<Vec<Value>>>,
    script: Arc<Mutex<VecDeque<SignalingReply>>>,
}

impl FakeSignalingServer {
    pub async fn start(script: Vec<SignalingReply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let router = Router::new()
            .route("/offer", post(handle_offer))
            .with_state(OfferState {
                requests: requests.clone(),
                script: Arc::new(Mutex::new(VecDeque::from(script))),
            });

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            port,
            requests,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// JSON bodies received so far, in arrival order
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Drop for FakeSignalingServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_offer(State(state): State<OfferState>, body: Bytes) -> Response {
    state
        .requests
        .lock()
        .push(serde_json::from_slice(&body).unwrap_or(Value::Null));

    let reply = state.script.lock().pop_front().unwrap_or(SignalingReply::Accept);
    match reply {
        SignalingReply::Accept => Json(json!({"sdp": MOCK_ANSWER_SDP, "type": "answer"})).into_response(),
        SignalingReply::Reject => Json(json!({"sdp": "reject", "type": "answer"})).into_response(),
        SignalingReply::Status(code) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        SignalingReply::Raw(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
    }
}

// ============================================================================
// Fake Cloud Collaborators
// ============================================================================

/// Credential provider with fixed answers
pub struct FakeCredentials {
    pub token: Result<String, String>,
    pub public_key: Result<String, String>,
    pub turn: Result<TurnServerInfo, String>,
    token_calls: AtomicU32,
}

impl FakeCredentials {
    /// Every call succeeds
    pub fn ok() -> Self {
        Self {
            token: Ok("fetched-token".to_string()),
            public_key: Ok("public-key".to_string()),
            turn: Ok(TurnServerInfo {
                user: "turn-user".to_string(),
                password: "turn-pass".to_string(),
                realm: "turn:relay.example:3478".to_string(),
            }),
            token_calls: AtomicU32::new(0),
        }
    }

    pub fn with_public_key_error(mut self, message: &str) -> Self {
        self.public_key = Err(message.to_string());
        self
    }

    pub fn with_turn(mut self, turn: TurnServerInfo) -> Self {
        self.turn = Ok(turn);
        self
    }

    pub fn token_calls(&self) -> u32 {
        self.token_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for FakeCredentials {
    async fn fetch_token(&self, _email: &str, _password: &str) -> anyhow::Result<String> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.token.clone().map_err(anyhow::Error::msg)
    }

    async fn fetch_public_key(&self) -> anyhow::Result<PublicKey> {
        self.public_key
            .clone()
            .map(PublicKey)
            .map_err(anyhow::Error::msg)
    }

    async fn fetch_turn_info(
        &self,
        _serial: &str,
        _token: &str,
        _key: &PublicKey,
    ) -> anyhow::Result<TurnServerInfo> {
        self.turn.clone().map_err(anyhow::Error::msg)
    }
}

/// Broker replying from a script (then accepting), recording offer bodies
pub struct FakeBroker {
    replies: Mutex<VecDeque<anyhow::Result<String>>>,
    bodies: Mutex<Vec<Value>>,
}

impl FakeBroker {
    pub fn accepting() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(replies: Vec<anyhow::Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            bodies: Mutex::new(Vec::new()),
        }
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().clone()
    }
}

#[async_trait]
impl SignalingBroker for FakeBroker {
    async fn send_offer(
        &self,
        _serial: &str,
        body: &str,
        _token: &str,
        _key: &PublicKey,
    ) -> anyhow::Result<String> {
        self.bodies
            .lock()
            .push(serde_json::from_str(body).unwrap_or(Value::Null));
        self.replies.lock().pop_front().unwrap_or_else(|| {
            Ok(json!({"sdp": MOCK_ANSWER_SDP, "type": "answer"}).to_string())
        })
    }
}
