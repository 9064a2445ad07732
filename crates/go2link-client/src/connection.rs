//! Connection orchestrator
//!
//! [`Go2Connection`] owns the peer connection of the current session. It
//! plans the session (address, ICE servers, signaling strategy), negotiates
//! it, and heals it: a `failed` or `closed` report from the engine on an
//! established session starts one automatic reconnect sequence, and the
//! same report during a handshake makes that handshake start over.
//!
//! All lifecycle operations serialize on the session lock, so two
//! reconnect sequences never overlap. `disconnect()` is the only way to
//! stop an in-flight attempt: it cancels the current token before taking
//! the lock, and every waiting loop selects on that token.

use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::net::IpAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use go2link_core::ACCESS_POINT_ADDR;
use go2link_transport::{
    IceServer, PeerConfig, PeerConnection, PeerConnectionState, PeerEngine, PeerEvent, PeerParts,
};

use crate::config::ConnectionConfig;
use crate::credentials::{CredentialProvider, SignalingBroker, TurnServerInfo};
use crate::discovery::DeviceDiscovery;
use crate::error::{ClientError, Result};
use crate::pubsub::PubSub;
use crate::reachability::ReachabilityProbe;
use crate::signaling::{
    LocalSignaling, RemoteSignaling, SignalingAnswer, SignalingKind, SignalingOffer,
    SignalingStrategy, STATION_NETWORK_ID,
};

/// How to reach the robot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMethod {
    /// Robot's own access point, fixed address
    LocalAp,
    /// Robot on the home network at a known address
    LocalSta { address: IpAddr },
    /// Robot on the home network, address looked up by serial number
    LocalDiscovered { serial: String },
    /// Through the vendor cloud
    Remote { serial: String },
}

impl ConnectionMethod {
    pub fn signaling_kind(&self) -> SignalingKind {
        match self {
            ConnectionMethod::LocalAp | ConnectionMethod::LocalSta { .. } => {
                SignalingKind::LocalDirect
            }
            ConnectionMethod::LocalDiscovered { .. } => SignalingKind::LocalDiscovered,
            ConnectionMethod::Remote { .. } => SignalingKind::RemoteBrokered,
        }
    }

    /// Routing id carried in local offers
    fn routing_id(&self) -> &'static str {
        match self {
            ConnectionMethod::LocalAp => "",
            _ => STATION_NETWORK_ID,
        }
    }
}

/// Account login used to obtain a token when none is configured
#[derive(Clone, PartialEq, Eq)]
pub struct Login {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Login {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Login")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Callback invoked after a successful reconnect
pub type ReconnectedCallback = Arc<dyn Fn() + Send + Sync>;

pub(crate) struct Collaborators {
    pub engine: Arc<dyn PeerEngine>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub discovery: Arc<dyn DeviceDiscovery>,
    pub credentials: Option<Arc<dyn CredentialProvider>>,
    pub broker: Option<Arc<dyn SignalingBroker>>,
    pub http: reqwest::Client,
}

/// A live (or negotiating) session
struct Session {
    generation: u64,
    kind: SignalingKind,
    peer: Box<dyn PeerConnection>,
    pubsub: Arc<PubSub>,
    /// Stops the state pump
    token: CancellationToken,
    /// Fired when the engine reports the connection failed or closed
    lost: CancellationToken,
}

impl Session {
    async fn shutdown(&self) {
        self.token.cancel();
        self.pubsub.close().await;
        if let Err(e) = self.peer.close().await {
            debug!("Peer close: {}", e);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Everything decided before the peer connection is created
struct SessionPlan {
    /// Address to probe before signaling (local methods only)
    address: Option<IpAddr>,
    ice_servers: Vec<IceServer>,
    strategy: Box<dyn SignalingStrategy>,
}

struct Inner {
    method: ConnectionMethod,
    config: ConnectionConfig,
    token: RwLock<String>,
    login: Option<Login>,
    collaborators: Collaborators,

    /// Current session; also the lifecycle lock
    session: tokio::sync::Mutex<Option<Session>>,
    /// Cancels in-flight attempts; replaced after it fires
    cancel: Mutex<CancellationToken>,
    /// Last generation handed to a peer connection
    generation: AtomicU64,
    /// Generation of the installed session, 0 when none
    live_generation: AtomicU64,
    reconnect_pending: AtomicBool,
    user_disconnected: AtomicBool,

    state: RwLock<PeerConnectionState>,
    current: RwLock<Option<Arc<PubSub>>>,
    on_reconnected: RwLock<Option<ReconnectedCallback>>,
}

/// Self-healing connection to one robot
#[derive(Clone)]
pub struct Go2Connection {
    inner: Arc<Inner>,
}

impl Go2Connection {
    pub(crate) fn new(
        method: ConnectionMethod,
        config: ConnectionConfig,
        token: String,
        login: Option<Login>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                method,
                config,
                token: RwLock::new(token),
                login,
                collaborators,
                session: tokio::sync::Mutex::new(None),
                cancel: Mutex::new(CancellationToken::new()),
                generation: AtomicU64::new(0),
                live_generation: AtomicU64::new(0),
                reconnect_pending: AtomicBool::new(false),
                user_disconnected: AtomicBool::new(false),
                state: RwLock::new(PeerConnectionState::New),
                current: RwLock::new(None),
                on_reconnected: RwLock::new(None),
            }),
        }
    }

    /// Create a builder
    pub fn builder(method: ConnectionMethod) -> crate::Go2ConnectionBuilder {
        crate::Go2ConnectionBuilder::new(method)
    }

    /// Establish a session and return its topic router.
    ///
    /// Waits without bound for the robot to become reachable and for a busy
    /// robot to accept the offer, unless the config sets attempt caps. Use
    /// [`connect_timeout`](Self::connect_timeout) or `disconnect()` to give
    /// up. If a session already exists its router is returned.
    pub async fn connect(&self) -> Result<Arc<PubSub>> {
        self.inner.user_disconnected.store(false, Ordering::SeqCst);
        let cancel = self.inner.arm();
        self.connect_with(cancel).await
    }

    /// [`connect`](Self::connect) with an upper bound on the whole handshake.
    /// On expiry the in-flight attempt is stopped and
    /// [`ClientError::HandshakeTimeout`] is returned.
    pub async fn connect_timeout(&self, timeout: Duration) -> Result<Arc<PubSub>> {
        self.inner.user_disconnected.store(false, Ordering::SeqCst);
        let root = self.inner.arm();
        let attempt = root.child_token();

        let timer = {
            let attempt = attempt.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                attempt.cancel();
            })
        };

        let result = self.connect_with(attempt).await;
        timer.abort();

        match result {
            Err(ClientError::Cancelled) if !root.is_cancelled() => {
                warn!("Handshake did not complete within {:?}", timeout);
                Err(ClientError::HandshakeTimeout)
            }
            other => other,
        }
    }

    async fn connect_with(&self, cancel: CancellationToken) -> Result<Arc<PubSub>> {
        let mut slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            slot = self.inner.session.lock() => slot,
        };

        if let Some(session) = slot.as_ref() {
            debug!("Already connected");
            return Ok(Arc::clone(&session.pubsub));
        }

        let session = self.inner.open_healing(&cancel).await?;
        let pubsub = Arc::clone(&session.pubsub);
        self.inner.install(&mut slot, session);
        Ok(pubsub)
    }

    /// Close the session if there is one. Stops any in-flight connect or
    /// reconnect attempt. Safe to call any number of times.
    pub async fn disconnect(&self) {
        self.inner.user_disconnected.store(true, Ordering::SeqCst);
        self.inner.cancel.lock().cancel();

        let mut slot = self.inner.session.lock().await;
        match slot.take() {
            Some(session) => {
                self.inner.teardown(session).await;
                info!("Disconnected");
            }
            None => debug!("Disconnect: no active session"),
        }
    }

    /// Tear down the current session, open a new one, then run the
    /// reconnected callback
    pub async fn reconnect(&self) -> Result<Arc<PubSub>> {
        self.inner.user_disconnected.store(false, Ordering::SeqCst);
        let cancel = self.inner.arm();

        let mut slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            slot = self.inner.session.lock() => slot,
        };

        if let Some(old) = slot.take() {
            self.inner.teardown(old).await;
        }

        let session = self.inner.open_healing(&cancel).await?;
        let pubsub = Arc::clone(&session.pubsub);
        self.inner.install(&mut slot, session);
        drop(slot);

        info!("Reconnected");
        self.inner.notify_reconnected();
        Ok(pubsub)
    }

    /// Register the callback run after every successful reconnect. Replaces
    /// any earlier registration.
    pub fn on_reconnected<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.inner.on_reconnected.write() = Some(Arc::new(callback));
    }

    /// Topic router of the current session
    pub fn pubsub(&self) -> Option<Arc<PubSub>> {
        self.inner.current.read().clone()
    }

    /// Check if a session is installed and its channel is open
    pub fn is_connected(&self) -> bool {
        self.inner
            .current
            .read()
            .as_ref()
            .map_or(false, |pubsub| pubsub.is_open())
    }

    /// Last peer connection state reported by the engine
    pub fn state(&self) -> PeerConnectionState {
        *self.inner.state.read()
    }

    pub fn method(&self) -> &ConnectionMethod {
        &self.inner.method
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }
}

impl Inner {
    /// Token for a new attempt. A token cancelled by an earlier
    /// `disconnect()` is replaced.
    fn arm(&self) -> CancellationToken {
        let mut cancel = self.cancel.lock();
        if cancel.is_cancelled() {
            *cancel = CancellationToken::new();
        }
        cancel.clone()
    }

    async fn open_session(self: &Arc<Self>, cancel: &CancellationToken) -> Result<Session> {
        let plan = self.plan(cancel).await?;
        let kind = plan.strategy.kind();
        info!("Connecting via {} signaling", kind);

        let peer_config = PeerConfig {
            ice_servers: plan.ice_servers.clone(),
            channel_label: self.config.channel_label.clone(),
            media_transceivers: self.config.media_transceivers,
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let PeerParts {
            peer,
            events,
            sender,
            receiver,
        } = until_cancelled(cancel, self.collaborators.engine.create_peer(peer_config)).await??;

        let session = Session {
            generation,
            kind,
            peer,
            pubsub: PubSub::new(sender, receiver),
            token: cancel.child_token(),
            lost: CancellationToken::new(),
        };
        self.spawn_state_pump(generation, events, session.token.clone(), session.lost.clone());

        match self.negotiate(&session, &plan, cancel).await {
            Ok(()) => Ok(session),
            Err(e) => {
                session.shutdown().await;
                Err(e)
            }
        }
    }

    /// Open a session, starting over whenever the engine reports the peer
    /// connection failed or closed before the channel opened. Other errors
    /// end the attempt.
    async fn open_healing(self: &Arc<Self>, cancel: &CancellationToken) -> Result<Session> {
        let policy = self.config.reconnect_policy();
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.open_session(cancel).await {
                Err(ClientError::HandshakeFailed(reason)) => {
                    if !policy.allows(attempts) {
                        return Err(ClientError::HandshakeFailed(reason));
                    }
                    warn!(
                        "Handshake failed ({}), starting over in {:?}",
                        reason, policy.interval
                    );
                    policy.wait(cancel).await?;
                }
                other => return other,
            }
        }
    }

    async fn plan(&self, cancel: &CancellationToken) -> Result<SessionPlan> {
        let token = until_cancelled(cancel, self.ensure_token()).await??;

        match &self.method {
            ConnectionMethod::LocalAp => {
                Ok(self.local_plan(IpAddr::V4(ACCESS_POINT_ADDR), SignalingKind::LocalDirect, token))
            }
            ConnectionMethod::LocalSta { address } => {
                Ok(self.local_plan(*address, SignalingKind::LocalDirect, token))
            }
            ConnectionMethod::LocalDiscovered { serial } => {
                let address = until_cancelled(cancel, self.discover(serial)).await??;
                info!("Found {} at {}", serial, address);
                Ok(self.local_plan(address, SignalingKind::LocalDiscovered, token))
            }
            ConnectionMethod::Remote { serial } => {
                until_cancelled(cancel, self.remote_plan(serial, token)).await?
            }
        }
    }

    fn local_plan(&self, address: IpAddr, kind: SignalingKind, token: String) -> SessionPlan {
        SessionPlan {
            address: Some(address),
            ice_servers: Vec::new(),
            strategy: Box::new(LocalSignaling::new(
                kind,
                address,
                self.config.signaling_port,
                self.method.routing_id(),
                token,
                self.collaborators.http.clone(),
            )),
        }
    }

    async fn remote_plan(&self, serial: &str, token: String) -> Result<SessionPlan> {
        let credentials = self.collaborators.credentials.as_ref().ok_or_else(|| {
            ClientError::CredentialFetch("no credential provider configured".to_string())
        })?;
        let broker = self.collaborators.broker.as_ref().ok_or_else(|| {
            ClientError::CredentialFetch("no signaling broker configured".to_string())
        })?;

        let key = credentials
            .fetch_public_key()
            .await
            .map_err(|e| ClientError::CredentialFetch(format!("public key: {:#}", e)))?;

        let turn = credentials
            .fetch_turn_info(serial, &token, &key)
            .await
            .map_err(|e| ClientError::CredentialFetch(format!("TURN info: {:#}", e)))?;

        let ice_servers = self.remote_ice_servers(&turn)?;
        debug!("TURN relay {} for {}", turn.realm, serial);

        Ok(SessionPlan {
            address: None,
            ice_servers,
            strategy: Box::new(RemoteSignaling::new(
                serial,
                token,
                key,
                turn,
                Arc::clone(broker),
            )),
        })
    }

    fn remote_ice_servers(&self, turn: &TurnServerInfo) -> Result<Vec<IceServer>> {
        if !turn.is_complete() {
            return Err(ClientError::CredentialFetch(
                "TURN info is missing user, password or realm".to_string(),
            ));
        }
        Ok(vec![
            IceServer::turn(&turn.realm, &turn.user, &turn.password),
            IceServer::stun(&self.config.stun_server),
        ])
    }

    async fn discover(&self, serial: &str) -> Result<IpAddr> {
        let devices = self.collaborators.discovery.resolve().await;
        if devices.is_empty() {
            return Err(ClientError::AddressResolution(
                "no devices found on the network; provide an IP address instead".to_string(),
            ));
        }
        devices.get(serial).copied().ok_or_else(|| {
            ClientError::AddressResolution(format!(
                "device with serial {} not found on the network; provide an IP address instead",
                serial
            ))
        })
    }

    /// Configured token, or one fetched with the login
    async fn ensure_token(&self) -> Result<String> {
        let token = self.token.read().clone();
        if !token.is_empty() {
            return Ok(token);
        }

        let Some(login) = &self.login else {
            return Ok(token);
        };

        let credentials = self.collaborators.credentials.as_ref().ok_or_else(|| {
            ClientError::CredentialFetch("login given but no credential provider".to_string())
        })?;

        let token = credentials
            .fetch_token(&login.email, &login.password)
            .await
            .map_err(|e| ClientError::CredentialFetch(format!("token: {:#}", e)))?;

        info!("Obtained access token for {}", login.email);
        *self.token.write() = token.clone();
        Ok(token)
    }

    async fn negotiate(
        &self,
        session: &Session,
        plan: &SessionPlan,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let description = until_cancelled(cancel, session.peer.create_offer()).await??;

        if let Some(address) = plan.address {
            self.wait_reachable(address, cancel).await?;
        }

        let offer = plan.strategy.offer(&description);
        let answer = self
            .exchange(plan.strategy.as_ref(), &offer, cancel, &session.lost)
            .await?;

        session.peer.set_remote_answer(answer.into_description()).await?;
        debug!("Remote answer applied, waiting for data channel");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            _ = session.lost.cancelled() => Err(ClientError::HandshakeFailed(
                "peer connection lost before the data channel opened".to_string(),
            )),
            opened = session.pubsub.wait_until_open() => opened,
        }
    }

    async fn wait_reachable(&self, address: IpAddr, cancel: &CancellationToken) -> Result<()> {
        let policy = self.config.reachability_policy();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let reachable =
                until_cancelled(cancel, self.collaborators.probe.is_reachable(address)).await?;
            if reachable {
                info!("{} is reachable", address);
                return Ok(());
            }
            if !policy.allows(attempts) {
                return Err(ClientError::Unreachable(address.to_string()));
            }
            info!(
                "{} is not reachable yet, retrying in {:?}",
                address, policy.interval
            );
            policy.wait(cancel).await?;
        }
    }

    /// Send the same offer until the robot accepts it
    async fn exchange(
        &self,
        strategy: &dyn SignalingStrategy,
        offer: &SignalingOffer,
        cancel: &CancellationToken,
        lost: &CancellationToken,
    ) -> Result<SignalingAnswer> {
        let policy = self.config.signaling_policy();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = lost.cancelled() => return Err(ClientError::HandshakeFailed(
                    "peer connection lost during signaling".to_string(),
                )),
                result = strategy.exchange(offer) => result,
            };

            let failure = match result {
                Ok(answer) if answer.is_rejected() => {
                    warn!(
                        "Robot is connected by another WebRTC client, retrying in {:?}",
                        policy.interval
                    );
                    ClientError::PeerRejected
                }
                Ok(answer) => {
                    info!("Signaling answer received");
                    return Ok(answer);
                }
                Err(ClientError::SignalingTransport(reason)) => {
                    warn!(
                        "Signaling failed ({}); check the robot is switched on. Retrying in {:?}",
                        reason, policy.interval
                    );
                    ClientError::SignalingTransport(reason)
                }
                Err(e) => return Err(e),
            };

            if !policy.allows(attempts) {
                return Err(failure);
            }
            policy.wait(cancel).await?;
        }
    }

    fn spawn_state_pump(
        self: &Arc<Self>,
        generation: u64,
        mut events: mpsc::Receiver<PeerEvent>,
        token: CancellationToken,
        lost: CancellationToken,
    ) {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                if let PeerEvent::Connection(state) = &event {
                    if state.is_lost() {
                        lost.cancel();
                    }
                }

                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.on_peer_event(generation, event);
            }
        });
    }

    /// Single entry point for engine notifications
    fn on_peer_event(self: &Arc<Self>, generation: u64, event: PeerEvent) {
        match event {
            PeerEvent::IceGathering(state) => info!("ICE gathering state: {}", state),
            PeerEvent::IceConnection(state) => info!("ICE connection state: {}", state),
            PeerEvent::Signaling(state) => info!("Signaling state: {}", state),
            PeerEvent::Track { kind } => info!("Receiving {} track", kind),
            PeerEvent::Connection(state) => {
                info!("Peer connection state: {}", state);
                if generation == self.generation.load(Ordering::SeqCst) {
                    *self.state.write() = state;
                }
                if state == PeerConnectionState::Connected {
                    info!("Connected to the robot");
                } else if state.is_lost() {
                    self.trigger_reconnect(generation);
                }
            }
        }
    }

    /// Start one automatic reconnect for a lost session. Triggers for a
    /// stale generation, after `disconnect()`, or while one is already
    /// pending are dropped.
    fn trigger_reconnect(self: &Arc<Self>, generation: u64) {
        if self.live_generation.load(Ordering::SeqCst) != generation {
            debug!("Ignoring loss of inactive session {}", generation);
            return;
        }
        if self.user_disconnected.load(Ordering::SeqCst) {
            return;
        }
        if self.reconnect_pending.swap(true, Ordering::SeqCst) {
            debug!("Reconnect already pending");
            return;
        }

        warn!("Connection lost, reconnecting");
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.auto_reconnect(generation).await;
            inner.reconnect_pending.store(false, Ordering::SeqCst);
        });
    }

    async fn auto_reconnect(self: &Arc<Self>, generation: u64) {
        let cancel = self.arm();
        if self.user_disconnected.load(Ordering::SeqCst) {
            return;
        }

        let mut slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            slot = self.session.lock() => slot,
        };

        if slot.as_ref().map(|s| s.generation) != Some(generation) {
            debug!("Session {} already replaced", generation);
            return;
        }
        if let Some(old) = slot.take() {
            self.teardown(old).await;
        }

        let policy = self.config.reconnect_policy();
        let mut attempts = 0;
        loop {
            if self.user_disconnected.load(Ordering::SeqCst) {
                return;
            }
            attempts += 1;

            match self.open_session(&cancel).await {
                Ok(session) => {
                    self.reconnect_pending.store(false, Ordering::SeqCst);
                    self.install(&mut slot, session);
                    drop(slot);
                    info!("Reconnected after {} attempt(s)", attempts);
                    self.notify_reconnected();
                    return;
                }
                Err(ClientError::Cancelled) => return,
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempts, e);
                    if !policy.allows(attempts) {
                        error!("Giving up reconnecting after {} attempts", attempts);
                        return;
                    }
                    if policy.wait(&cancel).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn install(self: &Arc<Self>, slot: &mut Option<Session>, session: Session) {
        let generation = session.generation;
        let lost = session.lost.clone();
        info!("Session {} established via {}", generation, session.kind);

        *self.current.write() = Some(Arc::clone(&session.pubsub));
        *slot = Some(session);
        self.live_generation.store(generation, Ordering::SeqCst);

        // Lost between the channel opening and installation
        if lost.is_cancelled() {
            self.trigger_reconnect(generation);
        }
    }

    async fn teardown(&self, session: Session) {
        self.live_generation.store(0, Ordering::SeqCst);
        *self.current.write() = None;
        session.shutdown().await;
        *self.state.write() = PeerConnectionState::Closed;
    }

    fn notify_reconnected(&self) {
        let callback = self.on_reconnected.read().clone();
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                error!("Reconnected callback panicked");
            }
        }
    }
}

/// Run `future` unless `cancel` fires first
async fn until_cancelled<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        output = future => Ok(output),
    }
}
