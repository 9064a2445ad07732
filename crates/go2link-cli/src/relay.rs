//! Line-delimited JSON relay between TCP clients and one robot
//!
//! Clients send one JSON object per line:
//! - `{"ip_address": "192.168.8.181"}` connects to the robot on the local
//!   network unless a robot connection already exists
//! - `{"api_id": 1008, "params": {"x": 0.5, "y": 0, "z": 0}}` publishes a
//!   sport request
//!
//! Low-state updates are pushed to every client as
//! `{"type":"status_update","data":...}`. The robot connection is closed
//! whenever a client disconnects.

use anyhow::{Context, Result};
use colored::Colorize;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use go2link_client::{ConnectionConfig, Go2Connection, Go2ConnectionBuilder, PubSub, ReachabilityProbe};
use go2link_core::{topics, ApiRequest};
use go2link_transport::{PeerEngine, WebRtcEngine};

/// Run the relay until a shutdown signal arrives
pub async fn run_relay(
    bind: &str,
    port: u16,
    config: ConnectionConfig,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", bind, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!(
        "{} Relay listening on {}",
        "OK".green().bold(),
        listener.local_addr()?
    );
    println!("  Robot topics: {} -> clients", topics::LOW_STATE.yellow());
    println!("  Commands:     clients -> {}", topics::SPORT_REQUEST.yellow());
    println!("  Press Ctrl+C to stop");

    let relay = Relay::new(config, Arc::new(WebRtcEngine::new()));
    relay.serve(listener, shutdown_rx).await;

    println!("{}", "Relay stopped".yellow());
    Ok(())
}

struct RobotSlot {
    id: u64,
    conn: Go2Connection,
}

/// Shared state of the relay
pub struct Relay {
    config: ConnectionConfig,
    engine: Arc<dyn PeerEngine>,
    probe: Option<Arc<dyn ReachabilityProbe>>,
    clients: Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
    next_client: AtomicU64,
    robot: Mutex<Option<RobotSlot>>,
    next_robot: AtomicU64,
}

impl Relay {
    pub fn new(config: ConnectionConfig, engine: Arc<dyn PeerEngine>) -> Arc<Self> {
        Self::build(config, engine, None)
    }

    fn build(
        config: ConnectionConfig,
        engine: Arc<dyn PeerEngine>,
        probe: Option<Arc<dyn ReachabilityProbe>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            engine,
            probe,
            clients: Mutex::new(HashMap::new()),
            next_client: AtomicU64::new(1),
            robot: Mutex::new(None),
            next_robot: AtomicU64::new(1),
        })
    }

    /// Use `probe` instead of ICMP ping for robot reachability
    #[cfg(test)]
    fn with_probe(
        config: ConnectionConfig,
        engine: Arc<dyn PeerEngine>,
        probe: Arc<dyn ReachabilityProbe>,
    ) -> Arc<Self> {
        Self::build(config, engine, Some(probe))
    }

    /// Accept clients until `shutdown_rx` fires, then drop the robot
    pub async fn serve(self: &Arc<Self>, listener: TcpListener, shutdown_rx: &mut mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let relay = Arc::clone(self);
                            tokio::spawn(async move {
                                relay.serve_client(stream, peer).await;
                            });
                        }
                        Err(e) => warn!("Accept failed: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Relay shutting down");
                    break;
                }
            }
        }

        self.disconnect_robot().await;
    }

    async fn serve_client(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let id = self.next_client.fetch_add(1, Ordering::SeqCst);
        let (read_half, mut write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        self.clients.lock().insert(id, tx);
        info!("Client {} connected", peer);

        let writer = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if let Err(e) = write_half.write_all(line.as_bytes()).await {
                    debug!("Client write failed: {}", e);
                    break;
                }
            }
        });

        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if !line.trim().is_empty() {
                        self.handle_line(&line).await;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Client {} read error: {}", peer, e);
                    break;
                }
            }
        }

        self.clients.lock().remove(&id);
        writer.abort();
        info!("Client {} disconnected", peer);

        self.disconnect_robot().await;
    }

    async fn handle_line(self: &Arc<Self>, line: &str) {
        let message: Value = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring malformed client line: {}", e);
                return;
            }
        };
        debug!("Client message: {}", message);

        match message.get("ip_address") {
            Some(address) if !self.has_robot() => match parse_address(address) {
                Some(address) => {
                    let relay = Arc::clone(self);
                    tokio::spawn(async move {
                        relay.connect_robot(address).await;
                    });
                }
                None => warn!("Invalid robot address: {}", address),
            },
            _ => self.send_command(&message).await,
        }
    }

    async fn connect_robot(self: Arc<Self>, address: IpAddr) {
        let mut builder = Go2ConnectionBuilder::local_sta(address)
            .engine(self.engine.clone())
            .config(self.config.clone());
        if let Some(probe) = &self.probe {
            builder = builder.probe(probe.clone());
        }

        let conn = match builder.build() {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to set up robot connection: {}", e);
                return;
            }
        };

        let id = self.next_robot.fetch_add(1, Ordering::SeqCst);
        {
            let mut slot = self.robot.lock();
            if slot.is_some() {
                debug!("Robot connection already in progress");
                return;
            }
            *slot = Some(RobotSlot {
                id,
                conn: conn.clone(),
            });
        }

        let weak = Arc::downgrade(&self);
        conn.on_reconnected(move || {
            info!("Robot reconnected; restoring status updates");
            if let Some(relay) = weak.upgrade() {
                tokio::spawn(async move {
                    relay.subscribe_status().await;
                });
            }
        });

        info!("Connecting to robot at {}", address);
        match conn.connect().await {
            Ok(_) => {
                info!("Connected to robot at {}", address);
                self.subscribe_status().await;
            }
            Err(e) => {
                error!("Failed to connect to robot at {}: {}", address, e);
                self.clear_robot(id);
            }
        }
    }

    async fn subscribe_status(self: &Arc<Self>) {
        let Some(pubsub) = self.robot_pubsub() else {
            warn!("Not connected to the robot; status updates unavailable");
            return;
        };

        let weak = Arc::downgrade(self);
        pubsub
            .subscribe(topics::LOW_STATE, move |data| {
                if let Some(relay) = weak.upgrade() {
                    relay.broadcast_status(data);
                }
            })
            .await;
        info!("Subscribed to robot status updates");
    }

    fn broadcast_status(&self, data: &Value) {
        let line = status_line(data);
        for (id, client) in self.clients.lock().iter() {
            if client.send(line.clone()).is_err() {
                debug!("Client {} is gone; status update skipped", id);
            }
        }
    }

    async fn send_command(&self, message: &Value) {
        let Some(api_id) = message.get("api_id").and_then(parse_api_id) else {
            warn!("No API id given; command not sent");
            return;
        };
        let parameter = sport_parameter(message.get("params").unwrap_or(&Value::Null));

        let Some(pubsub) = self.robot_pubsub() else {
            warn!("Not connected to the robot; send an ip_address first");
            return;
        };

        info!("Sending command {} to robot", api_id);
        let request = ApiRequest::new(api_id, parameter);
        if let Err(e) = pubsub.publish(topics::SPORT_REQUEST, &request).await {
            warn!("Command {} not sent: {}", api_id, e);
        }
    }

    fn has_robot(&self) -> bool {
        self.robot.lock().is_some()
    }

    fn robot_pubsub(&self) -> Option<Arc<PubSub>> {
        self.robot.lock().as_ref().and_then(|slot| slot.conn.pubsub())
    }

    fn clear_robot(&self, id: u64) {
        let mut slot = self.robot.lock();
        if slot.as_ref().is_some_and(|s| s.id == id) {
            *slot = None;
        }
    }

    async fn disconnect_robot(&self) {
        let slot = self.robot.lock().take();
        if let Some(slot) = slot {
            info!("Closing robot connection");
            slot.conn.disconnect().await;
        }
    }
}

fn parse_address(value: &Value) -> Option<IpAddr> {
    value.as_str()?.trim().parse().ok()
}

/// API id from a number or a numeric string; zero means none
fn parse_api_id(value: &Value) -> Option<u32> {
    let id = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    u32::try_from(id).ok().filter(|id| *id != 0)
}

/// Movement parameters are forwarded only when `x`, `y` and `z` are all
/// present; anything else is sent as an empty parameter.
fn sport_parameter(params: &Value) -> String {
    let complete = params
        .as_object()
        .is_some_and(|p| ["x", "y", "z"].iter().all(|k| p.contains_key(*k)));

    if complete {
        params.to_string()
    } else {
        debug!("Parameters do not contain x, y and z; sending none");
        String::new()
    }
}

fn status_line(data: &Value) -> String {
    format!("{}\n", json!({ "type": "status_update", "data": data }))
}
