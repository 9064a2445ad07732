//! Connection builder pattern

use std::net::IpAddr;
use std::sync::Arc;

use go2link_transport::PeerEngine;

use crate::config::ConnectionConfig;
use crate::connection::{Collaborators, ConnectionMethod, Go2Connection, Login};
use crate::credentials::{CredentialProvider, SignalingBroker};
use crate::discovery::{DeviceDiscovery, StaticDiscovery};
use crate::error::{ClientError, Result};
use crate::pubsub::PubSub;
use crate::reachability::{PingProbe, ReachabilityProbe};

/// Builder for [`Go2Connection`]
pub struct Go2ConnectionBuilder {
    method: ConnectionMethod,
    token: String,
    login: Option<Login>,
    config: ConnectionConfig,
    engine: Option<Arc<dyn PeerEngine>>,
    probe: Option<Arc<dyn ReachabilityProbe>>,
    discovery: Option<Arc<dyn DeviceDiscovery>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    broker: Option<Arc<dyn SignalingBroker>>,
}

impl Go2ConnectionBuilder {
    /// Create a new builder
    pub fn new(method: ConnectionMethod) -> Self {
        Self {
            method,
            token: String::new(),
            login: None,
            config: ConnectionConfig::default(),
            engine: None,
            probe: None,
            discovery: None,
            credentials: None,
            broker: None,
        }
    }

    /// Robot on its own access point
    pub fn local_ap() -> Self {
        Self::new(ConnectionMethod::LocalAp)
    }

    /// Robot on the home network at `address`
    pub fn local_sta(address: IpAddr) -> Self {
        Self::new(ConnectionMethod::LocalSta { address })
    }

    /// Set the access token sent with every offer
    pub fn token(mut self, token: &str) -> Self {
        self.token = token.to_string();
        self
    }

    /// Fetch a token with this login when none is set
    pub fn login(mut self, email: &str, password: &str) -> Self {
        self.login = Some(Login {
            email: email.to_string(),
            password: password.to_string(),
        });
        self
    }

    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the transport engine (required)
    pub fn engine(mut self, engine: Arc<dyn PeerEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the reachability probe (defaults to [`PingProbe`])
    pub fn probe(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Set device discovery (defaults to an empty table)
    pub fn discovery(mut self, discovery: Arc<dyn DeviceDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn broker(mut self, broker: Arc<dyn SignalingBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Build without connecting
    pub fn build(self) -> Result<Go2Connection> {
        let engine = self
            .engine
            .ok_or_else(|| ClientError::Other("no transport engine configured".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(self.config.signaling_timeout())
            .build()
            .map_err(|e| ClientError::Other(format!("HTTP client: {}", e)))?;

        let collaborators = Collaborators {
            engine,
            probe: self.probe.unwrap_or_else(|| Arc::new(PingProbe)),
            discovery: self
                .discovery
                .unwrap_or_else(|| Arc::new(StaticDiscovery::new())),
            credentials: self.credentials,
            broker: self.broker,
            http,
        };

        Ok(Go2Connection::new(
            self.method,
            self.config,
            self.token,
            self.login,
            collaborators,
        ))
    }

    /// Build and connect
    pub async fn connect(self) -> Result<(Go2Connection, Arc<PubSub>)> {
        let connection = self.build()?;
        let pubsub = connection.connect().await?;
        Ok((connection, pubsub))
    }
}
