//! go2link Client Library
//!
//! Connects to a Unitree Go2 over WebRTC and exposes its data channel as
//! independently subscribable topics.
//!
//! # Example
//!
//! ```ignore
//! use go2link_client::Go2ConnectionBuilder;
//! use go2link_core::{topics, ApiRequest};
//! use go2link_transport::WebRtcEngine;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (robot, pubsub) = Go2ConnectionBuilder::local_sta("192.168.8.181".parse()?)
//!         .engine(Arc::new(WebRtcEngine::new()))
//!         .connect()
//!         .await?;
//!
//!     pubsub.subscribe(topics::LOW_STATE, |state| {
//!         println!("{}", state);
//!     }).await;
//!
//!     // Stand up
//!     pubsub.publish(topics::SPORT_REQUEST, ApiRequest::without_parameter(1004)).await?;
//!
//!     robot.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod device_errors;
pub mod discovery;
pub mod error;
pub mod pubsub;
pub mod reachability;
pub mod retry;
pub mod signaling;

pub use builder::Go2ConnectionBuilder;
pub use config::ConnectionConfig;
pub use connection::{ConnectionMethod, Go2Connection, Login};
pub use credentials::{CredentialProvider, PublicKey, SignalingBroker, TurnServerInfo};
pub use device_errors::subscribe_device_errors;
pub use discovery::{DeviceDiscovery, StaticDiscovery};
pub use error::{ClientError, Result};
pub use pubsub::{ChannelState, PubSub};
pub use reachability::{PingProbe, ReachabilityProbe};
pub use retry::RetryPolicy;
pub use signaling::{
    LocalSignaling, RemoteSignaling, SignalingAnswer, SignalingKind, SignalingOffer,
    SignalingStrategy,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::Go2ConnectionBuilder;
    pub use crate::connection::{ConnectionMethod, Go2Connection};
    pub use crate::error::{ClientError, Result};
    pub use crate::pubsub::PubSub;
    pub use go2link_core::{topics, ApiRequest, Envelope};
}
