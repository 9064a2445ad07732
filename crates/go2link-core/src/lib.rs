//! go2link Core
//!
//! Wire types and pure helpers shared by the go2link crates.
//!
//! This crate provides:
//! - The topic-tagged data channel unit ([`Envelope`]) and its JSON [`codec`]
//! - Well-known topics and message type tags ([`topics`])
//! - Request payloads for the robot's API topics ([`ApiRequest`])
//! - Device error decoding and criticality heuristics ([`device_error`])

pub mod codec;
pub mod device_error;
pub mod envelope;
pub mod error;
pub mod request;
pub mod topics;

pub use codec::{decode, encode};
pub use device_error::{classify, decode_error_report, Classification, DeviceErrorRecord};
pub use envelope::Envelope;
pub use error::{Error, Result};
pub use request::ApiRequest;

/// Address of the robot on its own access point network
pub const ACCESS_POINT_ADDR: std::net::Ipv4Addr = std::net::Ipv4Addr::new(192, 168, 12, 1);

/// Port of the robot's local signaling endpoint
pub const DEFAULT_SIGNALING_PORT: u16 = 8081;

/// Public STUN server added to remote sessions
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Label of the data channel carrying envelopes
pub const DATA_CHANNEL_LABEL: &str = "data";
