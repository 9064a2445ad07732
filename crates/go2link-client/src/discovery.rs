//! Device discovery collaborator

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;

/// Resolves device serial numbers to addresses on the local network.
/// Best effort: an empty map means nothing was found.
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    async fn resolve(&self) -> HashMap<String, IpAddr>;
}

/// Discovery over a fixed serial → address table
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    devices: HashMap<String, IpAddr>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, serial: impl Into<String>, address: IpAddr) -> Self {
        self.devices.insert(serial.into(), address);
        self
    }
}

#[async_trait]
impl DeviceDiscovery for StaticDiscovery {
    async fn resolve(&self) -> HashMap<String, IpAddr> {
        self.devices.clone()
    }
}
