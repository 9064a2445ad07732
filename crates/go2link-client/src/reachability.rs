//! Network reachability probing

use async_trait::async_trait;
use std::net::IpAddr;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// One liveness check against an address. Success or failure only.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn is_reachable(&self, address: IpAddr) -> bool;
}

/// Probe using the system `ping` utility (one echo request)
#[derive(Debug, Clone, Copy, Default)]
pub struct PingProbe;

impl PingProbe {
    fn args(address: IpAddr) -> Vec<String> {
        let address = address.to_string();
        if cfg!(windows) {
            vec!["-n".into(), "1".into(), "-w".into(), "1000".into(), address]
        } else if cfg!(target_os = "macos") {
            vec!["-c".into(), "1".into(), "-t".into(), "1".into(), address]
        } else {
            vec!["-c".into(), "1".into(), "-W".into(), "1".into(), address]
        }
    }
}

#[async_trait]
impl ReachabilityProbe for PingProbe {
    async fn is_reachable(&self, address: IpAddr) -> bool {
        let status = Command::new("ping")
            .args(Self::args(address))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("ping {} failed to run: {}", address, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_single_echo_request() {
        let args = PingProbe::args(IpAddr::V4(Ipv4Addr::new(192, 168, 12, 1)));
        assert_eq!(args.last().map(String::as_str), Some("192.168.12.1"));
        assert!(args.iter().any(|a| a == "1"));
    }
}
