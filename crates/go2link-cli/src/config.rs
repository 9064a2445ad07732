//! TOML configuration for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use go2link_client::ConnectionConfig;

/// Default relay bind address
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Default relay port
pub const DEFAULT_PORT: u16 = 12346;

/// Contents of the `--config` file
///
/// ```toml
/// [relay]
/// bind = "0.0.0.0"
/// port = 12346
///
/// [connection]
/// reachability_interval_ms = 3000
/// signaling_port = 8081
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub relay: RelaySettings,
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub bind: String,
    pub port: u16,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl CliConfig {
    /// Load from `path`, or the defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = CliConfig::parse("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.relay.port, 12346);
        assert_eq!(config.connection.signaling_port, 8081);
    }

    #[test]
    fn test_partial_sections() {
        let config = CliConfig::parse(
            r#"
            [relay]
            port = 9000

            [connection]
            reachability_interval_ms = 500
            reconnect_max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.relay.bind, "0.0.0.0");
        assert_eq!(config.relay.port, 9000);
        assert_eq!(config.connection.reachability_interval_ms, 500);
        assert_eq!(config.connection.reconnect_max_attempts, Some(5));
        assert_eq!(config.connection.signaling_retry_interval_ms, 1000);
    }

    #[test]
    fn test_rejects_wrong_types() {
        assert!(CliConfig::parse("[relay]\nport = \"high\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(CliConfig::load(Some(Path::new("/nonexistent/go2link.toml"))).is_err());
        assert!(CliConfig::load(None).is_ok());
    }
}
