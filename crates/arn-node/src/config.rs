//! Node configuration, read from TOML.
//!
//! ```toml
//! notification_capacity = 64
//!
//! [identity]
//! key_path = "/var/lib/arn/identity.key"
//!
//! [network]
//! relays = ["wss://relay.damus.io", "wss://nos.lol"]
//! transport = "websocket"
//!
//! [timers]
//! ping_interval_secs = 30
//!
//! [agent]
//! agentId = "price-analysis-agent"
//! name = "Price Analysis"
//! capabilities = ["technical_analysis"]
//! reputation = 0.9
//! cost = "$0.01"
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use arn_protocol::constants::*;
use arn_protocol::AgentAdvertisement;
use serde::{Deserialize, Serialize};

use crate::NodeError;

/// Comma-separated relay urls that replace the configured list.
pub const RELAYS_ENV: &str = "ARN_RELAYS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Buffer of each notification subscriber's channel.
    pub notification_capacity: usize,
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub timers: TimerConfig,
    /// Profile announced on start and re-announced periodically.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentAdvertisement>,
    pub logging: LoggingConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            notification_capacity: 64,
            identity: IdentityConfig::default(),
            network: NetworkConfig::default(),
            timers: TimerConfig::default(),
            agent: None,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Defaults to `<data dir>/arn/identity.key`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Websocket,
    /// In-process relays; nothing leaves the process.
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub relays: Vec<String>,
    pub transport: TransportKind,
    pub connect_timeout_secs: u64,
    pub publish_timeout_secs: u64,
    pub discovery_window_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            relays: DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect(),
            transport: TransportKind::default(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            publish_timeout_secs: DEFAULT_PUBLISH_TIMEOUT_SECS,
            discovery_window_ms: DEFAULT_DISCOVERY_WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub ping_interval_secs: u64,
    pub sweep_interval_secs: u64,
    pub stale_after_secs: u64,
    pub announce_interval_secs: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            announce_interval_secs: DEFAULT_ANNOUNCE_INTERVAL_SECS,
        }
    }
}

impl TimerConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// `<config dir>/arn/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("arn").join("config.toml"))
    }

    /// Load from `path` (or the default location), falling back to defaults
    /// when the file does not exist, then apply `ARN_RELAYS`.
    pub fn load(path: Option<&Path>) -> Result<Self, NodeError> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match path {
            Some(ref p) if p.exists() => {
                let content = std::fs::read_to_string(p)
                    .map_err(|e| NodeError::Config(format!("read {}: {e}", p.display())))?;
                Self::from_toml_str(&content)?
            }
            _ => Self::default(),
        };
        config.apply_relay_override(std::env::var(RELAYS_ENV).ok().as_deref());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, NodeError> {
        toml::from_str(content).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Replace the relay list with a comma-separated override, if non-empty.
    pub fn apply_relay_override(&mut self, value: Option<&str>) {
        let Some(value) = value else { return };
        let relays: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();
        if !relays.is_empty() {
            self.network.relays = relays;
        }
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.network.relays.is_empty() {
            return Err(NodeError::Config("at least one relay is required".into()));
        }
        let t = &self.timers;
        for (name, value) in [
            ("ping_interval_secs", t.ping_interval_secs),
            ("sweep_interval_secs", t.sweep_interval_secs),
            ("stale_after_secs", t.stale_after_secs),
            ("announce_interval_secs", t.announce_interval_secs),
        ] {
            if value == 0 {
                return Err(NodeError::Config(format!("timers.{name} must be positive")));
            }
        }
        if t.announce_interval_secs >= t.stale_after_secs {
            return Err(NodeError::Config(
                "timers.announce_interval_secs must be below timers.stale_after_secs".into(),
            ));
        }
        if self.notification_capacity == 0 {
            return Err(NodeError::Config("notification_capacity must be positive".into()));
        }
        if let Some(agent) = &self.agent {
            agent
                .validate()
                .map_err(|e| NodeError::Config(format!("agent: {e}")))?;
        }
        Ok(())
    }

    /// Where the signing key lives.
    pub fn key_path(&self) -> Result<PathBuf, NodeError> {
        match &self.identity.key_path {
            Some(path) => Ok(path.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join("arn").join("identity.key"))
                .ok_or_else(|| NodeError::Config("could not determine data directory".into())),
        }
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.network.discovery_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.relays.len(), DEFAULT_RELAYS.len());
        assert_eq!(config.timers.stale_after(), Duration::from_secs(600));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = NodeConfig::from_toml_str(
            r#"
            [network]
            relays = ["wss://one.example"]

            [agent]
            agentId = "price-analysis-agent"
            name = "Price Analysis"
            capabilities = ["technical_analysis"]
            reputation = 0.9
            cost = "$0.01"
            "#,
        )
        .unwrap();
        assert_eq!(config.network.relays, vec!["wss://one.example"]);
        assert_eq!(config.network.transport, TransportKind::Websocket);
        assert_eq!(config.timers, TimerConfig::default());
        let agent = config.agent.unwrap();
        assert_eq!(agent.agent_id, "price-analysis-agent");
        assert_eq!(agent.cost.micros(), 10_000);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = NodeConfig::default();
        config.network.transport = TransportKind::Simulated;
        config.identity.key_path = Some(PathBuf::from("/tmp/arn.key"));
        let text = config.to_toml_string().unwrap();
        assert_eq!(NodeConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_relay_override() {
        let mut config = NodeConfig::default();
        config.apply_relay_override(Some(" wss://a , ,wss://b"));
        assert_eq!(config.network.relays, vec!["wss://a", "wss://b"]);
        config.apply_relay_override(Some(" , "));
        assert_eq!(config.network.relays, vec!["wss://a", "wss://b"]);
        config.apply_relay_override(None);
        assert_eq!(config.network.relays.len(), 2);
    }

    #[test]
    fn test_validation_rejects_bad_timers() {
        let mut config = NodeConfig::default();
        config.timers.announce_interval_secs = config.timers.stale_after_secs;
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));

        let mut config = NodeConfig::default();
        config.timers.ping_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.network.relays.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.timers, TimerConfig::default());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "notification_capacity = 8\n[timers]\nping_interval_secs = 5\n").unwrap();
        let config = NodeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.notification_capacity, 8);
        assert_eq!(config.timers.ping_interval_secs, 5);
    }
}
