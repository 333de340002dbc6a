//! Configuration file structures
//!
//! Every section and field is optional in the TOML file; missing values fall
//! back to the defaults below.

use fleet_registry::{DEFAULT_HIGH_MEMORY_THRESHOLD, DEFAULT_PLAYER_CAPACITY};
use serde::{Deserialize, Serialize};

/// Root of `matchmaker.toml`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerSettings,
    pub fleet: FleetSettings,
    pub logging: LoggingSettings,
}

/// Listener addresses and connection limits.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    /// Player WebSocket endpoint, "IP:PORT"
    pub player_listen_addr: String,
    /// Game-server control channel endpoint
    pub game_listen_addr: String,
    /// HTTP query surface endpoint
    pub http_listen_addr: String,
    /// Seconds of inbound silence after which a WebSocket is closed.
    ///
    /// Until then a dead peer the transport has not noticed stays selectable.
    pub idle_timeout_secs: u64,
}

/// Fleet policy.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FleetSettings {
    /// Deployment tier: "vm", "development", "staging" or "production"
    pub environment: String,
    /// Revision servers must report to receive players. Unset disables the check.
    pub target_revision: Option<String>,
    pub high_memory_threshold: f64,
    pub player_capacity: u32,
    pub restart_delay_secs: u64,
    /// Force local development mode regardless of tier.
    pub offline: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// "trace", "debug", "info", "warn" or "error"
    pub level: String,
    pub json_format: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            player_listen_addr: "127.0.0.1:3000".to_string(),
            game_listen_addr: "127.0.0.1:2095".to_string(),
            http_listen_addr: "127.0.0.1:3001".to_string(),
            idle_timeout_secs: 120,
        }
    }
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            target_revision: None,
            high_memory_threshold: DEFAULT_HIGH_MEMORY_THRESHOLD,
            player_capacity: DEFAULT_PLAYER_CAPACITY,
            restart_delay_secs: 30,
            offline: false,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.player_listen_addr, "127.0.0.1:3000");
        assert_eq!(config.server.game_listen_addr, "127.0.0.1:2095");
        assert_eq!(config.server.idle_timeout_secs, 120);
        assert_eq!(config.fleet.environment, "development");
        assert_eq!(config.fleet.high_memory_threshold, 800.0);
        assert_eq!(config.fleet.player_capacity, 500);
        assert_eq!(config.fleet.restart_delay_secs, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.fleet.target_revision = Some("abc123".to_string());
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[fleet]
environment = "production"
target_revision = "r42"

[logging]
json_format = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.fleet.environment, "production");
        assert_eq!(config.fleet.target_revision.as_deref(), Some("r42"));
        assert_eq!(config.fleet.restart_delay_secs, 30);
        assert_eq!(config.server.http_listen_addr, "127.0.0.1:3001");
        assert!(config.logging.json_format);
        assert_eq!(config.logging.level, "info");
    }
}
