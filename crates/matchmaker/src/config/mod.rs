//! Configuration: command-line arguments, the TOML file, and the validated
//! runtime settings built from both.

pub mod args;
pub mod settings;

pub use args::Args;
pub use settings::{Config, FleetSettings, LoggingSettings, ServerSettings};

use anyhow::{anyhow, bail, Context, Result};
use fleet_registry::{AvailabilityPolicy, DeploymentTier, Environment};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

/// Load configuration from file or create default configuration
///
/// If the file doesn't exist, a default configuration file is written in its
/// place and the defaults are returned.
pub async fn load_config(args: &Args) -> Result<Config> {
    if args.config.exists() {
        let config_str = tokio::fs::read_to_string(&args.config).await?;
        match toml::de::from_str::<Config>(&config_str) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("Failed to parse config file {}: {}", args.config.display(), e);
                Err(e.into())
            }
        }
    } else {
        warn!("Configuration file not found: {}, using defaults", args.config.display());

        let default_config = Config::default();
        let config_str = toml::to_string_pretty(&default_config)?;
        tokio::fs::write(&args.config, config_str).await?;
        info!("Created default configuration file: {}", args.config.display());

        Ok(default_config)
    }
}

/// Validated runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchmakerConfig {
    pub player_addr: SocketAddr,
    pub game_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub idle_timeout: Duration,
    pub tier: DeploymentTier,
    pub policy: AvailabilityPolicy,
    pub restart_delay: Duration,
}

impl MatchmakerConfig {
    /// Merges CLI overrides over the file settings and validates the result.
    pub fn resolve(config: &Config, args: &Args) -> Result<Self> {
        let player_addr = parse_addr(
            "player listen",
            args.player_listen.as_deref().unwrap_or(&config.server.player_listen_addr),
        )?;
        let game_addr = parse_addr(
            "game listen",
            args.game_listen.as_deref().unwrap_or(&config.server.game_listen_addr),
        )?;
        let http_addr = parse_addr(
            "http listen",
            args.http_listen.as_deref().unwrap_or(&config.server.http_listen_addr),
        )?;

        let tier_name = args.environment.as_deref().unwrap_or(&config.fleet.environment);
        let tier: DeploymentTier = tier_name
            .parse()
            .map_err(|e| anyhow!("Invalid environment '{}': {}", tier_name, e))?;

        let fleet = &config.fleet;
        if fleet.high_memory_threshold.is_nan() || fleet.high_memory_threshold <= 0.0 {
            bail!("high_memory_threshold must be positive");
        }
        if fleet.restart_delay_secs == 0 {
            bail!("restart_delay_secs must be positive");
        }
        if config.server.idle_timeout_secs == 0 {
            bail!("idle_timeout_secs must be positive");
        }

        let policy = AvailabilityPolicy {
            high_memory_threshold: fleet.high_memory_threshold,
            player_capacity: fleet.player_capacity,
            target_revision: fleet.target_revision.clone(),
            development_mode: tier.is_development() || fleet.offline,
        };

        Ok(Self {
            player_addr,
            game_addr,
            http_addr,
            idle_timeout: Duration::from_secs(config.server.idle_timeout_secs),
            tier,
            policy,
            restart_delay: Duration::from_secs(fleet.restart_delay_secs),
        })
    }

    /// Loopback listeners on ephemeral ports in development mode.
    pub fn local() -> Self {
        let loopback = SocketAddr::from(([127, 0, 0, 1], 0));
        Self {
            player_addr: loopback,
            game_addr: loopback,
            http_addr: loopback,
            idle_timeout: Duration::from_secs(120),
            tier: DeploymentTier::Development,
            policy: AvailabilityPolicy::default().development(),
            restart_delay: Duration::from_secs(30),
        }
    }

    pub fn build_environment(&self) -> Environment {
        Environment::new(self.tier, self.policy.clone())
    }
}

fn parse_addr(what: &str, value: &str) -> Result<SocketAddr> {
    value
        .parse()
        .with_context(|| format!("Failed to parse {} address '{}'", what, value))
}
