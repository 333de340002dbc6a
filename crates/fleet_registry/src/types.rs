//! Identifiers and small value types shared across the registry.

use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Region identifiers the fleet is allowed to deploy to.
///
/// Anything outside this list is rejected; regions are never created on demand
/// for an unknown identifier.
pub const REGION_ALLOW_LIST: &[&str] = &[
    "ams2", "ams3", "blr1", "fra1", "lon1", "nyc1", "nyc2", "nyc3", "sfo1", "sfo2", "sgp1", "tor1",
    "localhost", "test",
];

/// Returns true if `region` is on the allow-list.
pub fn is_valid_region(region: &str) -> bool {
    REGION_ALLOW_LIST.contains(&region)
}

/// Unique identifier for a live control or player connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deployment tier an [`Environment`](crate::Environment) represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentTier {
    Vm,
    Development,
    Staging,
    Production,
}

impl DeploymentTier {
    pub const ALL: [DeploymentTier; 4] = [
        DeploymentTier::Vm,
        DeploymentTier::Development,
        DeploymentTier::Staging,
        DeploymentTier::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vm => "vm",
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Local development tier: revision gating and restarts do not apply.
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl fmt::Display for DeploymentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentTier {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| RegistryError::UnknownTier(s.to_string()))
    }
}

/// Milliseconds since the Unix epoch.
pub fn current_timestamp_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
