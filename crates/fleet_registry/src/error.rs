//! Registry error types.

use thiserror::Error;

/// Errors produced by registry lookups and selection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Region identifier is not on the allow-list.
    #[error("Unknown region: {0}")]
    UnknownRegion(String),
    /// Every server in the region is restarting, over memory or on a stale revision.
    #[error("No available server in region {region}")]
    ServersFull { region: String },
    /// No server with this host is registered in the region.
    #[error("Server {host} not found in region {region}")]
    UnknownServer { region: String, host: String },
    /// Deployment tier name is not recognised.
    #[error("Unknown deployment tier: {0}")]
    UnknownTier(String),
    /// A report named a host that is live in a different region.
    #[error("Server {host} is already registered in region {region}")]
    RegisteredElsewhere { region: String, host: String },
}

impl RegistryError {
    /// Stable, client-facing reason string.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownRegion(_) => "invalid region",
            Self::ServersFull { .. } => "servers full",
            Self::UnknownServer { .. } => "server not found",
            Self::UnknownTier(_) => "invalid environment",
            Self::RegisteredElsewhere { .. } => "server registered in another region",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_match_wire_protocol() {
        assert_eq!(RegistryError::UnknownRegion("xyz".into()).reason(), "invalid region");
        assert_eq!(
            RegistryError::ServersFull { region: "nyc1".into() }.reason(),
            "servers full"
        );
    }
}
