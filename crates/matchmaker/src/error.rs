//! Error types for the routing service.
//!
//! Every failure a handler can produce falls into one of five categories.
//! None of them is fatal to the process: the handler boundary logs the error,
//! reports unexpected ones, and answers the caller where the protocol allows.

use fleet_registry::RegistryError;
use thiserror::Error;

/// Client-facing reason sent for unexpected failures.
pub const INTERNAL_ERROR_REASON: &str = "internal error";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Malformed or missing request fields, unknown region, bad credentials.
    #[error("Validation error: {0}")]
    Validation(String),
    /// Unknown server or other lookup miss.
    #[error("Not found: {0}")]
    NotFound(String),
    /// No eligible server; the client may retry.
    #[error("Capacity error: {0}")]
    Capacity(String),
    /// Undecodable payload or failed socket I/O.
    #[error("Transport error: {0}")]
    Transport(String),
    /// Anything caught at the handler boundary, panics included.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ServiceError {
    /// Reason string safe to send to a client.
    pub fn reason(&self) -> &str {
        match self {
            Self::Validation(reason) | Self::NotFound(reason) | Self::Capacity(reason) => reason,
            Self::Transport(_) => "malformed payload",
            Self::Unexpected(_) => INTERNAL_ERROR_REASON,
        }
    }

    pub fn is_unexpected(&self) -> bool {
        matches!(self, Self::Unexpected(_))
    }
}

impl From<RegistryError> for ServiceError {
    fn from(error: RegistryError) -> Self {
        let reason = error.reason().to_string();
        match error {
            RegistryError::UnknownRegion(_)
            | RegistryError::UnknownTier(_)
            | RegistryError::RegisteredElsewhere { .. } => Self::Validation(reason),
            RegistryError::ServersFull { .. } => Self::Capacity(reason),
            RegistryError::UnknownServer { .. } => Self::NotFound(reason),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(error: serde_json::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(error: std::io::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_map_to_taxonomy() {
        let invalid: ServiceError = RegistryError::UnknownRegion("xyz".into()).into();
        assert_eq!(invalid, ServiceError::Validation("invalid region".into()));

        let full: ServiceError = RegistryError::ServersFull { region: "nyc1".into() }.into();
        assert_eq!(full.reason(), "servers full");

        let missing: ServiceError = RegistryError::UnknownServer {
            region: "nyc1".into(),
            host: "h".into(),
        }
        .into();
        assert!(matches!(missing, ServiceError::NotFound(_)));
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = ServiceError::Unexpected("index out of bounds".into());
        assert_eq!(err.reason(), INTERNAL_ERROR_REASON);
        assert!(err.is_unexpected());

        let err: ServiceError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.reason(), "malformed payload");
    }
}
