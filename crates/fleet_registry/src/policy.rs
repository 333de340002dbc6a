//! Availability policy evaluated at selection time.

/// Memory above which a server stops receiving new players.
pub const DEFAULT_HIGH_MEMORY_THRESHOLD: f64 = 800.0;

/// Player count ceiling used by [`Server::is_available`](crate::Server::is_available).
pub const DEFAULT_PLAYER_CAPACITY: u32 = 500;

/// Fleet-wide thresholds and the deployment revision servers must run.
///
/// Nothing here is cached on servers; every selection reads the current policy.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityPolicy {
    pub high_memory_threshold: f64,
    pub player_capacity: u32,
    /// Revision every server should be running. `None` disables revision gating.
    pub target_revision: Option<String>,
    /// Local/offline development mode: revision gating is bypassed.
    pub development_mode: bool,
}

impl AvailabilityPolicy {
    pub fn with_target_revision(mut self, revision: impl Into<String>) -> Self {
        self.target_revision = Some(revision.into());
        self
    }

    pub fn development(mut self) -> Self {
        self.development_mode = true;
        self
    }
}

impl Default for AvailabilityPolicy {
    fn default() -> Self {
        Self {
            high_memory_threshold: DEFAULT_HIGH_MEMORY_THRESHOLD,
            player_capacity: DEFAULT_PLAYER_CAPACITY,
            target_revision: None,
            development_mode: false,
        }
    }
}
