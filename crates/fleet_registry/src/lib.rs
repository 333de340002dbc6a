//! # Fleet Registry
//!
//! In-memory registry of game-hosting servers for one deployment tier.
//!
//! The hierarchy is [`Environment`] → [`Region`] → [`Server`]. Servers register
//! implicitly through their first [`ServerReport`], are updated wholesale by each
//! later report, and leave the registry only when their control connection
//! closes. Player routing is first-fit over registration order, filtered by the
//! [`AvailabilityPolicy`].
//!
//! The registry performs no I/O and never awaits; callers wrap an
//! [`Environment`] in a single lock so that selection never observes a
//! half-applied report.

pub mod environment;
pub mod error;
pub mod policy;
pub mod region;
pub mod server;
pub mod snapshot;
pub mod timer;
pub mod types;

pub use environment::Environment;
pub use error::RegistryError;
pub use policy::{AvailabilityPolicy, DEFAULT_HIGH_MEMORY_THRESHOLD, DEFAULT_PLAYER_CAPACITY};
pub use region::{
    ChatMessage, DisconnectedServer, Region, RemovedServer, ReportOutcome, ServerSummary,
    CHAT_HISTORY_LIMIT,
};
pub use server::{Server, ServerState};
pub use snapshot::{GameInfo, ServerReport, ServerStatus};
pub use timer::DebouncedTimers;
pub use types::{
    current_timestamp_millis, is_valid_region, ConnectionId, DeploymentTier, REGION_ALLOW_LIST,
};
