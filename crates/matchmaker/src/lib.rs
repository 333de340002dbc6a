//! # Matchmaker
//!
//! Routing service for a fleet of game servers. Game servers stream heartbeat
//! reports over one WebSocket channel, players ask for a game over another,
//! and operators query the fleet over HTTP.
//!
//! ## Layout
//!
//! * [`service`] - the [`Matchmaker`] that owns the fleet registry and
//!   implements every channel's behaviour
//! * [`messaging`] - the `{ event, data }` envelope and typed payloads
//! * [`connection`] - WebSocket session handling and outbound queues
//! * [`http`] - the operator query surface
//! * [`server`] - listener setup and the accept loops
//! * [`config`], [`logging`], [`shutdown`] - process plumbing
//!
//! The registry itself lives in the `fleet_registry` crate.

pub mod collaborators;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod logging;
pub mod messaging;
pub mod server;
pub mod service;
pub mod shutdown;

pub use config::MatchmakerConfig;
pub use error::ServiceError;
pub use server::RoutingServer;
pub use service::Matchmaker;
