//! State reports sent by game-hosting processes and the views derived from them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Full self-reported state of one game-hosting process.
///
/// Sent on every heartbeat and on every change. Each report replaces the
/// previous one wholesale; nothing is merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerReport {
    pub host: String,
    pub region: String,
    #[serde(default)]
    pub revision: Option<String>,
    /// Resident memory, in the unit the hosting process reports (MB in practice).
    #[serde(default)]
    pub memory: f64,
    #[serde(default)]
    pub player_count: u32,
    /// Hosted games keyed by game identifier.
    #[serde(default)]
    pub games: BTreeMap<String, GameInfo>,
    #[serde(default)]
    pub systemd_index: Option<u32>,
    #[serde(default)]
    pub debug_port: Option<u16>,
}

impl ServerReport {
    /// Minimal report, mostly useful for tests and tooling.
    pub fn new(host: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            region: region.into(),
            revision: None,
            memory: 0.0,
            player_count: 0,
            games: BTreeMap::new(),
            systemd_index: None,
            debug_port: None,
        }
    }
}

/// One game hosted by a server. Everything except the privacy flag is opaque.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    #[serde(default)]
    pub is_private: bool,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl GameInfo {
    pub fn public() -> Self {
        Self::default()
    }

    pub fn private() -> Self {
        Self {
            is_private: true,
            payload: Map::new(),
        }
    }
}

/// Per-server status row for operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub host: String,
    pub memory: f64,
    pub player_count: u32,
    pub revision: Option<String>,
    pub systemd_index: Option<u32>,
    pub game_count: usize,
    pub debug_port: Option<u16>,
}
