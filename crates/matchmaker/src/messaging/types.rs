//! Wire types for the player and game-server channels.
//!
//! Every frame in either direction is a JSON envelope:
//!
//! ```json
//! { "event": "RequestGame", "data": { "region": "nyc1", "mode": "ffa" } }
//! ```

use fleet_registry::ServerReport;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event names used on the wire.
pub mod events {
    pub const PING: &str = "1";
    pub const REQUEST_GAME: &str = "RequestGame";
    pub const REQUEST_GAME_STATUS: &str = "RequestGameStatus";
    pub const JOIN_CHAT: &str = "JoinChat";
    pub const GLOBAL_CHAT: &str = "GlobalChat";
    pub const CHAT_HISTORY: &str = "ChatHistory";
    pub const SERVER_CHAT: &str = "ServerChat";
    pub const CHAT_STATUS: &str = "ChatStatus";
    pub const SERVER_UPDATED: &str = "ServerUpdated";
    pub const HEARTBEAT: &str = "Heartbeat";
    pub const RESTART: &str = "Restart";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new<T: Serialize>(event: &str, data: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event.to_string(),
            data: serde_json::to_value(data)?,
        })
    }

    /// Serializes `{event, data}` straight to frame text.
    pub fn encode<T: Serialize>(event: &str, data: &T) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Self::new(event, data)?)
    }
}

/// Empty `{}` payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestGame {
    /// Missing resolves to no region and is answered with "invalid region".
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
}

/// Reply to [`RequestGame`]: either the chosen host or an error reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestGameStatus {
    Matched {
        server: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        mode: Option<String>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinChat {
    #[serde(default)]
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalChat {
    #[serde(default)]
    pub region: String,
    pub username: String,
    pub message: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatStatus {
    pub error: String,
}

/// Decoded player-channel frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerMessage {
    Ping,
    RequestGame(RequestGame),
    JoinChat(JoinChat),
    GlobalChat(GlobalChat),
    /// Event name this service does not handle.
    Unknown(String),
}

impl PlayerMessage {
    pub fn event_name(&self) -> &str {
        match self {
            Self::Ping => events::PING,
            Self::RequestGame(_) => events::REQUEST_GAME,
            Self::JoinChat(_) => events::JOIN_CHAT,
            Self::GlobalChat(_) => events::GLOBAL_CHAT,
            Self::Unknown(name) => name,
        }
    }
}

/// Decoded game-server-channel frame.
#[derive(Debug, Clone, PartialEq)]
pub enum GameServerMessage {
    ServerUpdated(ServerReport),
    Heartbeat(ServerReport),
    Unknown(String),
}
