//! Decoding of inbound frames into typed messages.
//!
//! Frames are parsed in two steps: first the `{event, data}` envelope, then the
//! payload for the named event. Event names this service does not handle decode
//! to an `Unknown` variant instead of failing, so newer clients can send extra
//! events without tripping the error path.

use crate::error::ServiceError;
use crate::messaging::types::{events, Envelope, GameServerMessage, PlayerMessage};
use serde::de::DeserializeOwned;
use serde_json::Value;

fn decode_envelope(text: &str) -> Result<Envelope, ServiceError> {
    serde_json::from_str(text)
        .map_err(|e| ServiceError::Transport(format!("Invalid JSON envelope: {e}")))
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, ServiceError> {
    serde_json::from_value(data)
        .map_err(|e| ServiceError::Transport(format!("Invalid {event} payload: {e}")))
}

/// Event name of a frame whose payload failed to decode, if the envelope parses.
pub fn frame_event(text: &str) -> Option<String> {
    decode_envelope(text).ok().map(|envelope| envelope.event)
}

pub fn decode_player_message(text: &str) -> Result<PlayerMessage, ServiceError> {
    let Envelope { event, data } = decode_envelope(text)?;
    let message = match event.as_str() {
        events::PING => PlayerMessage::Ping,
        events::REQUEST_GAME => PlayerMessage::RequestGame(payload(&event, data)?),
        events::JOIN_CHAT => PlayerMessage::JoinChat(payload(&event, data)?),
        events::GLOBAL_CHAT => PlayerMessage::GlobalChat(payload(&event, data)?),
        _ => PlayerMessage::Unknown(event),
    };
    Ok(message)
}

pub fn decode_game_server_message(text: &str) -> Result<GameServerMessage, ServiceError> {
    let Envelope { event, data } = decode_envelope(text)?;
    let message = match event.as_str() {
        events::SERVER_UPDATED => GameServerMessage::ServerUpdated(payload(&event, data)?),
        events::HEARTBEAT => GameServerMessage::Heartbeat(payload(&event, data)?),
        _ => GameServerMessage::Unknown(event),
    };
    Ok(message)
}
