//! Wire protocol for the player and game-server channels.

pub mod router;
pub mod types;

pub use router::{decode_game_server_message, decode_player_message, frame_event};
pub use types::{
    events, ChatStatus, Empty, Envelope, GameServerMessage, GlobalChat, JoinChat, PlayerMessage,
    RequestGame, RequestGameStatus,
};
