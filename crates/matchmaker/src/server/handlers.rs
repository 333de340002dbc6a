//! Channel handlers binding each WebSocket listener to the routing service.

use crate::connection::ChannelHandler;
use crate::service::Matchmaker;
use async_trait::async_trait;
use fleet_registry::ConnectionId;
use std::sync::Arc;

/// Player-facing channel: pings, game requests and chat.
pub struct PlayerChannel {
    matchmaker: Arc<Matchmaker>,
}

impl PlayerChannel {
    pub fn new(matchmaker: Arc<Matchmaker>) -> Self {
        Self { matchmaker }
    }
}

#[async_trait]
impl ChannelHandler for PlayerChannel {
    fn name(&self) -> &'static str {
        "player"
    }

    async fn on_message(&self, connection: ConnectionId, text: &str) {
        self.matchmaker.handle_player_frame(connection, text).await;
    }

    async fn on_close(&self, connection: ConnectionId) {
        self.matchmaker.handle_player_disconnect(connection).await;
    }
}

/// Control channel for game-hosting processes: state reports in, restarts out.
pub struct GameServerChannel {
    matchmaker: Arc<Matchmaker>,
}

impl GameServerChannel {
    pub fn new(matchmaker: Arc<Matchmaker>) -> Self {
        Self { matchmaker }
    }
}

#[async_trait]
impl ChannelHandler for GameServerChannel {
    fn name(&self) -> &'static str {
        "game_server"
    }

    async fn on_message(&self, connection: ConnectionId, text: &str) {
        self.matchmaker.handle_game_server_frame(connection, text).await;
    }

    async fn on_close(&self, connection: ConnectionId) {
        self.matchmaker.handle_game_server_disconnect(connection).await;
    }
}
