//! The routing service: mediates between both channels and the fleet registry.
//!
//! All registry access goes through one `RwLock<Environment>`. Locks are taken
//! for the synchronous registry call only and released before any send or
//! identity check, so no registry mutation ever spans an await point.

use crate::collaborators::{
    guarded, CrashReporter, IdentityVerifier, RejectAllVerifier, TracingCrashReporter,
};
use crate::connection::ConnectionManager;
use crate::error::ServiceError;
use crate::messaging::{
    decode_game_server_message, decode_player_message, events, frame_event, ChatStatus, Empty,
    GameServerMessage, GlobalChat, PlayerMessage, RequestGame, RequestGameStatus,
};
use dashmap::DashMap;
use fleet_registry::{
    ChatMessage, ConnectionId, DebouncedTimers, Environment, ReportOutcome, ServerReport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, error, info, warn};

/// `(region, host)` identity of a game server.
pub type ServerKey = (String, String);

const INVALID_CREDENTIALS: &str = "invalid credentials";

pub struct Matchmaker {
    environment: Arc<RwLock<Environment>>,
    connections: Arc<ConnectionManager>,
    restarts: DebouncedTimers<ServerKey>,
    restart_delay: Duration,
    development_mode: bool,
    /// Game-server connection -> the server it registered.
    game_bindings: DashMap<ConnectionId, ServerKey>,
    crash_reporter: Arc<dyn CrashReporter>,
    identity: Arc<dyn IdentityVerifier>,
}

impl Matchmaker {
    pub fn new(environment: Environment, restart_delay: Duration) -> Self {
        let development_mode = environment.is_development();
        Self {
            environment: Arc::new(RwLock::new(environment)),
            connections: Arc::new(ConnectionManager::new()),
            restarts: DebouncedTimers::new(),
            restart_delay,
            development_mode,
            game_bindings: DashMap::new(),
            crash_reporter: Arc::new(TracingCrashReporter),
            identity: Arc::new(RejectAllVerifier),
        }
    }

    pub fn with_crash_reporter(mut self, reporter: Arc<dyn CrashReporter>) -> Self {
        self.crash_reporter = reporter;
        self
    }

    pub fn with_identity_verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.identity = verifier;
        self
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn crash_reporter(&self) -> &dyn CrashReporter {
        self.crash_reporter.as_ref()
    }

    pub fn is_development(&self) -> bool {
        self.development_mode
    }

    /// Shared read access for query endpoints.
    pub async fn environment(&self) -> RwLockReadGuard<'_, Environment> {
        self.environment.read().await
    }

    pub fn restart_pending(&self, region: &str, host: &str) -> bool {
        self.restarts.is_pending(&(region.to_string(), host.to_string()))
    }

    // ------------------------------------------------------------------
    // Game-server channel
    // ------------------------------------------------------------------

    /// Entry point for one game-server frame. Never fails.
    pub async fn handle_game_server_frame(&self, connection: ConnectionId, text: &str) {
        let result = guarded(self.crash_reporter(), "game_server", async {
            match decode_game_server_message(text)? {
                GameServerMessage::ServerUpdated(report) => {
                    self.handle_report(connection, report, false).await?;
                }
                GameServerMessage::Heartbeat(report) => {
                    self.handle_report(connection, report, true).await?;
                }
                GameServerMessage::Unknown(event) => {
                    debug!(connection = %connection, event, "Ignoring unknown game server event");
                }
            }
            Ok::<(), ServiceError>(())
        })
        .await;

        if let Err(e) = result {
            log_handler_error("game_server", connection, &e);
        }
    }

    /// Upserts a state report sent on `connection`.
    ///
    /// A connection is bound to the first `(region, host)` it reports; reports
    /// for any other server on the same connection are rejected.
    pub async fn handle_report(
        &self,
        connection: ConnectionId,
        report: ServerReport,
        heartbeat: bool,
    ) -> Result<ReportOutcome, ServiceError> {
        let key: ServerKey = (report.region.clone(), report.host.clone());
        let bound = self
            .game_bindings
            .get(&connection)
            .map(|entry| entry.value().clone());
        if let Some(bound) = &bound {
            if *bound != key {
                return Err(ServiceError::Validation(format!(
                    "connection already bound to {}/{}",
                    bound.0, bound.1
                )));
            }
        }

        let outcome = self
            .environment
            .write()
            .await
            .apply_report(report, Some(connection))?;

        if bound.is_none() {
            self.game_bindings.insert(connection, key.clone());
        }

        match outcome {
            ReportOutcome::Registered => {
                info!(host = %key.1, region = %key.0, heartbeat, "🖥️ Server added");
            }
            ReportOutcome::Replaced => {
                // The drained process's pending restart must not hit its successor.
                self.restarts.cancel(&key);
                info!(host = %key.1, region = %key.0, heartbeat, "🖥️ Server taken over by a new connection");
            }
            ReportOutcome::Updated => {
                debug!(host = %key.1, region = %key.0, heartbeat, "Server report applied");
            }
        }
        Ok(outcome)
    }

    /// Removes the server a closed game-server connection registered.
    ///
    /// If another connection has since taken over the same host, the entry is
    /// left alone.
    pub async fn handle_game_server_disconnect(&self, connection: ConnectionId) {
        let Some((_, key)) = self.game_bindings.remove(&connection) else {
            return;
        };
        let (region, host) = &key;

        let removed = {
            let mut env = self.environment.write().await;
            let owned = env
                .server(region, host)
                .is_some_and(|server| server.connection() == Some(connection));
            if owned {
                env.remove_server(region, host)
            } else {
                None
            }
        };

        match removed {
            Some(removed) => {
                self.restarts.cancel(&key);
                info!(
                    host = %host,
                    region = %region,
                    archived = removed.archived,
                    released_sessions = removed.released_sessions.len(),
                    "🔌 Server disconnected and removed"
                );
            }
            None => {
                debug!(host = %host, region = %region, "Disconnected connection no longer owns its server");
            }
        }
    }

    // ------------------------------------------------------------------
    // Player channel
    // ------------------------------------------------------------------

    /// Entry point for one player frame. Never fails; errors are answered on
    /// the event's status channel where the protocol has one.
    pub async fn handle_player_frame(&self, connection: ConnectionId, text: &str) {
        let message = match decode_player_message(text) {
            Ok(message) => message,
            Err(e) => {
                log_handler_error("player", connection, &e);
                if let Some(event) = frame_event(text) {
                    self.reply_with_error(connection, &event, &e);
                }
                return;
            }
        };
        let event = message.event_name().to_string();

        let result = guarded(
            self.crash_reporter(),
            &event,
            self.dispatch_player_message(connection, message),
        )
        .await;

        if let Err(e) = result {
            log_handler_error(&event, connection, &e);
            self.reply_with_error(connection, &event, &e);
        }
    }

    async fn dispatch_player_message(
        &self,
        connection: ConnectionId,
        message: PlayerMessage,
    ) -> Result<(), ServiceError> {
        match message {
            PlayerMessage::Ping => {
                self.connections.send_event(connection, events::PING, &Empty {})?;
            }
            PlayerMessage::RequestGame(request) => {
                let status = self.request_game(&request).await;
                self.connections
                    .send_event(connection, events::REQUEST_GAME_STATUS, &status)?;
            }
            PlayerMessage::JoinChat(join) => {
                let history = self.join_chat(connection, &join.region).await?;
                self.connections
                    .send_event(connection, events::CHAT_HISTORY, &history)?;
            }
            PlayerMessage::GlobalChat(chat) => {
                self.post_chat(chat).await?;
            }
            PlayerMessage::Unknown(event) => {
                debug!(connection = %connection, event, "Ignoring unknown player event");
            }
        }
        Ok(())
    }

    fn reply_with_error(&self, connection: ConnectionId, event: &str, error: &ServiceError) {
        let reason = error.reason().to_string();
        let sent = match event {
            events::REQUEST_GAME => self.connections.send_event(
                connection,
                events::REQUEST_GAME_STATUS,
                &RequestGameStatus::Failed { error: reason },
            ),
            events::GLOBAL_CHAT | events::JOIN_CHAT => self.connections.send_event(
                connection,
                events::CHAT_STATUS,
                &ChatStatus { error: reason },
            ),
            _ => Ok(false),
        };
        if let Err(e) = sent {
            error!(connection = %connection, "Failed to encode error reply: {}", e);
        }
    }

    /// First-fit selection in the requested region.
    pub async fn request_game(&self, request: &RequestGame) -> RequestGameStatus {
        let result = self.environment.write().await.request_game(
            &request.region,
            request.mode.as_deref(),
            request.uid.as_deref(),
        );

        match result {
            Ok(server) => {
                debug!(region = %request.region, server = %server, "Player matched");
                RequestGameStatus::Matched {
                    server,
                    mode: request.mode.clone(),
                }
            }
            Err(e) => {
                debug!(region = %request.region, "Player not matched: {}", e);
                RequestGameStatus::Failed {
                    error: e.reason().to_string(),
                }
            }
        }
    }

    /// Subscribes `connection` to a region's chat and returns the current log.
    pub async fn join_chat(
        &self,
        connection: ConnectionId,
        region: &str,
    ) -> Result<Vec<ChatMessage>, ServiceError> {
        let mut env = self.environment.write().await;
        let region = env.get_region(region)?;
        region.add_socket(connection);
        Ok(region.chat_history())
    }

    /// Appends to a region's chat and fans it out to subscribers.
    pub async fn post_chat(&self, chat: GlobalChat) -> Result<(), ServiceError> {
        let uid = self.resolve_identity(&chat).await?;
        let message = ChatMessage {
            username: chat.username,
            message: chat.message,
            uid,
        };

        let targets = self
            .environment
            .write()
            .await
            .get_region(&chat.region)?
            .post_chat(message.clone());

        let delivered = self
            .connections
            .broadcast_event(&targets, events::SERVER_CHAT, &message)?;
        debug!(region = %chat.region, delivered, "Chat message broadcast");
        Ok(())
    }

    async fn resolve_identity(&self, chat: &GlobalChat) -> Result<Option<String>, ServiceError> {
        if self.development_mode {
            return Ok(chat.uid.clone());
        }
        let token = chat
            .id_token
            .as_deref()
            .ok_or_else(|| ServiceError::Validation(INVALID_CREDENTIALS.to_string()))?;
        self.identity
            .verify(token)
            .await
            .map(Some)
            .ok_or_else(|| ServiceError::Validation(INVALID_CREDENTIALS.to_string()))
    }

    pub async fn handle_player_disconnect(&self, connection: ConnectionId) {
        self.environment
            .write()
            .await
            .remove_socket_everywhere(connection);
    }

    // ------------------------------------------------------------------
    // Operator actions
    // ------------------------------------------------------------------

    /// Schedules a restart of one server after the restart delay.
    ///
    /// Triggering again before the delay elapses replaces the pending restart,
    /// so a burst of triggers sends a single instruction timed from the last one.
    pub async fn trigger_restart(&self, region: &str, host: &str) -> Result<(), ServiceError> {
        self.environment
            .write()
            .await
            .server_mut(region, host)?
            .mark_restart_scheduled();

        let environment = Arc::clone(&self.environment);
        let connections = Arc::clone(&self.connections);
        let (region, host) = (region.to_string(), host.to_string());
        self.restarts.schedule(
            (region.clone(), host.clone()),
            self.restart_delay,
            execute_restart(environment, connections, region.clone(), host.clone()),
        );

        info!(
            host = %host,
            region = %region,
            delay_secs = self.restart_delay.as_secs(),
            "🔁 Restart scheduled"
        );
        Ok(())
    }

    pub async fn set_target_revision(&self, revision: Option<String>) {
        info!(revision = ?revision, "🏷️ Target revision updated");
        self.environment.write().await.set_target_revision(revision);
    }
}

async fn execute_restart(
    environment: Arc<RwLock<Environment>>,
    connections: Arc<ConnectionManager>,
    region: String,
    host: String,
) {
    let connection = {
        let mut env = environment.write().await;
        if env.is_development() {
            info!(host = %host, region = %region, "Restart suppressed in development mode");
            return;
        }
        match env.server_mut(&region, &host) {
            Ok(server) => server.begin_restart(),
            Err(_) => None,
        }
    };

    let Some(connection) = connection else {
        debug!(host = %host, region = %region, "Restart target gone, nothing to send");
        return;
    };

    match connections.send_event(connection, events::RESTART, &Empty {}) {
        Ok(true) => info!(host = %host, region = %region, "🔁 Restart sent"),
        Ok(false) => warn!(host = %host, region = %region, "Connection closed before restart was sent"),
        Err(e) => error!(host = %host, region = %region, "Failed to encode restart: {}", e),
    }
}

fn log_handler_error(context: &str, connection: ConnectionId, error: &ServiceError) {
    match error {
        ServiceError::Unexpected(_) => {
            error!(connection = %connection, context, "Handler failed: {}", error)
        }
        ServiceError::Transport(_) => {
            warn!(connection = %connection, context, "Malformed message: {}", error)
        }
        _ => warn!(connection = %connection, context, "Request rejected: {}", error),
    }
}
