//! A single game-hosting process and its availability.

use crate::policy::AvailabilityPolicy;
use crate::snapshot::{GameInfo, ServerReport, ServerStatus};
use crate::types::{current_timestamp_millis, ConnectionId};
use std::collections::HashSet;

/// Lifecycle of a registered server.
///
/// A server enters `Active` on its first report. There is no heartbeat-expiry
/// state: a server leaves the registry only when its control connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Serving reports and eligible for selection.
    Active,
    /// A drain timer is pending. Still eligible for selection.
    RestartScheduled,
    /// Restart instruction sent. Excluded from selection until disconnect.
    Restarting,
}

/// One live game-hosting process, keyed by its host.
#[derive(Debug, Clone)]
pub struct Server {
    host: String,
    region: String,
    report: ServerReport,
    connection: Option<ConnectionId>,
    state: ServerState,
    player_sessions: HashSet<String>,
    registered_at: u64,
}

impl Server {
    /// `Unknown -> Active`: builds the registry entry from a first report.
    pub(crate) fn register(report: ServerReport, connection: Option<ConnectionId>) -> Self {
        Self {
            host: report.host.clone(),
            region: report.region.clone(),
            report,
            connection,
            state: ServerState::Active,
            player_sessions: HashSet::new(),
            registered_at: current_timestamp_millis(),
        }
    }

    /// Replaces the stored snapshot wholesale. Last write wins.
    pub(crate) fn apply_report(&mut self, report: ServerReport, connection: Option<ConnectionId>) {
        self.report = report;
        self.connection = connection;
    }

    /// A new process took over this host on another connection.
    ///
    /// Goes back to `Active` and hands back the sessions held by the previous
    /// process so the region can release them.
    pub(crate) fn replace_process(
        &mut self,
        report: ServerReport,
        connection: Option<ConnectionId>,
    ) -> Vec<String> {
        self.apply_report(report, connection);
        self.state = ServerState::Active;
        self.player_sessions.drain().collect()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn report(&self) -> &ServerReport {
        &self.report
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn registered_at(&self) -> u64 {
        self.registered_at
    }

    pub fn is_restarting(&self) -> bool {
        self.state == ServerState::Restarting
    }

    pub fn player_count(&self) -> u32 {
        self.report.player_count
    }

    pub fn is_high_memory(&self, policy: &AvailabilityPolicy) -> bool {
        self.report.memory > policy.high_memory_threshold
    }

    /// Running something other than the fleet's target revision.
    ///
    /// Always false in development mode or when no target is set.
    pub fn is_old_revision(&self, policy: &AvailabilityPolicy) -> bool {
        if policy.development_mode {
            return false;
        }
        match policy.target_revision.as_deref() {
            Some(target) => self.report.revision.as_deref() != Some(target),
            None => false,
        }
    }

    /// The predicate selection actually consults.
    pub fn is_temporarily_unavailable(&self, policy: &AvailabilityPolicy) -> bool {
        self.is_restarting() || self.is_high_memory(policy) || self.is_old_revision(policy)
    }

    /// Broader availability including the player capacity ceiling.
    ///
    /// Not used by [`Region::available_server`](crate::Region::available_server);
    /// whether the ceiling should gate selection is an open question.
    pub fn is_available(&self, policy: &AvailabilityPolicy) -> bool {
        !self.is_temporarily_unavailable(policy) && self.player_count() < policy.player_capacity
    }

    pub fn has_game(&self, game_id: &str) -> bool {
        self.report.games.contains_key(game_id)
    }

    pub fn game(&self, game_id: &str) -> Option<&GameInfo> {
        self.report.games.get(game_id)
    }

    pub fn game_count(&self) -> usize {
        self.report.games.len()
    }

    pub fn public_games(&self) -> impl Iterator<Item = (&String, &GameInfo)> {
        self.report.games.iter().filter(|(_, game)| !game.is_private)
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            host: self.host.clone(),
            memory: self.report.memory,
            player_count: self.player_count(),
            revision: self.report.revision.clone(),
            systemd_index: self.report.systemd_index,
            game_count: self.game_count(),
            debug_port: self.report.debug_port,
        }
    }

    /// `Active -> RestartScheduled`. A server already restarting stays restarting.
    pub fn mark_restart_scheduled(&mut self) {
        if self.state == ServerState::Active {
            self.state = ServerState::RestartScheduled;
        }
    }

    /// `* -> Restarting` if the control connection is still attached.
    ///
    /// Returns the connection the restart instruction must be sent on, or `None`
    /// when there is nothing to send it to (the state is left unchanged then).
    pub fn begin_restart(&mut self) -> Option<ConnectionId> {
        let connection = self.connection?;
        self.state = ServerState::Restarting;
        Some(connection)
    }

    pub fn player_sessions(&self) -> impl Iterator<Item = &String> {
        self.player_sessions.iter()
    }

    pub(crate) fn add_player_session(&mut self, uid: &str) {
        self.player_sessions.insert(uid.to_string());
    }

    pub(crate) fn remove_player_session(&mut self, uid: &str) {
        self.player_sessions.remove(uid);
    }
}
