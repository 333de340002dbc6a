//! One geographic region: its servers, player sessions, chat log and the
//! archive of servers that vanished while hosting players.

use crate::error::RegistryError;
use crate::policy::AvailabilityPolicy;
use crate::server::Server;
use crate::snapshot::{ServerReport, ServerStatus};
use crate::types::{current_timestamp_millis, ConnectionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::debug;

/// Number of chat messages a region keeps.
pub const CHAT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub username: String,
    pub message: String,
    pub uid: Option<String>,
}

/// Archived snapshot of a server that disconnected while hosting players.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectedServer {
    #[serde(rename = "server")]
    pub snapshot: ServerStatus,
    pub player_sessions: Vec<String>,
    pub disconnected_at: u64,
}

/// What a state report did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// First report for this host; a new server entry was created.
    Registered,
    /// Existing entry's snapshot was replaced.
    Updated,
    /// A report arrived on a different connection than the stored one: a new
    /// process took over the host. Its state was reset to `Active` and the
    /// previous process's sessions were released.
    Replaced,
}

/// Result of removing a server whose control connection closed.
#[derive(Debug, Clone)]
pub struct RemovedServer {
    pub server: Server,
    pub archived: bool,
    pub released_sessions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSummary {
    pub player_count: u32,
}

/// Servers deployed to one region.
///
/// Servers are kept in registration order; selection is first-fit over that
/// order, so the container must never reorder entries.
#[derive(Debug)]
pub struct Region {
    id: String,
    servers: Vec<Server>,
    index: HashMap<String, usize>,
    /// uid -> host holding the session
    player_sessions: HashMap<String, String>,
    // Grows without bound; nothing expires entries.
    disconnected_servers: BTreeMap<String, DisconnectedServer>,
    sockets: HashSet<ConnectionId>,
    chat_history: VecDeque<ChatMessage>,
}

impl Region {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            servers: Vec::new(),
            index: HashMap::new(),
            player_sessions: HashMap::new(),
            disconnected_servers: BTreeMap::new(),
            sockets: HashSet::new(),
            chat_history: VecDeque::with_capacity(CHAT_HISTORY_LIMIT),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    // ------------------------------------------------------------------
    // Servers
    // ------------------------------------------------------------------

    pub fn server(&self, host: &str) -> Option<&Server> {
        self.index.get(host).map(|&i| &self.servers[i])
    }

    pub fn server_mut(&mut self, host: &str) -> Option<&mut Server> {
        match self.index.get(host) {
            Some(&i) => Some(&mut self.servers[i]),
            None => None,
        }
    }

    /// Servers in registration order.
    pub fn servers(&self) -> impl Iterator<Item = &Server> {
        self.servers.iter()
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Upserts a state report: registers an unknown host, otherwise replaces
    /// the existing snapshot.
    pub fn apply_report(
        &mut self,
        report: ServerReport,
        connection: Option<ConnectionId>,
    ) -> ReportOutcome {
        let Some(&i) = self.index.get(&report.host) else {
            self.register_server(report, connection);
            return ReportOutcome::Registered;
        };

        let server = &mut self.servers[i];
        if server.connection() == connection {
            server.apply_report(report, connection);
            return ReportOutcome::Updated;
        }

        let released = server.replace_process(report, connection);
        for uid in &released {
            self.player_sessions.remove(uid);
        }
        ReportOutcome::Replaced
    }

    fn register_server(&mut self, report: ServerReport, connection: Option<ConnectionId>) {
        let server = Server::register(report, connection);
        self.index.insert(server.host().to_string(), self.servers.len());
        self.servers.push(server);
    }

    /// Drops a server from the live registry.
    ///
    /// A server still reporting players is archived first, and every player
    /// session it held is released from the region.
    pub fn remove_server(&mut self, host: &str) -> Option<RemovedServer> {
        let position = self.index.remove(host)?;
        let server = self.servers.remove(position);
        for (i, s) in self.servers.iter().enumerate().skip(position) {
            self.index.insert(s.host().to_string(), i);
        }

        let released_sessions: Vec<String> = server.player_sessions().cloned().collect();
        for uid in &released_sessions {
            self.player_sessions.remove(uid);
        }

        let archived = server.player_count() > 0;
        if archived {
            self.disconnected_servers.insert(
                server.host().to_string(),
                DisconnectedServer {
                    snapshot: server.status(),
                    player_sessions: released_sessions.clone(),
                    disconnected_at: current_timestamp_millis(),
                },
            );
        }

        Some(RemovedServer {
            server,
            archived,
            released_sessions,
        })
    }

    /// First server, in registration order, that is not temporarily unavailable.
    ///
    /// `mode` is accepted but does not filter candidates, and the player
    /// capacity ceiling is not consulted. Both are open questions.
    pub fn available_server(
        &self,
        _mode: Option<&str>,
        policy: &AvailabilityPolicy,
    ) -> Result<&Server, RegistryError> {
        self.servers
            .iter()
            .find(|server| !server.is_temporarily_unavailable(policy))
            .ok_or_else(|| RegistryError::ServersFull {
                region: self.id.clone(),
            })
    }

    /// Routes a player and returns the chosen host.
    ///
    /// With a uid that already holds a session on a server that is still
    /// eligible, that server is returned again. Otherwise first-fit selection
    /// runs and the session is recorded against the chosen server.
    pub fn route_player(
        &mut self,
        uid: Option<&str>,
        mode: Option<&str>,
        policy: &AvailabilityPolicy,
    ) -> Result<String, RegistryError> {
        let Some(uid) = uid else {
            return self
                .available_server(mode, policy)
                .map(|server| server.host().to_string());
        };

        if let Some(host) = self.player_sessions.get(uid).cloned() {
            let eligible = self
                .server(&host)
                .is_some_and(|server| !server.is_temporarily_unavailable(policy));
            if eligible {
                debug!(uid, host = %host, region = %self.id, "Re-matching player to existing session");
                return Ok(host);
            }
            self.remove_player_session(uid);
        }

        let host = self.available_server(mode, policy)?.host().to_string();
        self.add_player_session(uid, &host);
        Ok(host)
    }

    pub fn has_existing_player_session(&self, uid: &str) -> bool {
        self.player_sessions.contains_key(uid)
    }

    /// Host holding the player's session, if any.
    pub fn player_session(&self, uid: &str) -> Option<&str> {
        self.player_sessions.get(uid).map(String::as_str)
    }

    pub fn player_session_count(&self) -> usize {
        self.player_sessions.len()
    }

    /// Records a session for `uid` on `host`. Returns false if the host is unknown.
    pub fn add_player_session(&mut self, uid: &str, host: &str) -> bool {
        let Some(server) = self.server_mut(host) else {
            return false;
        };
        server.add_player_session(uid);
        if let Some(previous) = self.player_sessions.insert(uid.to_string(), host.to_string()) {
            if previous != host {
                if let Some(old) = self.server_mut(&previous) {
                    old.remove_player_session(uid);
                }
            }
        }
        true
    }

    pub fn remove_player_session(&mut self, uid: &str) {
        if let Some(host) = self.player_sessions.remove(uid) {
            if let Some(server) = self.server_mut(&host) {
                server.remove_player_session(uid);
            }
        }
    }

    /// Sum of reported player counts. Saturates instead of overflowing.
    pub fn player_count(&self) -> u32 {
        self.servers
            .iter()
            .map(Server::player_count)
            .fold(0, u32::saturating_add)
    }

    /// Host of the earliest-registered server, if any.
    pub fn first_server_host(&self) -> Option<&str> {
        self.servers.first().map(Server::host)
    }

    pub fn servers_summary(&self) -> BTreeMap<String, ServerSummary> {
        self.servers
            .iter()
            .map(|server| {
                (
                    server.host().to_string(),
                    ServerSummary {
                        player_count: server.player_count(),
                    },
                )
            })
            .collect()
    }

    pub fn disconnected_servers(&self) -> &BTreeMap<String, DisconnectedServer> {
        &self.disconnected_servers
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    pub fn add_socket(&mut self, connection: ConnectionId) {
        self.sockets.insert(connection);
    }

    pub fn remove_socket(&mut self, connection: ConnectionId) -> bool {
        self.sockets.remove(&connection)
    }

    pub fn socket_ids(&self) -> Vec<ConnectionId> {
        self.sockets.iter().copied().collect()
    }

    /// Appends to the chat log and returns the connections to fan it out to.
    pub fn post_chat(&mut self, message: ChatMessage) -> Vec<ConnectionId> {
        self.chat_history.push_back(message);
        while self.chat_history.len() > CHAT_HISTORY_LIMIT {
            self.chat_history.pop_front();
        }
        self.socket_ids()
    }

    pub fn chat_history(&self) -> Vec<ChatMessage> {
        self.chat_history.iter().cloned().collect()
    }
}
