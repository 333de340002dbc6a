//! Process-level orchestration of the three listeners.

use crate::config::MatchmakerConfig;
use crate::connection::{ChannelHandler, ConnectionManager};
use crate::error::ServiceError;
use crate::http;
use crate::server::handlers::{GameServerChannel, PlayerChannel};
use crate::service::Matchmaker;
use socket2::{Domain, Protocol, Socket, Type};
use std::future::IntoFuture;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// The routing service bound to its listeners.
///
/// [`bind`](Self::bind) opens all three sockets up front so callers can bind
/// port 0 and read back the chosen addresses before [`run`](Self::run).
pub struct RoutingServer {
    matchmaker: Arc<Matchmaker>,
    player_listener: TcpListener,
    game_listener: TcpListener,
    http_listener: TcpListener,
    idle_timeout: Duration,
    shutdown_sender: broadcast::Sender<()>,
}

impl RoutingServer {
    /// Binds with the default collaborators.
    pub async fn bind(config: MatchmakerConfig) -> Result<Self, ServiceError> {
        let matchmaker = Matchmaker::new(config.build_environment(), config.restart_delay);
        Self::bind_with(&config, Arc::new(matchmaker)).await
    }

    /// Binds around an already-built service, e.g. one with custom collaborators.
    pub async fn bind_with(
        config: &MatchmakerConfig,
        matchmaker: Arc<Matchmaker>,
    ) -> Result<Self, ServiceError> {
        let player_listener = bind_listener(config.player_addr)?;
        let game_listener = bind_listener(config.game_addr)?;
        let http_listener = bind_listener(config.http_addr)?;
        let (shutdown_sender, _) = broadcast::channel(1);

        info!(
            "✅ Listeners bound: player {}, game server {}, http {}",
            player_listener.local_addr()?,
            game_listener.local_addr()?,
            http_listener.local_addr()?
        );

        Ok(Self {
            matchmaker,
            player_listener,
            game_listener,
            http_listener,
            idle_timeout: config.idle_timeout,
            shutdown_sender,
        })
    }

    pub fn player_addr(&self) -> std::io::Result<SocketAddr> {
        self.player_listener.local_addr()
    }

    pub fn game_addr(&self) -> std::io::Result<SocketAddr> {
        self.game_listener.local_addr()
    }

    pub fn http_addr(&self) -> std::io::Result<SocketAddr> {
        self.http_listener.local_addr()
    }

    pub fn matchmaker(&self) -> Arc<Matchmaker> {
        Arc::clone(&self.matchmaker)
    }

    /// Sender that stops [`run`](Self::run) when a value is sent.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_sender.clone()
    }

    /// Serves all listeners until the shutdown handle fires.
    pub async fn run(self) -> Result<(), ServiceError> {
        let connections = Arc::clone(self.matchmaker.connections());
        let player: Arc<dyn ChannelHandler> =
            Arc::new(PlayerChannel::new(Arc::clone(&self.matchmaker)));
        let game: Arc<dyn ChannelHandler> =
            Arc::new(GameServerChannel::new(Arc::clone(&self.matchmaker)));

        let player_loop = accept_loop(
            self.player_listener,
            Arc::clone(&connections),
            player,
            self.idle_timeout,
        );
        let game_loop = accept_loop(
            self.game_listener,
            Arc::clone(&connections),
            game,
            self.idle_timeout,
        );

        let mut http_shutdown = self.shutdown_sender.subscribe();
        let app = http::router(Arc::clone(&self.matchmaker));
        let http_server = axum::serve(self.http_listener, app)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.recv().await;
            })
            .into_future();

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        info!("🚀 Matchmaker running");

        tokio::select! {
            _ = player_loop => {}
            _ = game_loop => {}
            result = http_server => {
                if let Err(e) = result {
                    error!("HTTP server failed: {}", e);
                    return Err(e.into());
                }
            }
            _ = shutdown_receiver.recv() => {
                info!("Shutdown signal received");
            }
        }

        info!(
            open_connections = connections.connection_count(),
            "✅ Matchmaker stopped"
        );
        Ok(())
    }
}

fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServiceError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| ServiceError::Transport(format!("Socket creation failed: {e}")))?;
    socket.set_reuse_address(true).ok();

    socket
        .bind(&addr.into())
        .map_err(|e| ServiceError::Transport(format!("Bind failed on {addr}: {e}")))?;
    socket
        .listen(1024)
        .map_err(|e| ServiceError::Transport(format!("Listen failed on {addr}: {e}")))?;

    let std_listener: StdTcpListener = socket.into();
    std_listener
        .set_nonblocking(true)
        .map_err(|e| ServiceError::Transport(format!("Set nonblocking failed: {e}")))?;

    TcpListener::from_std(std_listener)
        .map_err(|e| ServiceError::Transport(format!("Tokio listener creation failed: {e}")))
}

async fn accept_loop(
    listener: TcpListener,
    connections: Arc<ConnectionManager>,
    handler: Arc<dyn ChannelHandler>,
    idle_timeout: Duration,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(Arc::clone(&connections).serve(
                    stream,
                    addr,
                    Arc::clone(&handler),
                    idle_timeout,
                ));
            }
            Err(e) => {
                warn!(channel = handler.name(), "Failed to accept connection: {}", e);
            }
        }
    }
}
