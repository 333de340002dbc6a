//! Matchmaker - Main Entry Point
//!
//! Loads configuration, installs logging, binds the player, game server and
//! HTTP listeners, and runs until a termination signal arrives.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use tracing::{error, info};

use matchmaker::{
    config::{self, Args},
    logging, shutdown, MatchmakerConfig, RoutingServer,
};

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = Instant::now();

    let args = Args::parse();

    let config = config::load_config(&args)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    if let Err(e) = logging::setup_logging(&args, &config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        return Err(anyhow::anyhow!("Failed to initialize logging: {}", e));
    }

    info!("Starting Matchmaker");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", args.config.display());

    let matchmaker_config = MatchmakerConfig::resolve(&config, &args)?;
    log_configuration(&matchmaker_config);

    let server = RoutingServer::bind(matchmaker_config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind listeners: {}", e))?;
    let shutdown_handle = server.shutdown_handle();

    let shutdown_receiver = shutdown::setup_shutdown_handler().await;

    info!("Startup complete in {:.2?}", startup_start.elapsed());

    let server_task = tokio::spawn(server.run());
    tokio::pin!(server_task);

    tokio::select! {
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => info!("Server stopped normally"),
                Ok(Err(e)) => {
                    error!("Server error: {}", e);
                    return Err(e.into());
                }
                Err(e) => {
                    error!("Server task failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        _ = shutdown_receiver => {
            let shutdown_start = Instant::now();
            let _ = shutdown_handle.send(());
            match server_task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Error during shutdown: {}", e),
                Err(e) => error!("Server task failed during shutdown: {}", e),
            }
            info!("Server shutdown completed in {:.2?}", shutdown_start.elapsed());
        }
    }

    Ok(())
}

fn log_configuration(config: &MatchmakerConfig) {
    info!("Environment: {}", config.tier.as_str());
    info!("Player listener: {}", config.player_addr);
    info!("Game server listener: {}", config.game_addr);
    info!("HTTP listener: {}", config.http_addr);
    info!("Idle timeout: {:?}", config.idle_timeout);
    info!("Restart delay: {:?}", config.restart_delay);
    info!(
        "High memory threshold: {} MB, player capacity: {}",
        config.policy.high_memory_threshold, config.policy.player_capacity
    );
    match &config.policy.target_revision {
        Some(revision) => info!("Target revision: {}", revision),
        None => info!("Target revision: unset"),
    }
    if config.policy.development_mode {
        info!("🛠️ Development mode: restarts suppressed, player uids trusted");
    }
}
