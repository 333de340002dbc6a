//! Command-line argument parsing

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the matchmaker.
///
/// Every override takes precedence over the matching configuration file value.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    ///
    /// If the file doesn't exist, a default configuration will be written there.
    #[arg(short, long, default_value = "matchmaker.toml")]
    pub config: PathBuf,

    /// Deployment tier: vm, development, staging or production
    #[arg(short, long)]
    pub environment: Option<String>,

    /// Player WebSocket listen address, e.g. "0.0.0.0:3000"
    #[arg(long)]
    pub player_listen: Option<String>,

    /// Game-server WebSocket listen address
    #[arg(long)]
    pub game_listen: Option<String>,

    /// HTTP query surface listen address
    #[arg(long)]
    pub http_listen: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::from("matchmaker.toml"),
            environment: None,
            player_listen: None,
            game_listen: None,
            http_listen: None,
            debug: false,
            json_logs: false,
        }
    }
}
