//! Graceful shutdown handling
//!
//! Listens for termination signals and fires a oneshot channel when one
//! arrives.
//!
//! * Unix: SIGINT and SIGTERM
//! * Windows: Ctrl+C

use tokio::sync::oneshot;
use tracing::{error, info};

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => Ok("SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

#[cfg(windows)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl+C")
}

/// Set up a shutdown signal handler
///
/// Returns a receiver that resolves once a termination signal is received.
/// If signal handlers cannot be installed the error is logged and the
/// receiver never resolves.
pub async fn setup_shutdown_handler() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => {
                info!("{} received - initiating graceful shutdown", signal);
                let _ = tx.send(());
            }
            Err(e) => {
                error!("Failed to install shutdown signal handlers: {}", e);
                // Keep the sender alive so the receiver doesn't read as a shutdown.
                let _tx = tx;
                std::future::pending::<()>().await;
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_shutdown_handler_creation() {
        let shutdown_rx = setup_shutdown_handler().await;

        // Should time out since no signal was sent
        let result = timeout(Duration::from_millis(10), shutdown_rx).await;
        assert!(result.is_err());
    }
}
