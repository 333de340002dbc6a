//! Logging system setup
//!
//! Structured logging through `tracing`. The filter honours `RUST_LOG` first,
//! then `--debug`, then the configured level.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Args, LoggingSettings};

/// Level used when `RUST_LOG` is not set.
pub fn effective_level<'a>(args: &Args, settings: &'a LoggingSettings) -> &'a str {
    if args.debug {
        "debug"
    } else {
        &settings.level
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn setup_logging(args: &Args, settings: &LoggingSettings) -> Result<()> {
    let level = effective_level(args, settings);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if args.json_logs || settings.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flag_overrides_configured_level() {
        let settings = LoggingSettings {
            level: "warn".to_string(),
            json_format: false,
        };
        let mut args = Args::default();
        assert_eq!(effective_level(&args, &settings), "warn");

        args.debug = true;
        assert_eq!(effective_level(&args, &settings), "debug");
    }

    #[test]
    fn test_logging_setup_only_once() {
        let args = Args::default();
        let settings = LoggingSettings::default();

        // The global subscriber can only be installed once per process.
        let _ = setup_logging(&args, &settings);
        assert!(setup_logging(&args, &settings).is_err());
    }
}
