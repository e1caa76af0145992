//! Tracing subscriber setup.
//!
//! Logs go to stderr and, when a directory is configured, to a daily rolling
//! file. `RUST_LOG` overrides the default filter.

use std::path::PathBuf;

use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
pub use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{MirrorError, MirrorResult};

/// Base name of the rolling log file.
pub const LOG_FILE_NAME: &str = "aptmirror.log";

/// How to set up logging.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for log files; `None` logs to stderr only.
    pub directory: Option<PathBuf>,
    /// Debug output for this crate.
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(directory: Option<PathBuf>, verbose: bool) -> Self {
        Self { directory, verbose }
    }

    /// Filter used when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> &'static str {
        if self.verbose {
            "info,aptmirror=debug"
        } else {
            "info"
        }
    }
}

/// Install the global subscriber.
///
/// # Returns
///
/// The guard of the file writer, if any. Dropping it flushes and stops file
/// logging, so keep it alive for the life of the process.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a subscriber
/// is already installed.
pub fn init_logging(config: &LoggingConfig) -> MirrorResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));
    let timer = OffsetTime::local_rfc_3339()
        .unwrap_or_else(|_| OffsetTime::new(UtcOffset::UTC, Rfc3339));

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory).map_err(|e| MirrorError::CreateDirFailed {
                path: directory.clone(),
                source: e,
            })?;
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(timer.clone());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_timer(timer),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| MirrorError::InvalidConfig(format!("cannot initialise logging: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(LoggingConfig::default().default_directive(), "info");
        assert_eq!(
            LoggingConfig::new(None, true).default_directive(),
            "info,aptmirror=debug"
        );
    }
}
