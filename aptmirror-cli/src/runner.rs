//! Shared setup for commands: configuration file, logging, async runtime and
//! interrupt handling.

use std::future::Future;
use std::path::Path;

use aptmirror::config::{default_log_dir, ConfigFile};
use aptmirror::logging::{init_logging, LoggingConfig, WorkerGuard};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::CliError;

/// Holds what a command needs for its whole lifetime.
pub struct CliRunner {
    config: ConfigFile,
    runtime: Runtime,
    // Flushes the log file on drop.
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    /// Load the configuration file and start logging.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Alternative configuration file
    /// * `verbose` - Debug logging, in addition to `[logging] verbose`
    pub fn new(config_path: Option<&Path>, verbose: bool) -> Result<Self, CliError> {
        let config = match config_path {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };

        let directory = config
            .logging
            .directory
            .clone()
            .unwrap_or_else(default_log_dir);
        let logging = LoggingConfig::new(Some(directory), verbose || config.logging.verbose);
        let log_guard = init_logging(&logging)?;

        let runtime = Runtime::new().map_err(CliError::Runtime)?;

        Ok(Self {
            config,
            runtime,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            command,
            version = env!("CARGO_PKG_VERSION"),
            "aptmirror starting"
        );
    }

    /// Drive a future to completion on the runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Token that is cancelled on the first Ctrl+C.
    ///
    /// A second Ctrl+C while shutting down exits immediately.
    pub fn cancel_on_interrupt(&self) -> Result<CancellationToken, CliError> {
        let token = CancellationToken::new();
        let handler_token = token.clone();
        ctrlc::set_handler(move || {
            if handler_token.is_cancelled() {
                std::process::exit(130);
            }
            warn!("Interrupted, finishing files in verification");
            eprintln!("\nInterrupted, stopping downloads...");
            handler_token.cancel();
        })?;
        Ok(token)
    }
}
