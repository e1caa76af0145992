//! CLI error type and exit codes.

use aptmirror::config::ConfigError;
use aptmirror::MirrorError;
use thiserror::Error;

/// Exit code of a clean run.
pub const EXIT_OK: i32 = 0;

/// Exit code when the command could not run at all.
pub const EXIT_ERROR: i32 = 1;

/// Exit code of a run that finished with failed or dropped files.
pub const EXIT_INCOMPLETE: i32 = 2;

/// Errors surfaced to the user.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error("failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}
