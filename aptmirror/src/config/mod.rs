//! Configuration: the validated [`SyncConfig`] consumed by a run, and the
//! INI [`ConfigFile`] the CLI reads defaults from.

mod file;
mod keys;
mod sync;

pub use file::{
    config_file_path, default_log_dir, ConfigError, ConfigFile, LoggingSection, MirrorSection,
    SyncSection,
};
pub use keys::ConfigKey;
pub use sync::{SyncConfig, DEFAULT_CONCURRENCY};

/// Format a byte count for display, e.g. `1.5 GB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
