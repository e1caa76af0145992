//! Config command - read and edit config.ini.

use std::path::Path;

use aptmirror::config::{config_file_path, ConfigFile, ConfigKey};
use clap::Subcommand;
use console::style;

use crate::error::{CliError, EXIT_OK};

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one setting
    Get {
        /// Setting name as section.key, e.g. sync.threads
        key: String,
    },

    /// Change one setting and save the file
    Set {
        /// Setting name as section.key, e.g. mirror.url
        key: String,

        /// New value; lists are space separated
        value: String,
    },

    /// Print every setting
    List,

    /// Print the location of the configuration file
    Path,
}

/// Run a config subcommand against `path`, or the default file.
pub fn run(command: ConfigCommands, path: Option<&Path>) -> Result<i32, CliError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);

    match command {
        ConfigCommands::Get { key } => {
            let key = parse_key(&key)?;
            let value = key.get(&ConfigFile::load_from(&path)?);
            println!("{}", display_value(&value));
        }
        ConfigCommands::Set { key, value } => {
            let key = parse_key(&key)?;
            let mut config = ConfigFile::load_from(&path)?;
            key.set(&mut config, &value)?;
            config.save_to(&path)?;
            println!("{} = {}", key.name(), key.get(&config));
        }
        ConfigCommands::List => list(&ConfigFile::load_from(&path)?, &path),
        ConfigCommands::Path => println!("{}", path.display()),
    }
    Ok(EXIT_OK)
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'aptmirror config list' to see available keys.",
            key
        ))
    })
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

fn list(config: &ConfigFile, path: &Path) {
    let origin = if path.exists() { "" } else { " (defaults, file not found)" };
    println!("{}{}", style(path.display()).dim(), origin);

    let mut section = "";
    for key in ConfigKey::all() {
        if key.section() != section {
            section = key.section();
            println!();
            println!("{}", style(format!("[{}]", section)).bold());
        }
        println!("  {} = {}", key.key_name(), display_value(&key.get(config)));
    }
}
