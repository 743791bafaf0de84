use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use directories::BaseDirs;
use shared::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    const fn file_name(self) -> &'static str {
        match self {
            Self::Yaml => "config.yaml",
            Self::Json => "config.json",
        }
    }
}

/// `config.yaml` under the user's config directory, when it exists.
pub fn default_config_path() -> Option<PathBuf> {
    BaseDirs::new()
        .map(|dirs| dirs.config_dir().join("chatter").join("config.yaml"))
        .filter(|path| path.is_file())
}

/// Writes a default configuration file into the current directory.
///
/// # Errors
/// Returns an error if serialization or writing the file fails.
pub fn generate_config(format: ConfigFormat) -> Result<()> {
    let config = Config::with_defaults();
    let serialized = match format {
        ConfigFormat::Yaml => serde_yml::to_string(&config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
    };

    let file_name = format.file_name();
    fs::write(file_name, serialized).with_context(|| format!("failed to write {file_name}"))?;

    println!("Configuration file '{file_name}' generated successfully.");
    Ok(())
}
