//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path given as the `CONFIG_FILE` CLI argument (must exist)
//! 2. Default location, used only if present:
//!    - **Linux/macOS:** `~/.school-vacation-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.school-vacation-mcp\config.json`
//!
//! Without either, built-in defaults apply. The `PORT` and `MCP_AUTH_TOKEN`
//! environment variables override the file.

mod settings;

pub use settings::{
    AuthConfig, Config, LoggingConfig, ServerConfig, TransportKind, DEFAULT_DATA_FILE,
};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.school-vacation-mcp/`
/// - **Windows:** `%USERPROFILE%\.school-vacation-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".school-vacation-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, uses the platform-specific default location, or the
/// built-in defaults if no file exists there.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - Required fields are missing or invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path().filter(|p| p.exists()) {
            Some(p) => p,
            None => {
                tracing::debug!("No configuration file, using defaults");
                return Ok(Config::default());
            }
        },
    };

    tracing::debug!(path = %config_path.display(), "Loading configuration file");
    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Read {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: config_path.clone(),
        source: e,
    })?;

    // Validate the configuration
    config.validate()?;

    Ok(config)
}
