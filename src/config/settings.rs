//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default dataset file name, resolved against the working directory.
pub const DEFAULT_DATA_FILE: &str = "kalender 2019_2028.csv";

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Path to the calendar dataset.
    #[serde(default)]
    pub data_path: Option<PathBuf>,

    /// Transport and listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication settings for the HTTP transports.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "Invalid port 0. Must be between 1 and 65535".to_string(),
            });
        }

        if self.auth.token.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::Invalid {
                message: "Authentication token must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the dataset path, falling back to [`DEFAULT_DATA_FILE`].
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.data_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE))
    }

    /// Applies the `PORT` and `MCP_AUTH_TOKEN` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` is not a valid port number.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` is not a valid port number.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::Invalid {
                message: format!("Invalid PORT '{port}'. Must be between 1 and 65535"),
            })?;
        }

        if let Some(token) = lookup("MCP_AUTH_TOKEN").filter(|t| !t.is_empty()) {
            self.auth.token = Some(token);
        }

        Ok(())
    }
}

/// The transport binding the server runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Newline-delimited JSON-RPC over stdin/stdout.
    #[default]
    Stdio,
    /// Stateless JSON-RPC over HTTP POST.
    Http,
    /// Event stream plus message endpoint.
    Sse,
    /// Session-oriented streamable HTTP.
    Streamable,
}

/// Transport and listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Transport binding. Default: "stdio"
    #[serde(default)]
    pub transport: TransportKind,

    /// Listen address for the HTTP transports.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port for the HTTP transports.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Bearer token required on MCP endpoints. Authentication is disabled
    /// when unset.
    #[serde(default)]
    pub token: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.transport, TransportKind::Stdio);
        assert_eq!(config.data_path(), PathBuf::from(DEFAULT_DATA_FILE));
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "data_path": "/srv/data/kalender.csv",
            "server": {
                "transport": "streamable",
                "host": "127.0.0.1",
                "port": 8080
            },
            "auth": {
                "token": "s3cret"
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.data_path(), PathBuf::from("/srv/data/kalender.csv"));
        assert_eq!(config.server.transport, TransportKind::Streamable);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.token.as_deref(), Some("s3cret"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.transport, TransportKind::Stdio);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_port_zero() {
        let json = r#"{ "server": { "port": 0 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_empty_token() {
        let json = r#"{ "auth": { "token": "" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_transport() {
        let json = r#"{ "server": { "transport": "websocket" } }"#;
        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn env_overrides_port_and_token() {
        let mut config = Config::default();
        config
            .apply_env_from(|key| match key {
                "PORT" => Some("4100".to_string()),
                "MCP_AUTH_TOKEN" => Some("from-env".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.auth.token.as_deref(), Some("from-env"));
    }

    #[test]
    fn env_rejects_bad_port() {
        let mut config = Config::default();
        let result = config.apply_env_from(|key| (key == "PORT").then(|| "http".to_string()));
        assert!(result.is_err());
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn empty_env_token_is_ignored() {
        let mut config = Config::default();
        config
            .apply_env_from(|key| (key == "MCP_AUTH_TOKEN").then(String::new))
            .unwrap();
        assert!(config.auth.token.is_none());
    }
}
