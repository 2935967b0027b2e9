//! Startup and configuration errors.
//!
//! Dataset and query errors live in [`crate::calendar`], session routing
//! errors in [`crate::mcp::session`]. Messages never include the
//! authentication token.

use std::path::PathBuf;

use thiserror::Error;

use crate::calendar::CalendarError;

/// Configuration could not be loaded or is unusable.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("cannot read configuration file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON or has unknown keys.
    #[error("malformed configuration file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An explicitly requested file does not exist.
    #[error("configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// A setting is out of range.
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// Anything that stops the server before or while it runs.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("calendar dataset unavailable")]
    Dataset(#[from] CalendarError),

    #[error("failed to start async runtime")]
    Runtime(#[source] std::io::Error),

    #[error("transport failed")]
    Transport(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn not_found_names_the_path() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/etc/school-vacation-mcp/config.json"),
        };
        assert_eq!(
            error.to_string(),
            "configuration file not found: /etc/school-vacation-mcp/config.json"
        );
    }

    #[test]
    fn startup_error_keeps_cause_chain() {
        let error = StartupError::from(ConfigError::Invalid {
            message: "Invalid port 0".to_string(),
        });
        assert_eq!(error.to_string(), "invalid configuration: Invalid port 0");

        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let error = StartupError::Transport(io);
        assert_eq!(error.source().unwrap().to_string(), "port taken");
    }
}
