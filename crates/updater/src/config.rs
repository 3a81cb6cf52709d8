//! Updater configuration.
//!
//! Every option can be given on the command line or through the environment.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PARLDATA_DATABASE_URL` | parldata.db | SQLite database path (`:memory:` for a scratch database) |
//! | `PARLDATA_LOG_LEVEL` | info | Log level |
//! | `PARLDATA_DATA_DIR` | data | Directory holding `<parliament>.json` datasets |
//! | `PARLDATA_MAX_CONNECTIONS` | 4 | Connection pool size |
//! | `PARLDATA_BUSY_TIMEOUT_MS` | 5000 | SQLite busy timeout |
//!
//! # Example
//!
//! ```rust
//! use parldata_updater::{Command, UpdaterConfig};
//!
//! let config = UpdaterConfig {
//!     database_url: ":memory:".to_string(),
//!     command: Command::List,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use parldata_persistence::backends::sqlite::SqliteBackendConfig;

/// Updater configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "parldata")]
#[command(about = "Scrapes, updates and checks parliament data")]
pub struct UpdaterConfig {
    /// SQLite database path.
    #[arg(long, env = "PARLDATA_DATABASE_URL", default_value = "parldata.db")]
    pub database_url: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "PARLDATA_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Directory holding the parliament datasets.
    #[arg(long, env = "PARLDATA_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Maximum number of pooled database connections.
    #[arg(long, env = "PARLDATA_MAX_CONNECTIONS", default_value = "4")]
    pub max_connections: u32,

    /// SQLite busy timeout in milliseconds.
    #[arg(long, env = "PARLDATA_BUSY_TIMEOUT_MS", default_value = "5000")]
    pub busy_timeout_ms: u32,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Updater actions.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Fetch a parliament's data and print it without touching the database.
    Scrape {
        /// Parliament code.
        parliament: String,
    },
    /// Fetch a parliament's data and write it to the database.
    Update {
        /// Parliament code.
        parliament: String,
    },
    /// Run the consistency checks for a parliament.
    Check {
        /// Parliament code.
        parliament: String,
    },
    /// List the registered parliaments.
    List,
}

impl Command {
    /// The parliament the command targets, if any.
    pub fn parliament(&self) -> Option<&str> {
        match self {
            Command::Scrape { parliament }
            | Command::Update { parliament }
            | Command::Check { parliament } => Some(parliament),
            Command::List => None,
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            database_url: "parldata.db".to_string(),
            log_level: "info".to_string(),
            data_dir: PathBuf::from("data"),
            max_connections: 4,
            busy_timeout_ms: 5000,
            command: Command::List,
        }
    }
}

impl UpdaterConfig {
    /// Validates the configuration and returns every error found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database_url.trim().is_empty() {
            errors.push("Database URL cannot be empty".to_string());
        }

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            errors.push(format!(
                "Log level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.log_level
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections cannot be 0".to_string());
        }

        if let Some(parliament) = self.command.parliament() {
            if parliament.trim().is_empty() {
                errors.push("Parliament code cannot be empty".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Backend settings derived from this configuration.
    pub fn backend_config(&self) -> SqliteBackendConfig {
        SqliteBackendConfig {
            max_connections: self.max_connections,
            busy_timeout_ms: self.busy_timeout_ms,
            ..Default::default()
        }
    }

    /// Creates a configuration suitable for testing.
    pub fn for_testing(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_url: ":memory:".to_string(),
            log_level: "debug".to_string(),
            data_dir: data_dir.into(),
            max_connections: 2,
            busy_timeout_ms: 1000,
            command: Command::List,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = UpdaterConfig::default();
        assert_eq!(config.database_url, "parldata.db");
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_subcommand() {
        let config =
            UpdaterConfig::try_parse_from(["parldata", "--log-level", "debug", "update", "cz-psp"])
                .unwrap();
        assert_eq!(
            config.command,
            Command::Update {
                parliament: "cz-psp".to_string()
            }
        );
        assert_eq!(config.command.parliament(), Some("cz-psp"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = UpdaterConfig {
            database_url: " ".to_string(),
            log_level: "loud".to_string(),
            max_connections: 0,
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("Log level")));
    }

    #[test]
    fn test_backend_config() {
        let config = UpdaterConfig {
            max_connections: 7,
            busy_timeout_ms: 250,
            ..Default::default()
        };
        let backend = config.backend_config();
        assert_eq!(backend.max_connections, 7);
        assert_eq!(backend.busy_timeout_ms, 250);
        assert!(backend.enable_foreign_keys);
    }
}
