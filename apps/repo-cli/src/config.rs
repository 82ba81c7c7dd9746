//! Centralized configuration for repo-cli.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than in the middle of a command.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use repo_domain::TableName;
use sqlite_adapter::SqliteConfig;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost when the process exits)
    Memory,
    /// SQLite file-based storage
    Sqlite,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("memory") {
            Self::Memory
        } else {
            Self::Sqlite
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// CLI configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage provider (default: sqlite)
    pub storage_provider: StorageProvider,
    /// SQLite database path (default: ./data/entities.db)
    pub db_path: PathBuf,
    /// SQLite busy timeout (default: 5000 ms)
    pub busy_timeout: Duration,
    /// Table holding the entities (default: notes)
    pub table: TableName,
    /// Namespace attached to every call (default: empty)
    pub namespace: String,
    /// Log format
    pub log_format: LogFormat,
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_provider =
            StorageProvider::from_str(&lookup("REPO_STORAGE").unwrap_or_else(|| "sqlite".into()));

        let db_path = lookup("REPO_DB_PATH")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/entities.db"));

        let busy_timeout = match lookup("REPO_DB_BUSY_TIMEOUT_MS") {
            Some(raw) => raw.parse::<u64>().map(Duration::from_millis).map_err(|e| ConfigError {
                field: "REPO_DB_BUSY_TIMEOUT_MS",
                message: format!("Invalid milliseconds '{}': {}", raw, e),
            })?,
            None => Duration::from_millis(5000),
        };

        let table_raw = lookup("REPO_TABLE").unwrap_or_else(|| "notes".into());
        let table = TableName::new(table_raw.clone()).map_err(|e| ConfigError {
            field: "REPO_TABLE",
            message: format!("Invalid table name '{}': {}", table_raw, e),
        })?;

        let namespace = lookup("REPO_NAMESPACE").unwrap_or_default();

        let log_format =
            LogFormat::from_str(&lookup("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        Ok(Self {
            storage_provider,
            db_path,
            busy_timeout,
            table,
            namespace,
            log_format,
        })
    }

    pub fn sqlite(&self) -> SqliteConfig {
        SqliteConfig::new(&self.db_path).with_busy_timeout(self.busy_timeout)
    }
}
