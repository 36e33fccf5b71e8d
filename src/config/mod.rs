/// Configuration management for the procweave engine
///
/// Handles server configuration, the relational store connection, and engine defaults.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Engine runtime defaults
    pub engine: EngineConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0"), env `PROCWEAVE_HOST`
    pub host: String,
    /// Server port number, env `PROCWEAVE_PORT` (default: 3004)
    pub port: u16,
}

/// Relational store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL (default: "sqlite://data/procweave.db")
    /// Holds definitions, instances, runtime node rows and history in one file
    pub url: String,
    /// How long a traversal waits for the store's write lock before failing,
    /// env `PROCWEAVE_BUSY_TIMEOUT_MS` (default: 5000)
    pub busy_timeout_ms: u64,
    /// Upper bound on pooled connections
    pub max_connections: u32,
}

/// Engine behaviour knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Assignee used when a task's assignee type is not recognized,
    /// env `PROCWEAVE_DEFAULT_ASSIGNEE` (default: "sc")
    pub default_assignee: String,
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("PROCWEAVE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("PROCWEAVE_PORT")
                    .unwrap_or_else(|_| "3004".to_string())
                    .parse()
                    .unwrap_or(3004),
            },
            database: DatabaseConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("PROCWEAVE_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/procweave.db".to_string()),
            busy_timeout_ms: std::env::var("PROCWEAVE_BUSY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            max_connections: 8,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_assignee: std::env::var("PROCWEAVE_DEFAULT_ASSIGNEE")
                .unwrap_or_else(|_| "sc".to_string()),
        }
    }
}

impl DatabaseConfig {
    /// Configuration for a database file at `path`, used by tests and embedders
    pub fn for_path(path: &std::path::Path) -> Self {
        Self {
            url: format!("sqlite://{}", path.display()),
            busy_timeout_ms: 5000,
            max_connections: 8,
        }
    }
}
