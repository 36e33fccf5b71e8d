/// Relational store for definitions, instances and node rows
///
/// One SQLite database holds everything. Traversal calls open their units of
/// work with `BEGIN IMMEDIATE`, which takes the single writer lock up front;
/// that is what serializes parallel-gateway arrival counting.

pub mod history;
pub mod instances;
pub mod nodes;

use crate::config::DatabaseConfig;
use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub use history::{HistoricNodeInstance, HistoryStore};
pub use instances::{InstanceStatus, InstanceStore, NewInstance, ProcessInstance};
pub use nodes::{NewNode, NodeInstance, NodeStore, TaskSummary};

/// Shared connection pool plus schema management
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database described by `config`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        if let Some(path) = config.url.strip_prefix("sqlite://") {
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    anyhow::anyhow!("Failed to create database directory '{}': {}", parent.display(), e)
                })?;
            }
        }

        tracing::info!("🗄️ Opening process database: {}", config.url);

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let database = Self { pool };
        database.init_schema().await?;

        tracing::info!("✅ Process database ready");
        Ok(database)
    }

    /// Private in-memory database on a single pinned connection
    ///
    /// Every `:memory:` connection is its own database, so the pool must never
    /// open a second one or recycle the first.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let database = Self { pool };
        database.init_schema().await?;
        Ok(database)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create all tables and indexes. Safe to call repeatedly.
    pub async fn init_schema(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS process_definition (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                version INTEGER NOT NULL,
                content TEXT NOT NULL,
                description TEXT,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (name, version)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS process_instance (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                definition_name TEXT NOT NULL,
                version INTEGER NOT NULL,
                business_key TEXT NOT NULL,
                status TEXT NOT NULL,
                created_by TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS node_instance (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instance_id INTEGER NOT NULL,
                definition_name TEXT NOT NULL,
                element_name TEXT NOT NULL,
                execution_id TEXT NOT NULL,
                previous_execution_id TEXT,
                assignee TEXT NOT NULL,
                output_data TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT,
                is_task INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS historic_node_instance (
                id INTEGER PRIMARY KEY,
                instance_id INTEGER NOT NULL,
                definition_name TEXT NOT NULL,
                element_name TEXT NOT NULL,
                execution_id TEXT NOT NULL,
                previous_execution_id TEXT,
                assignee TEXT NOT NULL,
                output_data TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT,
                is_task INTEGER NOT NULL DEFAULT 0
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_node_instance_exec ON node_instance(instance_id, execution_id)",
            "CREATE INDEX IF NOT EXISTS idx_node_instance_assignee ON node_instance(assignee)",
            "CREATE INDEX IF NOT EXISTS idx_historic_node_instance ON historic_node_instance(instance_id)",
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        tracing::debug!("📋 Schema initialized");
        Ok(())
    }
}
