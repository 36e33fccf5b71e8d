/// Per-traversal execution state
///
/// An `ExecutionContext` lives for exactly one entry-point call (instance start
/// or task completion). It exclusively owns the open unit of work; handlers
/// commit through it, and the entry point settles whatever is still open via
/// [`ExecutionContext::finish`].

use crate::error::Result;
use crate::process::ProcessModel;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Sqlite, SqliteConnection, Transaction};
use std::sync::Arc;

/// Statement every traversal unit starts with. Taking the writer lock up front
/// orders concurrent arrivals at a join, and avoids SQLITE_BUSY upgrades from a
/// deferred read transaction.
const BEGIN_UNIT: &str = "BEGIN IMMEDIATE";

pub struct ExecutionContext {
    pub model: Arc<ProcessModel>,
    pub instance_id: i64,
    pub definition_name: String,
    pub version: i64,
    pub business_key: String,
    pub started_by: String,
    pub start_time: DateTime<Utc>,
    /// Execution id of the most recently persisted element
    pub current_element_id: Option<String>,
    /// JSON form or output data submitted by the caller
    pub payload: String,
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("definition_name", &self.definition_name)
            .field("version", &self.version)
            .field("instance_id", &self.instance_id)
            .field("current_element_id", &self.current_element_id)
            .field("in_transaction", &self.tx.is_some())
            .finish()
    }
}

impl ExecutionContext {
    pub fn new(model: Arc<ProcessModel>, pool: SqlitePool) -> Self {
        Self {
            definition_name: model.definition_name.clone(),
            version: model.version,
            model,
            instance_id: 0,
            business_key: String::new(),
            started_by: String::new(),
            start_time: Utc::now(),
            current_element_id: None,
            payload: String::new(),
            pool,
            tx: None,
        }
    }

    /// Connection of the open unit of work, opening a new one if a handler
    /// already committed the previous unit
    pub async fn conn(&mut self) -> Result<&mut SqliteConnection> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => {
                tracing::debug!("🔒 {} for instance {}", BEGIN_UNIT, self.instance_id);
                self.pool.begin_with(BEGIN_UNIT).await?
            }
        };
        Ok(&mut **self.tx.insert(tx))
    }

    #[cfg(test)]
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Commit the open unit, if any
    pub async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            tracing::debug!("💾 Committed unit for instance {}", self.instance_id);
        }
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            tracing::debug!("↩️ Rolled back unit for instance {}", self.instance_id);
        }
        Ok(())
    }

    /// Settle the traversal: commit what is still open on success, roll it
    /// back on failure. Units committed earlier by handlers stay committed.
    pub async fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback().await {
                    tracing::error!("❌ Rollback failed for instance {}: {}", self.instance_id, rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Whether the element that handed control to the current step is a
    /// parallel gateway, i.e. the step is part of a fork's fan-out
    pub fn predecessor_is_parallel_gateway(&self) -> bool {
        self.current_element_id
            .as_deref()
            .is_some_and(|id| self.model.is_parallel_gateway(id))
    }
}
