/// SQLite persistence for process definitions
///
/// Definitions are immutable once stored; deploying a definition under an
/// existing name adds a new version rather than overwriting the old one.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqlitePool, FromRow, Row};

/// One stored version of a definition
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProcessDefinition {
    pub id: i64,
    pub name: String,
    pub version: i64,
    /// Definition source text
    pub content: String,
    pub description: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Latest version of each definition name
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DefinitionMetadata {
    pub name: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DefinitionStorage {
    pool: SqlitePool,
}

impl DefinitionStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store source text as the next version of `name`; returns `(id, version)`.
    ///
    /// The version is computed inside the INSERT itself, and `UNIQUE(name, version)`
    /// rejects a concurrent deploy that computed the same one.
    pub async fn save_definition(
        &self,
        name: &str,
        content: &str,
        created_by: &str,
        description: Option<&str>,
    ) -> Result<(i64, i64)> {
        let row = sqlx::query(
            r#"
            INSERT INTO process_definition (name, version, content, description, created_by, created_at)
            SELECT ?, COALESCE(MAX(version), 0) + 1, ?, ?, ?, ?
            FROM process_definition WHERE name = ?
            RETURNING id, version
            "#,
        )
        .bind(name)
        .bind(content)
        .bind(description)
        .bind(created_by)
        .bind(Utc::now())
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.get("id"), row.get("version")))
    }

    /// Highest version stored under `name`
    pub async fn load_latest(&self, name: &str) -> Result<Option<ProcessDefinition>> {
        let definition = sqlx::query_as::<_, ProcessDefinition>(
            "SELECT * FROM process_definition WHERE name = ? ORDER BY version DESC LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(definition)
    }

    pub async fn get_by_name_and_version(
        &self,
        name: &str,
        version: i64,
    ) -> Result<Option<ProcessDefinition>> {
        let definition = sqlx::query_as::<_, ProcessDefinition>(
            "SELECT * FROM process_definition WHERE name = ? AND version = ?",
        )
        .bind(name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(definition)
    }

    /// Latest version of every definition, used to warm the model cache
    pub async fn list_latest(&self) -> Result<Vec<ProcessDefinition>> {
        let definitions = sqlx::query_as::<_, ProcessDefinition>(
            r#"
            SELECT d.* FROM process_definition d
            JOIN (SELECT name, MAX(version) AS version FROM process_definition GROUP BY name) latest
              ON latest.name = d.name AND latest.version = d.version
            ORDER BY d.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(definitions)
    }

    pub async fn list_metadata(&self) -> Result<Vec<DefinitionMetadata>> {
        let rows = sqlx::query(
            "SELECT name, MAX(version) AS version, MAX(created_at) AS created_at FROM process_definition GROUP BY name ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut definitions = Vec::new();
        for row in rows {
            definitions.push(DefinitionMetadata {
                name: row.get("name"),
                version: row.get("version"),
                created_at: row.get("created_at"),
            });
        }
        Ok(definitions)
    }
}
