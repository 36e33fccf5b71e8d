/// Process instance rows

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqlitePool, FromRow, Row, SqliteConnection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum InstanceStatus {
    Running,
    Completed,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProcessInstance {
    pub id: i64,
    pub definition_name: String,
    pub version: i64,
    pub business_key: String,
    pub status: InstanceStatus,
    pub created_by: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewInstance<'a> {
    pub definition_name: &'a str,
    pub version: i64,
    pub business_key: &'a str,
    pub created_by: &'a str,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct InstanceStore {
    pool: SqlitePool,
}

impl InstanceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_instance(
        &self,
        conn: &mut SqliteConnection,
        instance: &NewInstance<'_>,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO process_instance (definition_name, version, business_key, status, created_by, start_time)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(instance.definition_name)
        .bind(instance.version)
        .bind(instance.business_key)
        .bind(InstanceStatus::Running)
        .bind(instance.created_by)
        .bind(instance.start_time)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row.get("id"))
    }

    /// Flip a running instance to completed; a no-op if it already is
    pub async fn mark_completed(&self, conn: &mut SqliteConnection, instance_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE process_instance SET status = ?, end_time = ? WHERE id = ? AND status = ?",
        )
        .bind(InstanceStatus::Completed)
        .bind(Utc::now())
        .bind(instance_id)
        .bind(InstanceStatus::Running)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_instance(&self, instance_id: i64) -> Result<Option<ProcessInstance>> {
        let instance =
            sqlx::query_as::<_, ProcessInstance>("SELECT * FROM process_instance WHERE id = ?")
                .bind(instance_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(instance)
    }
}
