/// Runtime node rows
///
/// One row per element visit. Task rows stay pending (`output_data IS NULL`)
/// until completed; all rows of an instance are purged at its end event.

use crate::error::Result;
use crate::process::types::SYSTEM_USER_NOBODY;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqlitePool, FromRow, Row, SqliteConnection};

/// Row about to be inserted
#[derive(Debug, Clone)]
pub struct NewNode {
    pub instance_id: i64,
    pub definition_name: String,
    pub element_name: String,
    pub execution_id: String,
    /// Element the token came from; `P1` marks a fork branch
    pub previous_execution_id: Option<String>,
    pub assignee: String,
    /// Task output JSON; `None` while a task waits
    pub output_data: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Human task rows are the only ones that show up in an inbox
    pub is_task: bool,
}

impl NewNode {
    pub fn new(
        instance_id: i64,
        definition_name: impl Into<String>,
        element_name: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self {
            instance_id,
            definition_name: definition_name.into(),
            element_name: element_name.into(),
            execution_id: execution_id.into(),
            previous_execution_id: None,
            assignee: SYSTEM_USER_NOBODY.to_string(),
            output_data: None,
            start_time: Utc::now(),
            end_time: None,
            is_task: false,
        }
    }

    pub fn task(mut self) -> Self {
        self.is_task = true;
        self
    }

    pub fn previous(mut self, previous_execution_id: Option<String>) -> Self {
        self.previous_execution_id = previous_execution_id;
        self
    }

    pub fn assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = assignee.into();
        self
    }

    pub fn output(mut self, output_data: impl Into<String>) -> Self {
        self.output_data = Some(output_data.into());
        self
    }

    /// Bookkeeping rows finish the moment they are written
    pub fn finished(mut self) -> Self {
        self.end_time = Some(self.start_time);
        self
    }
}

/// Persisted runtime row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct NodeInstance {
    pub id: i64,
    pub instance_id: i64,
    pub definition_name: String,
    pub element_name: String,
    pub execution_id: String,
    pub previous_execution_id: Option<String>,
    pub assignee: String,
    pub output_data: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_task: bool,
}

impl NodeInstance {
    /// A task row still waiting for its output
    pub fn is_pending(&self) -> bool {
        self.is_task && self.output_data.is_none()
    }
}

/// Pending task as listed in an assignee's inbox
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TaskSummary {
    pub id: i64,
    pub instance_id: i64,
    pub definition_name: String,
    pub element_name: String,
    pub execution_id: String,
    pub business_key: String,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NodeStore {
    pool: SqlitePool,
}

impl NodeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a row and return its store-assigned id
    pub async fn insert_node(&self, conn: &mut SqliteConnection, node: &NewNode) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO node_instance (
                instance_id, definition_name, element_name, execution_id,
                previous_execution_id, assignee, output_data, start_time, end_time, is_task
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(node.instance_id)
        .bind(&node.definition_name)
        .bind(&node.element_name)
        .bind(&node.execution_id)
        .bind(&node.previous_execution_id)
        .bind(&node.assignee)
        .bind(&node.output_data)
        .bind(node.start_time)
        .bind(node.end_time)
        .bind(node.is_task)
        .fetch_one(&mut *conn)
        .await?;

        let id: i64 = row.get("id");
        tracing::debug!("📝 node_instance {} <- {} ({})", id, node.execution_id, node.element_name);
        Ok(id)
    }

    /// Record a task's output. Returns `false` when the row is missing or
    /// already completed, so a task can only ever be completed once.
    pub async fn complete_node(
        &self,
        conn: &mut SqliteConnection,
        node_id: i64,
        output_data: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE node_instance SET output_data = ?, end_time = ? WHERE id = ? AND output_data IS NULL",
        )
        .bind(output_data)
        .bind(Utc::now())
        .bind(node_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Rows recorded for one element within one instance, across every round.
    ///
    /// Must run inside a `BEGIN IMMEDIATE` unit: the writer lock it holds is
    /// what keeps concurrent sibling arrivals from counting the same state.
    pub async fn count_arrivals(
        &self,
        conn: &mut SqliteConnection,
        instance_id: i64,
        execution_id: &str,
    ) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS arrived FROM node_instance WHERE instance_id = ? AND execution_id = ?",
        )
        .bind(instance_id)
        .bind(execution_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row.get("arrived"))
    }

    pub async fn delete_all_nodes_for_instance(
        &self,
        conn: &mut SqliteConnection,
        instance_id: i64,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM node_instance WHERE instance_id = ?")
            .bind(instance_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Output of the most recently started row for `execution_id`.
    ///
    /// `None` when the element has not run in this instance or its latest
    /// visit has no output yet.
    pub async fn latest_output(
        &self,
        conn: &mut SqliteConnection,
        instance_id: i64,
        execution_id: &str,
    ) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT output_data FROM node_instance
            WHERE instance_id = ? AND execution_id = ?
            ORDER BY start_time DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(instance_id)
        .bind(execution_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.and_then(|r| r.get::<Option<String>, _>("output_data")))
    }

    pub async fn get_node(&self, node_id: i64) -> Result<Option<NodeInstance>> {
        let node = sqlx::query_as::<_, NodeInstance>("SELECT * FROM node_instance WHERE id = ?")
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(node)
    }

    /// Pending task rows for `assignee`, oldest first
    pub async fn pending_for_assignee(&self, assignee: &str) -> Result<Vec<TaskSummary>> {
        let tasks = sqlx::query_as::<_, TaskSummary>(
            r#"
            SELECT n.id, n.instance_id, n.definition_name, n.element_name,
                   n.execution_id, p.business_key, n.start_time
            FROM node_instance n
            JOIN process_instance p ON p.id = n.instance_id
            WHERE n.assignee = ? AND n.is_task = 1 AND n.output_data IS NULL
            ORDER BY n.start_time ASC, n.id ASC
            "#,
        )
        .bind(assignee)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    pub async fn count_for_instance(&self, instance_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM node_instance WHERE instance_id = ?")
            .bind(instance_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;

    async fn store() -> (Database, NodeStore) {
        let db = Database::in_memory().await.unwrap();
        let nodes = NodeStore::new(db.pool().clone());
        (db, nodes)
    }

    #[tokio::test]
    async fn test_complete_only_once() {
        let (db, nodes) = store().await;
        // single pinned connection: release it before pool-level reads
        let mut conn = db.pool().acquire().await.unwrap();
        let id = nodes
            .insert_node(&mut conn, &NewNode::new(1, "p", "Approve", "A").assignee("alice").task())
            .await
            .unwrap();
        drop(conn);
        assert!(nodes.get_node(id).await.unwrap().unwrap().is_pending());

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(nodes.complete_node(&mut conn, id, r#"{"ok":true}"#).await.unwrap());
        assert!(!nodes.complete_node(&mut conn, id, r#"{"ok":false}"#).await.unwrap());
        drop(conn);

        let node = nodes.get_node(id).await.unwrap().unwrap();
        assert_eq!(node.output_data.as_deref(), Some(r#"{"ok":true}"#));
        assert!(node.end_time.is_some());
    }

    #[tokio::test]
    async fn test_only_task_rows_are_pending() {
        let (db, nodes) = store().await;
        sqlx::query(
            "INSERT INTO process_instance (id, definition_name, version, business_key, status, created_by, start_time) \
             VALUES (1, 'p', 1, 'K', 'running', 'u', '2024-01-01T00:00:00Z')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let join = nodes
            .insert_node(&mut conn, &NewNode::new(1, "p", "parallelGateway", "P1").finished())
            .await
            .unwrap();
        let task = nodes
            .insert_node(&mut conn, &NewNode::new(1, "p", "Review", "R").assignee("nobody").task())
            .await
            .unwrap();
        drop(conn);

        let pending = nodes.pending_for_assignee("nobody").await.unwrap();
        assert_eq!(pending.iter().map(|t| t.id).collect::<Vec<_>>(), vec![task]);
        assert!(!nodes.get_node(join).await.unwrap().unwrap().is_pending());
    }

    #[tokio::test]
    async fn test_latest_output_prefers_newest_round() {
        let (db, nodes) = store().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let first = NewNode::new(7, "p", "Review", "R").output(r#"{"decision":"again"}"#);
        let mut second = NewNode::new(7, "p", "Review", "R").output(r#"{"decision":"done"}"#);
        second.start_time = first.start_time + chrono::Duration::seconds(1);

        nodes.insert_node(&mut conn, &second).await.unwrap();
        nodes.insert_node(&mut conn, &first).await.unwrap();

        let latest = nodes.latest_output(&mut conn, 7, "R").await.unwrap();
        assert_eq!(latest.as_deref(), Some(r#"{"decision":"done"}"#));
        assert_eq!(nodes.latest_output(&mut conn, 7, "missing").await.unwrap(), None);
        assert_eq!(nodes.count_arrivals(&mut conn, 7, "R").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_all_for_instance() {
        let (db, nodes) = store().await;
        let mut conn = db.pool().acquire().await.unwrap();

        for id in ["a", "b"] {
            nodes.insert_node(&mut conn, &NewNode::new(1, "p", id, id)).await.unwrap();
        }
        nodes.insert_node(&mut conn, &NewNode::new(2, "p", "c", "c")).await.unwrap();

        assert_eq!(nodes.delete_all_nodes_for_instance(&mut conn, 1).await.unwrap(), 2);
        drop(conn);
        assert_eq!(nodes.count_for_instance(1).await.unwrap(), 0);
        assert_eq!(nodes.count_for_instance(2).await.unwrap(), 1);
    }
}
