/// Append-only audit trail of node visits
///
/// History rows keep the runtime row id and are never updated or deleted.

use crate::error::Result;
use crate::store::nodes::NewNode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqlitePool, FromRow, SqliteConnection};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HistoricNodeInstance {
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

#[derive(Debug, Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Write a history row from the values just inserted as runtime row `node_id`
    pub async fn copy_node(
        &self,
        conn: &mut SqliteConnection,
        node_id: i64,
        node: &NewNode,
    ) -> Result<i64> {
        sqlx::query(
            r#"
            INSERT INTO historic_node_instance (
                id, instance_id, definition_name, element_name, execution_id,
                previous_execution_id, assignee, output_data, start_time, end_time, is_task
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(node_id)
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
        .execute(&mut *conn)
        .await?;

        Ok(node_id)
    }

    /// Copy the current state of runtime row `node_id`
    pub async fn copy_node_by_id(&self, conn: &mut SqliteConnection, node_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO historic_node_instance (
                id, instance_id, definition_name, element_name, execution_id,
                previous_execution_id, assignee, output_data, start_time, end_time, is_task
            )
            SELECT id, instance_id, definition_name, element_name, execution_id,
                   previous_execution_id, assignee, output_data, start_time, end_time, is_task
            FROM node_instance WHERE id = ?
            "#,
        )
        .bind(node_id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Audit trail of one instance in visit order
    pub async fn history_for_instance(&self, instance_id: i64) -> Result<Vec<HistoricNodeInstance>> {
        let rows = sqlx::query_as::<_, HistoricNodeInstance>(
            "SELECT * FROM historic_node_instance WHERE instance_id = ? ORDER BY start_time ASC, id ASC",
        )
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// History row carrying runtime id `node_id`; outlives the runtime row
    pub async fn get_node(&self, node_id: i64) -> Result<Option<HistoricNodeInstance>> {
        let row = sqlx::query_as::<_, HistoricNodeInstance>("SELECT * FROM historic_node_instance WHERE id = ?")
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Database, NodeStore};

    #[tokio::test]
    async fn test_copy_keeps_runtime_id_and_survives_purge() {
        let db = Database::in_memory().await.unwrap();
        let nodes = NodeStore::new(db.pool().clone());
        let history = HistoryStore::new(db.pool().clone());

        let mut conn = db.pool().acquire().await.unwrap();
        let gateway = NewNode::new(3, "p", "exclusiveGateway", "X").finished();
        let gateway_id = nodes.insert_node(&mut conn, &gateway).await.unwrap();
        history.copy_node(&mut conn, gateway_id, &gateway).await.unwrap();

        let task_id = nodes
            .insert_node(&mut conn, &NewNode::new(3, "p", "Approve", "A").assignee("alice").task())
            .await
            .unwrap();
        nodes.complete_node(&mut conn, task_id, r#"{"decision":"yes"}"#).await.unwrap();
        history.copy_node_by_id(&mut conn, task_id).await.unwrap();

        nodes.delete_all_nodes_for_instance(&mut conn, 3).await.unwrap();
        drop(conn);

        let trail = history.history_for_instance(3).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].id, gateway_id);
        assert_eq!(trail[1].id, task_id);
        assert_eq!(trail[1].output_data.as_deref(), Some(r#"{"decision":"yes"}"#));
        let task = history.get_node(task_id).await.unwrap().unwrap();
        assert!(task.is_task);
        assert!(!history.get_node(gateway_id).await.unwrap().unwrap().is_task);
        assert!(history.get_node(999).await.unwrap().is_none());
    }
}
