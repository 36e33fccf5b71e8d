/// Human task REST endpoints

use crate::api::{ApiResult, AppState};
use crate::runtime::TaskDetail;
use crate::store::TaskSummary;
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    pub assignee: String,
}

/// Request body for completing a task
#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    /// Acting user; must be the task's assignee
    pub user: String,
    #[serde(default)]
    pub output: Option<Value>,
}

pub fn create_task_routes() -> Router<AppState> {
    Router::new()
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/tasks/{id}/complete", post(complete_task))
}

/// Pending tasks of one assignee
///
/// GET /api/tasks?assignee=alice
async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<InboxQuery>,
) -> ApiResult<Json<Vec<TaskSummary>>> {
    Ok(Json(state.engine.pending_tasks_for_assignee(&query.assignee).await?))
}

/// GET /api/tasks/{id}
async fn get_task(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<TaskDetail>> {
    Ok(Json(state.engine.task_detail(id).await?))
}

/// Complete a task and continue its instance
///
/// POST /api/tasks/{id}/complete
/// Body: { "user": "alice", "output": { "decision": "yes" } }
async fn complete_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<CompleteRequest>,
) -> ApiResult<Json<Value>> {
    let output = match &payload.output {
        Some(value) => value.to_string(),
        None => String::new(),
    };

    state.engine.complete_task(id, &output, &payload.user).await?;
    tracing::info!("✅ Task {} completed by {}", id, payload.user);

    Ok(Json(json!({ "task_id": id, "status": "completed" })))
}
