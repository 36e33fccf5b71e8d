/// Process instance REST endpoints

use crate::api::{ApiError, ApiResult, AppState};
use crate::error::EngineError;
use crate::store::{HistoricNodeInstance, ProcessInstance};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Request body for starting an instance
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub definition_name: String,
    pub business_key: String,
    pub created_by: String,
    /// Start form data; omitted means `{}`
    #[serde(default)]
    pub form_data: Option<Value>,
}

pub fn create_instance_routes() -> Router<AppState> {
    Router::new()
        .route("/api/instances", post(start_instance))
        .route("/api/instances/{id}", get(get_instance))
        .route("/api/instances/{id}/history", get(get_history))
}

/// Start a new instance of the latest definition version
///
/// POST /api/instances
/// Body: { "definition_name": "...", "business_key": "...", "created_by": "...", "form_data": {...} }
async fn start_instance(
    State(state): State<AppState>,
    Json(payload): Json<StartRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if payload.definition_name.is_empty() {
        return Err(ApiError(EngineError::DefinitionNotFound(String::new())));
    }

    let form = match &payload.form_data {
        Some(value) => serde_json::to_string(value).map_err(EngineError::from)?,
        None => String::new(),
    };

    let instance_id = state
        .engine
        .start_instance(&payload.definition_name, &payload.business_key, &payload.created_by, &form)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "instance_id": instance_id }))))
}

/// GET /api/instances/{id}
async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ProcessInstance>> {
    Ok(Json(state.engine.instance(id).await?))
}

/// Audit trail in visit order
///
/// GET /api/instances/{id}/history
async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<HistoricNodeInstance>>> {
    Ok(Json(state.engine.instance_history(id).await?))
}
