/// Process definition REST endpoints
///
/// Deploying a definition stores it as the next version and hot-swaps the
/// cached model, so new instances pick it up immediately.

use crate::api::{ApiError, ApiResult, AppState};
use crate::error::EngineError;
use crate::process::ProcessDefinition;
use crate::runtime::DeployedDefinition;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Request body for deploying a definition
#[derive(Debug, Deserialize)]
pub struct DeployRequest {
    /// XML definition source
    pub content: String,
    pub created_by: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub fn create_definition_routes() -> Router<AppState> {
    Router::new()
        .route("/api/definitions", post(deploy_definition).get(list_definitions))
        .route("/api/definitions/{name}", get(get_definition))
        .route("/api/definitions/{name}/versions/{version}", get(get_definition_version))
        .route("/api/definitions/{name}/forms/{execution_id}", get(get_form))
}

/// Deploy a new definition version
///
/// POST /api/definitions
/// Body: { "content": "<Process ...>", "created_by": "...", "description": "..." }
async fn deploy_definition(
    State(state): State<AppState>,
    Json(payload): Json<DeployRequest>,
) -> ApiResult<(StatusCode, Json<DeployedDefinition>)> {
    if payload.content.trim().is_empty() {
        return Err(ApiError(EngineError::DefinitionParse("empty definition".to_string())));
    }

    let deployed = state
        .engine
        .deploy_definition(&payload.content, &payload.created_by, payload.description.as_deref())
        .await?;

    tracing::info!("🔥 Deployed definition via API: {} v{}", deployed.name, deployed.version);
    Ok((StatusCode::CREATED, Json(deployed)))
}

/// GET /api/definitions
async fn list_definitions(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let definitions = state.engine.registry().storage().list_metadata().await?;
    Ok(Json(json!({ "definitions": definitions })))
}

/// Latest version of a definition
///
/// GET /api/definitions/{name}
async fn get_definition(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ProcessDefinition>> {
    Ok(Json(state.engine.definition(&name).await?))
}

/// GET /api/definitions/{name}/versions/{version}
async fn get_definition_version(
    State(state): State<AppState>,
    Path((name, version)): Path<(String, i64)>,
) -> ApiResult<Json<ProcessDefinition>> {
    Ok(Json(state.engine.definition_version(&name, version).await?))
}

/// Form schema of a start event or task
///
/// GET /api/definitions/{name}/forms/{execution_id}
async fn get_form(
    State(state): State<AppState>,
    Path((name, execution_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let form = state.engine.element_form(&name, &execution_id).await?;
    Ok(Json(json!({ "execution_id": execution_id, "form_data": form })))
}
