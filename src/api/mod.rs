/// HTTP API Layer
///
/// Thin REST surface over the process engine:
/// - Definition deploy and lookup
/// - Instance start, status and audit trail
/// - Task inbox, detail and completion

use crate::error::EngineError;
use crate::runtime::ProcessEngine;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde_json::json;
use std::sync::Arc;

// Definition deploy and form lookup
pub mod definitions;

// Instance start and inspection
pub mod instances;

// Task inbox and completion
pub mod tasks;

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ProcessEngine>,
}

/// Engine error rendered as a JSON response with a matching status code
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::DefinitionNotFound(_)
            | EngineError::TaskNotFound(_)
            | EngineError::InstanceNotFound(_)
            | EngineError::UnknownElement(_) => StatusCode::NOT_FOUND,
            EngineError::TaskAlreadyCompleted(_) => StatusCode::CONFLICT,
            EngineError::NotAssignee { .. } => StatusCode::FORBIDDEN,
            EngineError::Serialization(_) => StatusCode::BAD_REQUEST,
            e if e.is_definition_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("❌ Request failed: {}", self.0);
        } else {
            tracing::debug!("⚠️ Request rejected ({}): {}", status, self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// All API routes, ready for `with_state`
pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        .merge(definitions::create_definition_routes())
        .merge(instances::create_instance_routes())
        .merge(tasks::create_task_routes())
}
