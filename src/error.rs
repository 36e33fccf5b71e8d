/// Engine error taxonomy
///
/// Every traversal step returns `Result<T>`; the entry point that owns the
/// transaction rolls it back on the first `Err` and hands the error to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Definition errors: fatal to the traversal call, never retried
    #[error("Failed to parse process definition: {0}")]
    DefinitionParse(String),

    #[error("Invalid process definition: {0}")]
    InvalidDefinition(String),

    #[error("Process definition not found: {0}")]
    DefinitionNotFound(String),

    #[error("Unknown execution id: {0}")]
    UnknownElement(String),

    #[error("Invalid condition expression: {0}")]
    InvalidExpression(String),

    // Attribute resolution: stops the owning sequence flow only
    #[error("Attribute {execution_id}.{field} not found")]
    AttributeNotFound { execution_id: String, field: String },

    #[error("Listener not registered: {0}")]
    ListenerNotRegistered(String),

    #[error("Listener '{name}' failed: {message}")]
    Listener { name: String, message: String },

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("Task already completed: {0}")]
    TaskAlreadyCompleted(i64),

    #[error("User '{user}' is not the assignee of task {task_id}")]
    NotAssignee { task_id: i64, user: String },

    #[error("Process instance not found: {0}")]
    InstanceNotFound(i64),
}

impl EngineError {
    /// Errors caused by the process definition itself rather than by data or storage
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            EngineError::DefinitionParse(_)
                | EngineError::InvalidDefinition(_)
                | EngineError::UnknownElement(_)
                | EngineError::InvalidExpression(_)
                | EngineError::ListenerNotRegistered(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
