/// Runtime Execution Engine
///
/// Drives process instances through their compiled graph:
/// - Per-traversal execution context and unit-of-work ownership
/// - Element handlers and the parallel join barrier
/// - Condition evaluation over persisted task output
/// - Assignee resolution and named listeners

pub mod assignment;
pub mod context;
pub mod engine;
pub mod executor;
pub mod expression;
pub mod join;
pub mod listener;

pub use context::ExecutionContext;
pub use engine::{DeployedDefinition, ProcessEngine, TaskDetail};
pub use executor::ElementExecutor;
pub use expression::{Expression, Reference};
pub use listener::{ListenerEvent, ListenerRegistry};
