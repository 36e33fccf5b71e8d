/// procweave: lightweight business-process execution engine
///
/// Drives instances of a declarative process graph (start event, tasks,
/// parallel and exclusive gateways, end event, sequence flows) through
/// transactional steps, suspending durably at human tasks.

// Core configuration and setup
pub mod config;

// Engine error taxonomy
pub mod error;

// Process definitions - element types, compiled models, storage and hot-reload cache
pub mod process;

// Relational store - instance, runtime node and history rows
pub mod store;

// Runtime execution engine - element handlers, join barrier, conditions, commit policy
pub mod runtime;

// HTTP API layer - REST endpoints for definitions, instances and tasks
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use error::{EngineError, Result};
pub use process::{ModelRegistry, ProcessModel};
pub use runtime::{ListenerRegistry, ProcessEngine};
pub use server::start_server;
pub use store::Database;
