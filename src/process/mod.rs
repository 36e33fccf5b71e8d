/// Process definition layer - element types, compiled models, storage and cache

pub mod model;
pub mod registry;
pub mod storage;
pub mod types;

pub use model::ProcessModel;
pub use registry::ModelRegistry;
pub use storage::{DefinitionMetadata, DefinitionStorage, ProcessDefinition};
pub use types::{Element, ElementKind};
