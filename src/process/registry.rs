/// Hot-swappable cache of compiled process models
///
/// Models are keyed by definition name only. Reads are lock-free through
/// `ArcSwap`; each update clones the map, inserts, and swaps the pointer, so a
/// reader sees either the old model or the new one and never a partial build.

use crate::error::{EngineError, Result};
use crate::process::{model::ProcessModel, storage::DefinitionStorage};
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct ModelRegistry {
    /// definition name -> latest compiled model
    models: ArcSwap<HashMap<String, Arc<ProcessModel>>>,
    storage: DefinitionStorage,
    /// Serializes cache misses so a definition is compiled once
    load_guard: Mutex<()>,
}

impl ModelRegistry {
    pub fn new(storage: DefinitionStorage) -> Self {
        Self {
            models: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
            load_guard: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &DefinitionStorage {
        &self.storage
    }

    /// Compile the latest version of every stored definition
    ///
    /// A definition that no longer compiles is skipped with an error log so
    /// one bad row cannot keep the engine from starting.
    pub async fn init_from_storage(&self) -> Result<()> {
        let definitions = self.storage.list_latest().await?;
        let mut compiled = HashMap::new();

        for definition in definitions {
            match ProcessModel::from_xml(&definition.content, definition.version) {
                Ok(model) => {
                    compiled.insert(model.definition_name.clone(), Arc::new(model));
                }
                Err(e) => {
                    tracing::error!(
                        "❌ Stored definition '{}' v{} failed to compile: {}",
                        definition.name,
                        definition.version,
                        e
                    );
                }
            }
        }

        self.models.store(Arc::new(compiled));
        tracing::info!("📊 Model registry initialized with {} definitions", self.models.load().len());
        Ok(())
    }

    /// Cached model, without touching storage
    pub fn get(&self, name: &str) -> Option<Arc<ProcessModel>> {
        self.models.load().get(name).cloned()
    }

    /// Cached model, compiling the latest stored version on a miss
    pub async fn get_or_load(&self, name: &str) -> Result<Arc<ProcessModel>> {
        if let Some(model) = self.get(name) {
            return Ok(model);
        }

        let _guard = self.load_guard.lock().await;
        // another caller may have loaded it while we waited
        if let Some(model) = self.get(name) {
            return Ok(model);
        }

        self.reload(name).await
    }

    /// Recompile the latest stored version of `name` and swap it in
    pub async fn reload(&self, name: &str) -> Result<Arc<ProcessModel>> {
        let definition = self
            .storage
            .load_latest(name)
            .await?
            .ok_or_else(|| EngineError::DefinitionNotFound(name.to_string()))?;

        let model = ProcessModel::from_xml(&definition.content, definition.version)?;
        if model.definition_name != name {
            return Err(EngineError::InvalidDefinition(format!(
                "stored under '{}' but declares name '{}'",
                name, model.definition_name
            )));
        }

        Ok(self.replace(Arc::new(model)))
    }

    /// Swap in a freshly built model for its definition name and return the
    /// model now cached. A model older than the cached one never replaces it,
    /// so a slow reload cannot undo a concurrent deploy.
    pub fn replace(&self, model: Arc<ProcessModel>) -> Arc<ProcessModel> {
        let name = model.definition_name.clone();
        let mut cached = Arc::clone(&model);
        self.models.rcu(|current| {
            let mut next = HashMap::clone(current);
            match current.get(&name) {
                Some(existing) if existing.version > model.version => {
                    cached = Arc::clone(existing);
                }
                _ => {
                    cached = Arc::clone(&model);
                    next.insert(name.clone(), Arc::clone(&model));
                }
            }
            next
        });

        if Arc::ptr_eq(&cached, &model) {
            tracing::info!("🔄 Hot-reloaded process model '{}' v{}", name, model.version);
        } else {
            tracing::debug!(
                "⏭️ Kept '{}' v{} over stale v{}",
                name,
                cached.version,
                model.version
            );
        }
        cached
    }

    #[cfg(test)]
    pub fn definition_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.load().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;

    fn definition(name: &str, end_name: &str) -> String {
        format!(
            r#"<Process name="{name}">
                <StartEvent executionId="s"><Outgoing>f</Outgoing></StartEvent>
                <EndEvent executionId="e" name="{end_name}"><Incoming>f</Incoming></EndEvent>
                <SequenceFlow executionId="f" sourceRef="s" targetRef="e"/>
            </Process>"#
        )
    }

    #[tokio::test]
    async fn test_loads_latest_and_hot_swaps() {
        let db = Database::in_memory().await.unwrap();
        let storage = DefinitionStorage::new(db.pool().clone());
        storage.save_definition("p", &definition("p", "old"), "ops", None).await.unwrap();

        let registry = ModelRegistry::new(storage.clone());
        assert!(registry.get("p").is_none());

        let first = registry.get_or_load("p").await.unwrap();
        assert_eq!(first.version, 1);
        assert!(Arc::ptr_eq(&first, &registry.get_or_load("p").await.unwrap()));

        storage.save_definition("p", &definition("p", "new"), "ops", None).await.unwrap();
        let second = registry.reload("p").await.unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.end_events["e"].name, "new");

        // readers holding the old model keep a consistent view
        assert_eq!(first.end_events["e"].name, "old");
        assert_eq!(registry.definition_names(), vec!["p".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_definition() {
        let db = Database::in_memory().await.unwrap();
        let registry = ModelRegistry::new(DefinitionStorage::new(db.pool().clone()));
        let err = registry.get_or_load("nope").await.unwrap_err();
        assert!(matches!(err, EngineError::DefinitionNotFound(_)));
    }

    #[tokio::test]
    async fn test_init_skips_broken_rows() {
        let db = Database::in_memory().await.unwrap();
        let storage = DefinitionStorage::new(db.pool().clone());
        storage.save_definition("good", &definition("good", "e"), "ops", None).await.unwrap();
        storage.save_definition("bad", "<Process", "ops", None).await.unwrap();

        let registry = ModelRegistry::new(storage);
        registry.init_from_storage().await.unwrap();
        assert_eq!(registry.definition_names(), vec!["good".to_string()]);
        assert!(registry.get("bad").is_none());
    }

    #[tokio::test]
    async fn test_stale_model_never_replaces_newer() {
        let db = Database::in_memory().await.unwrap();
        let storage = DefinitionStorage::new(db.pool().clone());
        storage.save_definition("p", &definition("p", "v1"), "ops", None).await.unwrap();
        let registry = ModelRegistry::new(storage);

        let v1 = registry.get_or_load("p").await.unwrap();
        assert_eq!(v1.version, 1);

        // a deploy lands v2 while a reload still holds the v1 it read
        let v2 = Arc::new(ProcessModel::from_xml(&definition("p", "v2"), 2).unwrap());
        assert!(Arc::ptr_eq(&registry.replace(Arc::clone(&v2)), &v2));

        let stale = Arc::new(ProcessModel::from_xml(&definition("p", "v1"), 1).unwrap());
        let cached = registry.replace(stale);
        assert!(Arc::ptr_eq(&cached, &v2));
        assert_eq!(registry.get("p").unwrap().version, 2);
        assert_eq!(registry.get("p").unwrap().end_events["e"].name, "v2");
    }
}
