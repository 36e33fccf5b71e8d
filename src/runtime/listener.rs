/// Named element listeners
///
/// An element's `Listener` text is a comma-separated list of names. Each name
/// must be registered here; listeners run in list order after the element's
/// rows are written, inside the same unit of work, and a failing listener
/// fails the traversal.

use crate::error::{EngineError, Result};
use crate::process::ElementKind;
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};

/// What a listener is told about the step that triggered it
#[derive(Debug, Clone, Serialize)]
pub struct ListenerEvent {
    pub definition_name: String,
    pub instance_id: i64,
    pub execution_id: String,
    pub kind: ElementKind,
    pub previous_execution_id: Option<String>,
    pub payload: String,
}

pub type Listener = Arc<dyn Fn(&ListenerEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: HashMap<String, Listener>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.listeners.keys().collect();
        names.sort();
        f.debug_struct("ListenerRegistry").field("listeners", &names).finish()
    }
}

fn split_names(names: &str) -> impl Iterator<Item = &str> {
    names.split(',').map(str::trim).filter(|name| !name.is_empty())
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `log` listener
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("log", |event: &ListenerEvent| {
            tracing::info!(
                "🔔 [{}#{}] {:?} '{}' reached",
                event.definition_name,
                event.instance_id,
                event.kind,
                event.execution_id
            );
            Ok(())
        });
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, listener: F)
    where
        F: Fn(&ListenerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listeners.insert(name.into(), Arc::new(listener));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.listeners.contains_key(name)
    }

    /// Fail on the first name in `names` that is not registered
    pub fn validate<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for name in names {
            for name in split_names(name) {
                if !self.contains(name) {
                    return Err(EngineError::ListenerNotRegistered(name.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Run every listener named in `names`, in order
    pub fn invoke(&self, names: Option<&str>, event: &ListenerEvent) -> Result<()> {
        let Some(names) = names else {
            return Ok(());
        };

        for name in split_names(names) {
            let listener = self
                .listeners
                .get(name)
                .ok_or_else(|| EngineError::ListenerNotRegistered(name.to_string()))?;
            listener(event).map_err(|e| EngineError::Listener {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn event() -> ListenerEvent {
        ListenerEvent {
            definition_name: "p".into(),
            instance_id: 1,
            execution_id: "A".into(),
            kind: ElementKind::Task,
            previous_execution_id: None,
            payload: "{}".into(),
        }
    }

    #[test]
    fn test_invokes_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::with_defaults();
        for name in ["first", "second"] {
            let calls = Arc::clone(&calls);
            registry.register(name, move |e: &ListenerEvent| {
                calls.lock().unwrap().push(format!("{}:{}", name, e.execution_id));
                Ok(())
            });
        }

        registry.invoke(Some("second, first,log"), &event()).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["second:A", "first:A"]);
        registry.invoke(None, &event()).unwrap();
        registry.invoke(Some(" , "), &event()).unwrap();
    }

    #[test]
    fn test_unknown_and_failing_listeners() {
        let mut registry = ListenerRegistry::new();
        registry.register("boom", |_: &ListenerEvent| Err(anyhow::anyhow!("downstream unavailable")));

        let err = registry.invoke(Some("missing"), &event()).unwrap_err();
        assert!(matches!(err, EngineError::ListenerNotRegistered(ref n) if n == "missing"));

        let err = registry.invoke(Some("boom"), &event()).unwrap_err();
        assert!(err.to_string().contains("downstream unavailable"));

        assert!(registry.validate(["boom"]).is_ok());
        assert!(registry.validate(["boom, nope"]).is_err());
    }
}
