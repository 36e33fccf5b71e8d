/// Process engine facade
///
/// Entry points for deploying definitions, starting instances and completing
/// tasks, plus the read-side queries a front end needs. Each traversal entry
/// point owns one `ExecutionContext` and settles it before returning.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::process::{ModelRegistry, ProcessDefinition, ProcessModel};
use crate::runtime::{
    assignment::{AssignmentResolver, IdentityDirectory},
    context::ExecutionContext,
    executor::ElementExecutor,
    listener::ListenerRegistry,
};
use crate::store::{
    Database, HistoricNodeInstance, HistoryStore, InstanceStatus, InstanceStore, NewInstance,
    NodeInstance, NodeStore, ProcessInstance, TaskSummary,
};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

/// Result of a successful deploy
#[derive(Debug, Clone, Serialize)]
pub struct DeployedDefinition {
    pub id: i64,
    pub name: String,
    pub version: i64,
}

/// A task row together with what a front end needs to render it
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    pub task: NodeInstance,
    pub business_key: String,
    pub form_data: Option<String>,
}

#[derive(Debug)]
pub struct ProcessEngine {
    pool: SqlitePool,
    registry: Arc<ModelRegistry>,
    listeners: Arc<ListenerRegistry>,
    nodes: NodeStore,
    history: HistoryStore,
    instances: InstanceStore,
    default_assignee: String,
    executor: ElementExecutor,
}

/// Blank payloads become `{}`; anything else must be valid JSON
fn normalize_payload(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok("{}".to_string());
    }
    serde_json::from_str::<serde_json::Value>(trimmed)?;
    Ok(trimmed.to_string())
}

impl ProcessEngine {
    pub fn new(
        database: &Database,
        registry: Arc<ModelRegistry>,
        listeners: ListenerRegistry,
        config: &EngineConfig,
    ) -> Self {
        let pool = database.pool().clone();
        let listeners = Arc::new(listeners);
        let nodes = NodeStore::new(pool.clone());
        let history = HistoryStore::new(pool.clone());
        let instances = InstanceStore::new(pool.clone());
        let executor = ElementExecutor::new(
            nodes.clone(),
            history.clone(),
            instances.clone(),
            Arc::clone(&listeners),
            AssignmentResolver::new(Arc::new(IdentityDirectory), config.default_assignee.clone()),
        );

        Self {
            pool,
            registry,
            listeners,
            nodes,
            history,
            instances,
            default_assignee: config.default_assignee.clone(),
            executor,
        }
    }

    /// Use `directory` for `ByParentCompany` task assignment
    #[cfg(test)]
    pub fn with_company_directory(
        mut self,
        directory: Arc<dyn crate::runtime::assignment::CompanyDirectory>,
    ) -> Self {
        self.executor = ElementExecutor::new(
            self.nodes.clone(),
            self.history.clone(),
            self.instances.clone(),
            Arc::clone(&self.listeners),
            AssignmentResolver::new(directory, self.default_assignee.clone()),
        );
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Validate, store as the next version, and hot-swap the cached model
    pub async fn deploy_definition(
        &self,
        xml: &str,
        created_by: &str,
        description: Option<&str>,
    ) -> Result<DeployedDefinition> {
        let mut model = ProcessModel::from_xml(xml, 0)?;
        let listener_names = model.listener_names();
        self.listeners.validate(listener_names.iter().map(String::as_str))?;

        let (id, version) = self
            .registry
            .storage()
            .save_definition(&model.definition_name, xml, created_by, description)
            .await?;
        model.version = version;

        let deployed = DeployedDefinition { id, name: model.definition_name.clone(), version };
        self.registry.replace(Arc::new(model));

        tracing::info!("📦 Deployed '{}' v{} by {}", deployed.name, deployed.version, created_by);
        Ok(deployed)
    }

    /// Latest stored version of a definition
    pub async fn definition(&self, name: &str) -> Result<ProcessDefinition> {
        self.registry
            .storage()
            .load_latest(name)
            .await?
            .ok_or_else(|| EngineError::DefinitionNotFound(name.to_string()))
    }

    /// A specific stored version of a definition
    pub async fn definition_version(&self, name: &str, version: i64) -> Result<ProcessDefinition> {
        self.registry
            .storage()
            .get_by_name_and_version(name, version)
            .await?
            .ok_or_else(|| EngineError::DefinitionNotFound(format!("{} v{}", name, version)))
    }

    /// Create an instance and run it from its start event to the first
    /// suspension point. Returns the new instance id.
    pub async fn start_instance(
        &self,
        definition_name: &str,
        business_key: &str,
        created_by: &str,
        form_json: &str,
    ) -> Result<i64> {
        let model = self.registry.get_or_load(definition_name).await?;
        let start_id = model.start_event()?.execution_id.clone();
        let payload = normalize_payload(form_json)?;

        let mut ctx = ExecutionContext::new(model, self.pool.clone());
        ctx.business_key = business_key.to_string();
        ctx.started_by = created_by.to_string();
        ctx.payload = payload;

        tracing::info!("🚀 Starting '{}' v{} for '{}' by {}", ctx.definition_name, ctx.version, business_key, created_by);

        let result = self.run_start(&mut ctx, &start_id).await;
        ctx.finish(result).await
    }

    async fn run_start(&self, ctx: &mut ExecutionContext, start_id: &str) -> Result<i64> {
        let (definition_name, business_key, created_by) =
            (ctx.definition_name.clone(), ctx.business_key.clone(), ctx.started_by.clone());
        let instance = NewInstance {
            definition_name: &definition_name,
            version: ctx.version,
            business_key: &business_key,
            created_by: &created_by,
            start_time: ctx.start_time,
        };
        // the instance row is part of the first unit, so a failed start leaves nothing behind
        let instance_id = self.instances.create_instance(ctx.conn().await?, &instance).await?;
        ctx.instance_id = instance_id;

        self.executor.execute_element(start_id, ctx).await?;
        Ok(instance_id)
    }

    /// Complete a pending task with `output_json` and continue the instance
    pub async fn complete_task(&self, task_id: i64, output_json: &str, acting_user: &str) -> Result<()> {
        let node = match self.nodes.get_node(task_id).await? {
            Some(node) if node.is_task => node,
            Some(_) => return Err(EngineError::TaskNotFound(task_id)),
            // an ended instance has purged its runtime rows; history still knows the task
            None => {
                return Err(match self.history.get_node(task_id).await? {
                    Some(row) if row.is_task && row.output_data.is_some() => {
                        EngineError::TaskAlreadyCompleted(task_id)
                    }
                    _ => EngineError::TaskNotFound(task_id),
                });
            }
        };

        if node.output_data.is_some() {
            return Err(EngineError::TaskAlreadyCompleted(task_id));
        }
        if node.assignee != acting_user {
            return Err(EngineError::NotAssignee { task_id, user: acting_user.to_string() });
        }

        let instance = self.instance(node.instance_id).await?;
        let model = self.registry.get_or_load(&node.definition_name).await?;
        if model.version != instance.version {
            tracing::warn!(
                "⚠️ Instance {} was started on '{}' v{} but continues on cached v{}",
                instance.id,
                instance.definition_name,
                instance.version,
                model.version
            );
        }
        let payload = normalize_payload(output_json)?;

        let mut ctx = ExecutionContext::new(Arc::clone(&model), self.pool.clone());
        ctx.instance_id = instance.id;
        ctx.business_key = instance.business_key;
        ctx.started_by = instance.created_by;
        ctx.start_time = instance.start_time;
        ctx.payload = payload;

        let result = match model.task(&node.execution_id) {
            Ok(task) => self.executor.complete_task(task, task_id, &mut ctx).await,
            Err(e) => Err(e),
        };
        ctx.finish(result).await
    }

    /// Pending tasks assigned to `assignee`, oldest first
    pub async fn pending_tasks_for_assignee(&self, assignee: &str) -> Result<Vec<TaskSummary>> {
        self.nodes.pending_for_assignee(assignee).await
    }

    /// Form schema of a task element
    pub async fn task_form(&self, definition_name: &str, execution_id: &str) -> Result<Option<String>> {
        let model = self.registry.get_or_load(definition_name).await?;
        let form = model.task(execution_id)?.form_data.clone();
        Ok(form)
    }

    /// Form schema shown when starting a new instance
    pub async fn start_form(&self, definition_name: &str) -> Result<Option<String>> {
        let model = self.registry.get_or_load(definition_name).await?;
        let form = model.start_event()?.form_data.clone();
        Ok(form)
    }

    /// Form data of any element that carries one, looked up by execution id
    pub async fn element_form(&self, definition_name: &str, execution_id: &str) -> Result<Option<String>> {
        let model = self.registry.get_or_load(definition_name).await?;
        if let Some(start) = model.start_events.get(execution_id) {
            return Ok(start.form_data.clone());
        }
        Ok(model.task(execution_id)?.form_data.clone())
    }

    pub async fn task_detail(&self, task_id: i64) -> Result<TaskDetail> {
        let task = self
            .nodes
            .get_node(task_id)
            .await?
            .filter(|node| node.is_task)
            .ok_or(EngineError::TaskNotFound(task_id))?;
        let instance = self.instance(task.instance_id).await?;
        let form_data = self
            .registry
            .get_or_load(&task.definition_name)
            .await?
            .tasks
            .get(&task.execution_id)
            .and_then(|t| t.form_data.clone());

        Ok(TaskDetail { task, business_key: instance.business_key, form_data })
    }

    pub async fn instance(&self, instance_id: i64) -> Result<ProcessInstance> {
        self.instances
            .get_instance(instance_id)
            .await?
            .ok_or(EngineError::InstanceNotFound(instance_id))
    }

    pub async fn instance_history(&self, instance_id: i64) -> Result<Vec<HistoricNodeInstance>> {
        self.instance(instance_id).await?;
        self.history.history_for_instance(instance_id).await
    }

    /// Runtime rows still present for an instance; zero once it has ended
    pub async fn count_nodes_for_instance(&self, instance_id: i64) -> Result<i64> {
        self.nodes.count_for_instance(instance_id).await
    }

    pub async fn is_completed(&self, instance_id: i64) -> Result<bool> {
        Ok(self.instance(instance_id).await?.status == InstanceStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::DefinitionStorage;
    use crate::runtime::assignment::CompanyDirectory;

    async fn engine() -> ProcessEngine {
        let db = Database::in_memory().await.unwrap();
        let registry = Arc::new(ModelRegistry::new(DefinitionStorage::new(db.pool().clone())));
        ProcessEngine::new(&db, registry, ListenerRegistry::with_defaults(), &EngineConfig { default_assignee: "sc".into() })
    }

    const STRAIGHT: &str = r#"
        <Process name="straight">
            <StartEvent executionId="s" name="Start"><Outgoing>f1</Outgoing><FormData>{"fields":["amount"]}</FormData></StartEvent>
            <Task executionId="T" name="Check" assigneeType="ByRole" assigneeKey="x">
                <Incoming>f1</Incoming><Outgoing>f2</Outgoing><FormData>{"fields":["ok"]}</FormData>
            </Task>
            <EndEvent executionId="e" name="End"><Incoming>f2</Incoming><Listener>log</Listener></EndEvent>
            <SequenceFlow executionId="f1" sourceRef="s" targetRef="T"/>
            <SequenceFlow executionId="f2" sourceRef="T" targetRef="e"/>
        </Process>
    "#;

    #[tokio::test]
    async fn test_start_suspends_at_task_with_default_assignee() {
        let engine = engine().await;
        let deployed = engine.deploy_definition(STRAIGHT, "ops", None).await.unwrap();
        assert_eq!(deployed.version, 1);

        let id = engine.start_instance("straight", "K-1", "bob", "").await.unwrap();
        let inbox = engine.pending_tasks_for_assignee("sc").await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].instance_id, id);
        assert_eq!(inbox[0].business_key, "K-1");

        let detail = engine.task_detail(inbox[0].id).await.unwrap();
        assert_eq!(detail.form_data.as_deref(), Some(r#"{"fields":["ok"]}"#));
        assert_eq!(detail.task.previous_execution_id.as_deref(), Some("s"));

        engine.complete_task(inbox[0].id, r#"{"ok":true}"#, "sc").await.unwrap();
        assert!(engine.is_completed(id).await.unwrap());
        assert_eq!(engine.count_nodes_for_instance(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_forms() {
        let engine = engine().await;
        engine.deploy_definition(STRAIGHT, "ops", None).await.unwrap();

        assert_eq!(engine.start_form("straight").await.unwrap().as_deref(), Some(r#"{"fields":["amount"]}"#));
        assert_eq!(engine.task_form("straight", "T").await.unwrap().as_deref(), Some(r#"{"fields":["ok"]}"#));
        assert_eq!(engine.element_form("straight", "s").await.unwrap().as_deref(), Some(r#"{"fields":["amount"]}"#));
        assert!(matches!(engine.task_form("straight", "e").await, Err(EngineError::UnknownElement(_))));
    }

    #[tokio::test]
    async fn test_invalid_start_form_leaves_nothing_behind() {
        let engine = engine().await;
        engine.deploy_definition(STRAIGHT, "ops", None).await.unwrap();

        let err = engine.start_instance("straight", "K-2", "bob", "{not json").await.unwrap_err();
        assert!(matches!(err, EngineError::Serialization(_)));
        assert!(matches!(engine.instance(1).await, Err(EngineError::InstanceNotFound(1))));
    }

    #[tokio::test]
    async fn test_deploy_rejects_unregistered_listener() {
        let engine = engine().await;
        let xml = STRAIGHT.replace("<Listener>log</Listener>", "<Listener>log,mailer</Listener>");
        let err = engine.deploy_definition(&xml, "ops", None).await.unwrap_err();
        assert!(matches!(err, EngineError::ListenerNotRegistered(ref n) if n == "mailer"));
        assert!(engine.definition("straight").await.is_err());
    }

    struct HoldingDirectory;

    impl CompanyDirectory for HoldingDirectory {
        fn parent_company(&self, key: &str) -> String {
            format!("{}-holding", key)
        }
    }

    #[tokio::test]
    async fn test_parent_company_assignment_uses_directory() {
        let engine = engine().await.with_company_directory(Arc::new(HoldingDirectory));
        let xml = STRAIGHT.replace(r#"assigneeType="ByRole" assigneeKey="x""#, r#"assigneeType="ByParentCompany" assigneeKey="acme""#);
        engine.deploy_definition(&xml, "ops", None).await.unwrap();
        engine.start_instance("straight", "K-3", "bob", "{}").await.unwrap();

        assert_eq!(engine.pending_tasks_for_assignee("acme-holding").await.unwrap().len(), 1);
        assert!(engine.pending_tasks_for_assignee("sc").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_definition_versions() {
        let engine = engine().await;
        engine.deploy_definition(STRAIGHT, "ops", None).await.unwrap();
        engine.deploy_definition(STRAIGHT, "ops", Some("again")).await.unwrap();

        assert_eq!(engine.definition_version("straight", 1).await.unwrap().version, 1);
        assert_eq!(engine.definition("straight").await.unwrap().description.as_deref(), Some("again"));
        assert!(matches!(
            engine.definition_version("straight", 3).await,
            Err(EngineError::DefinitionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_definition_and_task() {
        let engine = engine().await;
        assert!(matches!(
            engine.start_instance("ghost", "k", "u", "{}").await,
            Err(EngineError::DefinitionNotFound(_))
        ));
        assert!(matches!(engine.complete_task(99, "{}", "u").await, Err(EngineError::TaskNotFound(99))));
    }
}
