/// Element handlers
///
/// One handler per element kind. Each handler writes its node row, runs its
/// listeners and then either recurses into its successors, suspends, or ends
/// the instance. Commit points:
/// - task entry commits unless it is part of a parallel fork's fan-out
/// - an unsatisfied join commits its arrival so the next sibling can count it
/// - a fork commits once after its whole fan-out
/// - task completion and the end event always commit
///
/// Everything else leaves the unit open for the caller.

use crate::error::{EngineError, Result};
use crate::process::types::{
    Element, ElementKind, EndEvent, ExclusiveGateway, ParallelGateway, SequenceFlow, StartEvent,
    Task, EXCLUSIVE_GATEWAY, PARALLEL_GATEWAY,
};
use crate::runtime::{
    assignment::AssignmentResolver,
    context::ExecutionContext,
    expression::{resolve_values, Expression},
    join::{decide, JoinDecision},
    listener::{ListenerEvent, ListenerRegistry},
};
use crate::store::{HistoryStore, InstanceStore, NewNode, NodeStore};
use std::{future::Future, pin::Pin, sync::Arc};

/// Boxed step so handlers can recurse through sequence flows
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct ElementExecutor {
    nodes: NodeStore,
    history: HistoryStore,
    instances: InstanceStore,
    listeners: Arc<ListenerRegistry>,
    assignments: AssignmentResolver,
}

impl ElementExecutor {
    pub fn new(
        nodes: NodeStore,
        history: HistoryStore,
        instances: InstanceStore,
        listeners: Arc<ListenerRegistry>,
        assignments: AssignmentResolver,
    ) -> Self {
        Self { nodes, history, instances, listeners, assignments }
    }

    /// Dispatch to the handler for `execution_id`
    pub fn execute_element<'a>(
        &'a self,
        execution_id: &'a str,
        ctx: &'a mut ExecutionContext,
    ) -> StepFuture<'a> {
        Box::pin(async move {
            let model = Arc::clone(&ctx.model);
            let element = model.resolve(execution_id)?;
            tracing::debug!("➡️ Entering {:?} '{}'", element.kind(), execution_id);

            match element {
                Element::Start(start) => self.enter_start(start, ctx).await,
                Element::Task(task) => self.enter_task(task, ctx).await,
                Element::ExclusiveGateway(gateway) => self.enter_exclusive_gateway(gateway, ctx).await,
                Element::ParallelGateway(gateway) => self.enter_parallel_gateway(gateway, ctx).await,
                Element::End(end) => self.enter_end(end, ctx).await,
            }
        })
    }

    /// Follow one sequence flow: check its condition, then enter its target
    pub fn execute_flow<'a>(&'a self, flow_id: &'a str, ctx: &'a mut ExecutionContext) -> StepFuture<'a> {
        Box::pin(async move {
            let model = Arc::clone(&ctx.model);
            let flow = model.flow(flow_id)?;

            if let Some(condition) = &flow.condition {
                if !self.condition_holds(flow, condition, ctx).await? {
                    return Ok(());
                }
            }

            let event = listener_event(ctx, &flow.execution_id, ElementKind::SequenceFlow);
            self.listeners.invoke(flow.listener.as_deref(), &event)?;

            self.execute_element(&flow.target_ref, ctx).await
        })
    }

    /// Evaluate a flow condition. Unresolvable references and non-boolean
    /// results stop this flow only; malformed comparisons are fatal.
    async fn condition_holds(
        &self,
        flow: &SequenceFlow,
        condition: &Expression,
        ctx: &mut ExecutionContext,
    ) -> Result<bool> {
        let instance_id = ctx.instance_id;
        let values = match resolve_values(&self.nodes, ctx.conn().await?, condition, instance_id).await {
            Ok(values) => values,
            Err(EngineError::AttributeNotFound { execution_id, field }) => {
                tracing::warn!(
                    "⚠️ Flow '{}' not taken: {}.{} has no value in instance {}",
                    flow.execution_id,
                    execution_id,
                    field,
                    instance_id
                );
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let outcome = condition.evaluate(&values)?;
        match outcome.as_bool() {
            Ok(result) => {
                tracing::debug!("🔀 Flow '{}': `{}` -> {}", flow.execution_id, condition.source(), result);
                Ok(result)
            }
            Err(type_name) => {
                tracing::warn!(
                    "⚠️ Flow '{}' not taken: `{}` evaluated to non-boolean {} ({})",
                    flow.execution_id,
                    condition.source(),
                    outcome,
                    type_name
                );
                Ok(false)
            }
        }
    }

    /// Insert a bookkeeping row together with its history copy
    async fn record_visit(&self, ctx: &mut ExecutionContext, node: &NewNode) -> Result<i64> {
        let conn = ctx.conn().await?;
        let node_id = self.nodes.insert_node(conn, node).await?;
        self.history.copy_node(conn, node_id, node).await?;
        Ok(node_id)
    }

    async fn enter_start(&self, start: &StartEvent, ctx: &mut ExecutionContext) -> Result<()> {
        let node = NewNode::new(ctx.instance_id, &ctx.definition_name, start.display_name(), &start.execution_id)
            .assignee(&ctx.started_by)
            .output(ctx.payload.clone())
            .finished();
        self.record_visit(ctx, &node).await?;

        ctx.current_element_id = Some(start.execution_id.clone());
        let event = listener_event(ctx, &start.execution_id, ElementKind::Start);
        self.listeners.invoke(start.listener.as_deref(), &event)?;

        tracing::info!("🚀 Instance {} started at '{}'", ctx.instance_id, start.execution_id);
        self.execute_flow(&start.outgoing, ctx).await
    }

    /// Create the pending task row and suspend
    async fn enter_task(&self, task: &Task, ctx: &mut ExecutionContext) -> Result<()> {
        let assignee = self.assignments.resolve(&task.assignee_type, &task.assignee_key);
        let node = NewNode::new(ctx.instance_id, &ctx.definition_name, task.display_name(), &task.execution_id)
            .previous(ctx.current_element_id.clone())
            .assignee(assignee)
            .task();

        let node_id = self.nodes.insert_node(ctx.conn().await?, &node).await?;
        tracing::info!(
            "📋 Task '{}' (row {}) waiting for {}",
            task.execution_id,
            node_id,
            node.assignee
        );

        // a fork commits its whole fan-out at once
        if !ctx.predecessor_is_parallel_gateway() {
            ctx.commit().await?;
        }
        Ok(())
    }

    /// Resume a suspended task with the caller's output and continue downstream
    pub async fn complete_task(&self, task: &Task, node_id: i64, ctx: &mut ExecutionContext) -> Result<()> {
        let output = ctx.payload.clone();
        let conn = ctx.conn().await?;
        if !self.nodes.complete_node(conn, node_id, &output).await? {
            return Err(EngineError::TaskAlreadyCompleted(node_id));
        }
        self.history.copy_node_by_id(conn, node_id).await?;

        ctx.current_element_id = Some(task.execution_id.clone());
        let event = listener_event(ctx, &task.execution_id, ElementKind::Task);
        self.listeners.invoke(task.listener.as_deref(), &event)?;

        tracing::info!("✅ Task '{}' (row {}) completed", task.execution_id, node_id);

        for flow_id in &task.outgoing {
            ctx.current_element_id = Some(task.execution_id.clone());
            self.execute_flow(flow_id, ctx).await?;
        }

        ctx.commit().await
    }

    /// Offer the token to every outgoing flow; each flow's condition decides
    async fn enter_exclusive_gateway(&self, gateway: &ExclusiveGateway, ctx: &mut ExecutionContext) -> Result<()> {
        let node = NewNode::new(ctx.instance_id, &ctx.definition_name, EXCLUSIVE_GATEWAY, &gateway.execution_id)
            .previous(ctx.current_element_id.clone())
            .finished();
        self.record_visit(ctx, &node).await?;

        let event = listener_event(ctx, &gateway.execution_id, ElementKind::ExclusiveGateway);
        self.listeners.invoke(gateway.listener.as_deref(), &event)?;

        for flow_id in &gateway.outgoing {
            ctx.current_element_id = Some(gateway.execution_id.clone());
            self.execute_flow(flow_id, ctx).await?;
        }
        Ok(())
    }

    /// Record this arrival, then fork once every sibling of the round is in
    async fn enter_parallel_gateway(&self, gateway: &ParallelGateway, ctx: &mut ExecutionContext) -> Result<()> {
        let instance_id = ctx.instance_id;
        let node = NewNode::new(instance_id, &ctx.definition_name, PARALLEL_GATEWAY, &gateway.execution_id)
            .previous(ctx.current_element_id.clone())
            .finished();
        self.record_visit(ctx, &node).await?;

        // the unit holds the writer lock, so no sibling can insert between our insert and this count
        let arrived = self
            .nodes
            .count_arrivals(ctx.conn().await?, instance_id, &gateway.execution_id)
            .await?;

        let event = listener_event(ctx, &gateway.execution_id, ElementKind::ParallelGateway);
        self.listeners.invoke(gateway.listener.as_deref(), &event)?;

        match decide(arrived, gateway.incoming.len()) {
            JoinDecision::Wait => {
                tracing::info!(
                    "⏳ Gateway '{}' in instance {}: {} of {} arrived",
                    gateway.execution_id,
                    instance_id,
                    arrived,
                    gateway.incoming.len()
                );
                ctx.commit().await
            }
            JoinDecision::Fire => {
                tracing::info!(
                    "🔱 Gateway '{}' in instance {} fires ({} arrivals), forking {} flows",
                    gateway.execution_id,
                    instance_id,
                    arrived,
                    gateway.outgoing.len()
                );
                self.fork(gateway, ctx).await
            }
        }
    }

    async fn fork(&self, gateway: &ParallelGateway, ctx: &mut ExecutionContext) -> Result<()> {
        for flow_id in &gateway.outgoing {
            ctx.current_element_id = Some(gateway.execution_id.clone());
            self.execute_flow(flow_id, ctx).await?;
        }
        ctx.commit().await
    }

    async fn enter_end(&self, end: &EndEvent, ctx: &mut ExecutionContext) -> Result<()> {
        let instance_id = ctx.instance_id;
        let node = NewNode::new(instance_id, &ctx.definition_name, end.display_name(), &end.execution_id)
            .previous(ctx.current_element_id.clone())
            .finished();
        self.record_visit(ctx, &node).await?;

        let conn = ctx.conn().await?;
        if !self.instances.mark_completed(conn, instance_id).await? {
            tracing::warn!("⚠️ Instance {} reached '{}' but was not running", instance_id, end.execution_id);
        }
        let purged = self.nodes.delete_all_nodes_for_instance(conn, instance_id).await?;

        ctx.current_element_id = Some(end.execution_id.clone());
        let event = listener_event(ctx, &end.execution_id, ElementKind::End);
        self.listeners.invoke(end.listener.as_deref(), &event)?;

        ctx.commit().await?;
        tracing::info!("🏁 Instance {} completed at '{}' ({} runtime rows purged)", instance_id, end.execution_id, purged);
        Ok(())
    }
}

fn listener_event(ctx: &ExecutionContext, execution_id: &str, kind: ElementKind) -> ListenerEvent {
    ListenerEvent {
        definition_name: ctx.definition_name.clone(),
        instance_id: ctx.instance_id,
        execution_id: execution_id.to_string(),
        kind,
        previous_execution_id: ctx.current_element_id.clone(),
        payload: ctx.payload.clone(),
    }
}
