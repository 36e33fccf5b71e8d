/// Process element type definitions
///
/// Defines the five executable element kinds plus sequence flows. The structs are
/// deserialized straight from the XML definition source and then compiled into a
/// `ProcessModel`; layout attributes (x, y, w, h) are accepted and ignored.

use crate::runtime::expression::Expression;
use serde::{Deserialize, Serialize};

/// Node name recorded for parallel gateway visits
pub const PARALLEL_GATEWAY: &str = "parallelGateway";
/// Node name recorded for exclusive gateway visits
pub const EXCLUSIVE_GATEWAY: &str = "exclusiveGateway";
/// Assignee recorded on engine-owned bookkeeping rows
pub const SYSTEM_USER_NOBODY: &str = "nobody";

/// Parsed `<Process>` document before compilation
///
/// Elements may appear in any order in the source; each kind is collected
/// into its own list.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessDocument {
    /// Process definition name, the cache key for the compiled model
    #[serde(rename = "@name")]
    pub name: String,
    /// Exactly one is required
    #[serde(rename = "StartEvent", default)]
    pub start_events: Vec<StartEvent>,
    #[serde(rename = "Task", default)]
    pub tasks: Vec<Task>,
    #[serde(rename = "ParallelGateway", default)]
    pub parallel_gateways: Vec<ParallelGateway>,
    #[serde(rename = "ExclusiveGateway", default)]
    pub exclusive_gateways: Vec<ExclusiveGateway>,
    /// At least one is required
    #[serde(rename = "EndEvent", default)]
    pub end_events: Vec<EndEvent>,
    #[serde(rename = "SequenceFlow", default)]
    pub sequence_flows: Vec<SequenceFlow>,
}

/// Entry point of every instance
#[derive(Debug, Clone, Deserialize)]
pub struct StartEvent {
    /// Unique id within the definition; conditions address outputs by it
    #[serde(rename = "@executionId")]
    pub execution_id: String,
    /// Display name recorded in the audit trail; falls back to the id
    #[serde(rename = "@name", default)]
    pub name: String,
    /// Single outgoing sequence flow id
    #[serde(rename = "Outgoing", default)]
    pub outgoing: String,
    /// Form schema shown when a new instance is started
    #[serde(rename = "FormData", default)]
    pub form_data: Option<String>,
    /// Comma-separated listener names
    #[serde(rename = "Listener", default)]
    pub listener: Option<String>,
}

/// Human task; suspends the traversal until completed
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    #[serde(rename = "@executionId")]
    pub execution_id: String,
    #[serde(rename = "@name", default)]
    pub name: String,
    /// How `assignee_key` is turned into a concrete assignee
    /// (`ByAssigneeName`, `ByParentCompany`; anything else gets the engine default)
    #[serde(rename = "@assigneeType", default)]
    pub assignee_type: String,
    /// User name, or company key for `ByParentCompany`
    #[serde(rename = "@assigneeKey", default)]
    pub assignee_key: String,
    #[serde(rename = "Incoming", default)]
    pub incoming: Vec<String>,
    /// Followed in document order once the task completes
    #[serde(rename = "Outgoing", default)]
    pub outgoing: Vec<String>,
    /// Opaque form schema for the task's UI, returned verbatim
    #[serde(rename = "FormData", default)]
    pub form_data: Option<String>,
    /// Run after the task's output is stored
    #[serde(rename = "Listener", default)]
    pub listener: Option<String>,
}

/// Join/fork synchronization point
#[derive(Debug, Clone, Deserialize)]
pub struct ParallelGateway {
    #[serde(rename = "@executionId")]
    pub execution_id: String,
    /// Number of arrivals that complete one round of the join
    #[serde(rename = "Incoming", default)]
    pub incoming: Vec<String>,
    #[serde(rename = "Outgoing", default)]
    pub outgoing: Vec<String>,
    #[serde(rename = "Listener", default)]
    pub listener: Option<String>,
}

/// Condition-driven branch point
///
/// Every outgoing flow is offered the token; each flow's own condition decides
/// whether it proceeds, so more than one branch may fire.
#[derive(Debug, Clone, Deserialize)]
pub struct ExclusiveGateway {
    #[serde(rename = "@executionId")]
    pub execution_id: String,
    #[serde(rename = "Incoming", default)]
    pub incoming: Vec<String>,
    #[serde(rename = "Outgoing", default)]
    pub outgoing: Vec<String>,
    #[serde(rename = "Listener", default)]
    pub listener: Option<String>,
}

/// Terminal element; completes the instance
#[derive(Debug, Clone, Deserialize)]
pub struct EndEvent {
    #[serde(rename = "@executionId")]
    pub execution_id: String,
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "Incoming", default)]
    pub incoming: Vec<String>,
    #[serde(rename = "Listener", default)]
    pub listener: Option<String>,
}

/// Directed edge between two executable elements
#[derive(Debug, Clone, Deserialize)]
pub struct SequenceFlow {
    #[serde(rename = "@executionId")]
    pub execution_id: String,
    /// Element this flow leaves; must list the flow as outgoing
    #[serde(rename = "@sourceRef")]
    pub source_ref: String,
    /// Element entered when the flow is taken
    #[serde(rename = "@targetRef")]
    pub target_ref: String,
    /// Raw condition text, e.g. `A.decision == 'yes' && s.amount >= 100`;
    /// blank means "always proceed"
    #[serde(rename = "ConditionExpression", default)]
    pub condition_expression: Option<String>,
    /// Run when the flow is taken, before its target is entered
    #[serde(rename = "Listener", default)]
    pub listener: Option<String>,
    /// Compiled condition, filled in when the model is built
    #[serde(skip)]
    pub condition: Option<Expression>,
}

impl SequenceFlow {
    /// Condition text, or `None` when blank
    pub fn condition_text(&self) -> Option<&str> {
        self.condition_expression
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

impl StartEvent {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.execution_id } else { &self.name }
    }
}

impl Task {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.execution_id } else { &self.name }
    }
}

impl EndEvent {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.execution_id } else { &self.name }
    }
}

/// Kind tag for every id in a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementKind {
    Start,
    Task,
    ExclusiveGateway,
    ParallelGateway,
    End,
    SequenceFlow,
}

/// Borrowed view of one executable element
///
/// Closed over the five kinds the engine models; dispatch is an exhaustive match.
#[derive(Debug, Clone, Copy)]
pub enum Element<'a> {
    Start(&'a StartEvent),
    Task(&'a Task),
    ExclusiveGateway(&'a ExclusiveGateway),
    ParallelGateway(&'a ParallelGateway),
    End(&'a EndEvent),
}

impl<'a> Element<'a> {
    pub fn execution_id(&self) -> &'a str {
        match self {
            Element::Start(e) => &e.execution_id,
            Element::Task(e) => &e.execution_id,
            Element::ExclusiveGateway(e) => &e.execution_id,
            Element::ParallelGateway(e) => &e.execution_id,
            Element::End(e) => &e.execution_id,
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Start(_) => ElementKind::Start,
            Element::Task(_) => ElementKind::Task,
            Element::ExclusiveGateway(_) => ElementKind::ExclusiveGateway,
            Element::ParallelGateway(_) => ElementKind::ParallelGateway,
            Element::End(_) => ElementKind::End,
        }
    }

    /// Incoming flow ids (empty for the start event)
    pub fn incoming(&self) -> &'a [String] {
        match self {
            Element::Start(_) => &[],
            Element::Task(e) => &e.incoming,
            Element::ExclusiveGateway(e) => &e.incoming,
            Element::ParallelGateway(e) => &e.incoming,
            Element::End(e) => &e.incoming,
        }
    }

    /// Outgoing flow ids (empty for end events)
    pub fn outgoing(&self) -> &'a [String] {
        match self {
            Element::Start(e) => std::slice::from_ref(&e.outgoing),
            Element::Task(e) => &e.outgoing,
            Element::ExclusiveGateway(e) => &e.outgoing,
            Element::ParallelGateway(e) => &e.outgoing,
            Element::End(_) => &[],
        }
    }

    pub fn listener(&self) -> Option<&'a str> {
        match self {
            Element::Start(e) => e.listener.as_deref(),
            Element::Task(e) => e.listener.as_deref(),
            Element::ExclusiveGateway(e) => e.listener.as_deref(),
            Element::ParallelGateway(e) => e.listener.as_deref(),
            Element::End(e) => e.listener.as_deref(),
        }
    }
}
