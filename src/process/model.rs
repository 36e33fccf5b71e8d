/// Compiled process graph
///
/// A `ProcessModel` is built once from definition source text and is immutable
/// afterwards. Every id referenced by an element or flow is resolved at build
/// time, so a dangling reference is a load error rather than a runtime one.

use crate::error::{EngineError, Result};
use crate::process::types::{
    Element, ElementKind, EndEvent, ExclusiveGateway, ParallelGateway, ProcessDocument,
    SequenceFlow, StartEvent, Task,
};
use crate::runtime::expression::Expression;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::algo::tarjan_scc;
use petgraph::visit::Bfs;
use std::collections::{HashMap, HashSet};

/// Per-definition lookup tables, keyed by execution id
#[derive(Debug)]
pub struct ProcessModel {
    pub definition_name: String,
    pub version: i64,
    pub start_events: HashMap<String, StartEvent>,
    pub tasks: HashMap<String, Task>,
    pub parallel_gateways: HashMap<String, ParallelGateway>,
    pub exclusive_gateways: HashMap<String, ExclusiveGateway>,
    pub end_events: HashMap<String, EndEvent>,
    pub sequence_flows: HashMap<String, SequenceFlow>,
    /// Unified id -> kind index covering every map above
    kinds: HashMap<String, ElementKind>,
}

/// Parse XML definition source into its raw document form
pub fn parse_definition(xml: &str) -> Result<ProcessDocument> {
    quick_xml::de::from_str(xml).map_err(|e| EngineError::DefinitionParse(e.to_string()))
}

impl ProcessModel {
    /// Parse and compile definition source text
    pub fn from_xml(xml: &str, version: i64) -> Result<Self> {
        let document = parse_definition(xml)?;
        Self::from_document(document, version)
    }

    /// Compile a parsed document into a validated model
    pub fn from_document(document: ProcessDocument, version: i64) -> Result<Self> {
        tracing::debug!("🏗️ Building process model '{}' v{}", document.name, version);

        if document.name.trim().is_empty() {
            return Err(EngineError::InvalidDefinition("process name is empty".to_string()));
        }

        let mut model = ProcessModel {
            definition_name: document.name,
            version,
            start_events: HashMap::new(),
            tasks: HashMap::new(),
            parallel_gateways: HashMap::new(),
            exclusive_gateways: HashMap::new(),
            end_events: HashMap::new(),
            sequence_flows: HashMap::new(),
            kinds: HashMap::new(),
        };

        for start in document.start_events {
            model.register(&start.execution_id, ElementKind::Start)?;
            model.start_events.insert(start.execution_id.clone(), start);
        }
        for task in document.tasks {
            model.register(&task.execution_id, ElementKind::Task)?;
            model.tasks.insert(task.execution_id.clone(), task);
        }
        for gateway in document.parallel_gateways {
            model.register(&gateway.execution_id, ElementKind::ParallelGateway)?;
            model.parallel_gateways.insert(gateway.execution_id.clone(), gateway);
        }
        for gateway in document.exclusive_gateways {
            model.register(&gateway.execution_id, ElementKind::ExclusiveGateway)?;
            model.exclusive_gateways.insert(gateway.execution_id.clone(), gateway);
        }
        for end in document.end_events {
            model.register(&end.execution_id, ElementKind::End)?;
            model.end_events.insert(end.execution_id.clone(), end);
        }
        for mut flow in document.sequence_flows {
            model.register(&flow.execution_id, ElementKind::SequenceFlow)?;
            if let Some(text) = flow.condition_text() {
                let expression = Expression::parse(text).map_err(|e| {
                    EngineError::InvalidDefinition(format!("flow '{}': {}", flow.execution_id, e))
                })?;
                flow.condition = Some(expression);
            }
            model.sequence_flows.insert(flow.execution_id.clone(), flow);
        }

        model.validate()?;
        {
            let (graph, index) = model.graph();
            model.reject_taskless_cycles(&graph)?;
            model.warn_unreachable(&graph, &index);
        }

        tracing::info!(
            "✅ Process model '{}' v{} compiled: {} tasks, {} gateways, {} flows",
            model.definition_name,
            model.version,
            model.tasks.len(),
            model.parallel_gateways.len() + model.exclusive_gateways.len(),
            model.sequence_flows.len()
        );

        Ok(model)
    }

    fn register(&mut self, execution_id: &str, kind: ElementKind) -> Result<()> {
        if execution_id.trim().is_empty() {
            return Err(EngineError::InvalidDefinition(format!("{:?} without executionId", kind)));
        }
        if self.kinds.insert(execution_id.to_string(), kind).is_some() {
            return Err(EngineError::InvalidDefinition(format!(
                "duplicate executionId '{}'",
                execution_id
            )));
        }
        Ok(())
    }

    /// Resolve an execution id to its executable element
    pub fn resolve(&self, execution_id: &str) -> Result<Element<'_>> {
        let element = match self.kinds.get(execution_id) {
            Some(ElementKind::Start) => self.start_events.get(execution_id).map(Element::Start),
            Some(ElementKind::Task) => self.tasks.get(execution_id).map(Element::Task),
            Some(ElementKind::ExclusiveGateway) => {
                self.exclusive_gateways.get(execution_id).map(Element::ExclusiveGateway)
            }
            Some(ElementKind::ParallelGateway) => {
                self.parallel_gateways.get(execution_id).map(Element::ParallelGateway)
            }
            Some(ElementKind::End) => self.end_events.get(execution_id).map(Element::End),
            Some(ElementKind::SequenceFlow) | None => None,
        };
        element.ok_or_else(|| EngineError::UnknownElement(execution_id.to_string()))
    }

    /// Look up a sequence flow by id
    pub fn flow(&self, execution_id: &str) -> Result<&SequenceFlow> {
        self.sequence_flows
            .get(execution_id)
            .ok_or_else(|| EngineError::UnknownElement(execution_id.to_string()))
    }

    /// Look up a task by id
    pub fn task(&self, execution_id: &str) -> Result<&Task> {
        self.tasks
            .get(execution_id)
            .ok_or_else(|| EngineError::UnknownElement(execution_id.to_string()))
    }

    /// The single start event of this definition
    pub fn start_event(&self) -> Result<&StartEvent> {
        self.start_events
            .values()
            .next()
            .ok_or_else(|| EngineError::InvalidDefinition("no start event".to_string()))
    }

    pub fn is_parallel_gateway(&self, execution_id: &str) -> bool {
        self.parallel_gateways.contains_key(execution_id)
    }

    /// Every executable element, in no particular order
    pub fn elements(&self) -> impl Iterator<Item = Element<'_>> {
        self.start_events
            .values()
            .map(Element::Start)
            .chain(self.tasks.values().map(Element::Task))
            .chain(self.exclusive_gateways.values().map(Element::ExclusiveGateway))
            .chain(self.parallel_gateways.values().map(Element::ParallelGateway))
            .chain(self.end_events.values().map(Element::End))
    }

    /// Every listener name referenced by an element or flow
    pub fn listener_names(&self) -> HashSet<String> {
        self.elements()
            .filter_map(|element| element.listener())
            .chain(self.sequence_flows.values().filter_map(|flow| flow.listener.as_deref()))
            .flat_map(|names| names.split(','))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Check structural invariants: one start event, and every reference resolves
    /// consistently in both directions.
    fn validate(&self) -> Result<()> {
        if self.start_events.len() != 1 {
            return Err(EngineError::InvalidDefinition(format!(
                "expected exactly one start event, found {}",
                self.start_events.len()
            )));
        }

        for element in self.elements() {
            let id = element.execution_id();
            for flow_id in element.outgoing() {
                let flow = self.sequence_flows.get(flow_id).ok_or_else(|| {
                    EngineError::InvalidDefinition(format!(
                        "'{}' references unknown outgoing flow '{}'",
                        id, flow_id
                    ))
                })?;
                if flow.source_ref != id {
                    return Err(EngineError::InvalidDefinition(format!(
                        "flow '{}' is outgoing of '{}' but its sourceRef is '{}'",
                        flow_id, id, flow.source_ref
                    )));
                }
            }
            for flow_id in element.incoming() {
                let flow = self.sequence_flows.get(flow_id).ok_or_else(|| {
                    EngineError::InvalidDefinition(format!(
                        "'{}' references unknown incoming flow '{}'",
                        id, flow_id
                    ))
                })?;
                if flow.target_ref != id {
                    return Err(EngineError::InvalidDefinition(format!(
                        "flow '{}' is incoming of '{}' but its targetRef is '{}'",
                        flow_id, id, flow.target_ref
                    )));
                }
            }
        }

        for flow in self.sequence_flows.values() {
            let source = self.resolve(&flow.source_ref).map_err(|_| {
                EngineError::InvalidDefinition(format!(
                    "flow '{}' has unknown sourceRef '{}'",
                    flow.execution_id, flow.source_ref
                ))
            })?;
            let target = self.resolve(&flow.target_ref).map_err(|_| {
                EngineError::InvalidDefinition(format!(
                    "flow '{}' has unknown targetRef '{}'",
                    flow.execution_id, flow.target_ref
                ))
            })?;
            if !source.outgoing().contains(&flow.execution_id) {
                return Err(EngineError::InvalidDefinition(format!(
                    "flow '{}' is not listed as outgoing of '{}'",
                    flow.execution_id, flow.source_ref
                )));
            }
            // parallel joins count incoming edges, so the declared list must be complete
            if !target.incoming().contains(&flow.execution_id) {
                return Err(EngineError::InvalidDefinition(format!(
                    "flow '{}' is not listed as incoming of '{}'",
                    flow.execution_id, flow.target_ref
                )));
            }
        }

        Ok(())
    }

    /// Element graph with one edge per sequence flow
    fn graph(&self) -> (DiGraph<&str, &str>, HashMap<&str, NodeIndex>) {
        let mut graph: DiGraph<&str, &str> = DiGraph::new();
        let mut index: HashMap<&str, NodeIndex> = HashMap::new();

        for element in self.elements() {
            let id = element.execution_id();
            index.insert(id, graph.add_node(id));
        }
        for flow in self.sequence_flows.values() {
            if let (Some(&from), Some(&to)) =
                (index.get(flow.source_ref.as_str()), index.get(flow.target_ref.as_str()))
            {
                graph.add_edge(from, to, flow.execution_id.as_str());
            }
        }

        (graph, index)
    }

    /// Cycles are legal only when they pass through a task, which suspends the
    /// traversal. A cycle of gateways alone would recurse without end.
    fn reject_taskless_cycles(&self, graph: &DiGraph<&str, &str>) -> Result<()> {
        for component in tarjan_scc(graph) {
            let is_cycle = component.len() > 1
                || component.iter().any(|&node| graph.contains_edge(node, node));
            if !is_cycle || component.iter().any(|&node| self.tasks.contains_key(graph[node])) {
                continue;
            }

            let mut ids: Vec<&str> = component.iter().map(|&node| graph[node]).collect();
            ids.sort_unstable();
            return Err(EngineError::InvalidDefinition(format!(
                "cycle without a task: {}",
                ids.join(" -> ")
            )));
        }
        Ok(())
    }

    /// Log elements that no path from the start event can reach.
    /// Cycles are legal, so this is a BFS rather than a topological sort.
    fn warn_unreachable(&self, graph: &DiGraph<&str, &str>, index: &HashMap<&str, NodeIndex>) {
        let Some(start) = self.start_events.keys().next().and_then(|id| index.get(id.as_str()))
        else {
            return;
        };

        let mut reachable = HashSet::new();
        let mut bfs = Bfs::new(graph, *start);
        while let Some(node) = bfs.next(graph) {
            reachable.insert(node);
        }

        for (id, node) in index {
            if !reachable.contains(node) {
                tracing::warn!(
                    "⚠️ Element '{}' in '{}' is unreachable from the start event",
                    id,
                    self.definition_name
                );
            }
        }
    }
}
