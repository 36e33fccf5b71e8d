#![allow(dead_code)]

use procweave::{
    config::{Config, DatabaseConfig},
    server::create_engine,
    Database, ListenerRegistry, ProcessEngine,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Approval with a rework loop-back:
/// start -> Approve(alice) -> X -> End            when A.decision == 'yes'
///                              -> Rework(bob) -> End  when A.decision == 'no'
pub const APPROVAL_XML: &str = r#"
<Process name="approval">
    <StartEvent executionId="s" name="Start" x="10" y="10">
        <Outgoing>f1</Outgoing>
        <FormData>{"fields":["amount"]}</FormData>
    </StartEvent>
    <Task executionId="A" name="Approve" assigneeType="ByAssigneeName" assigneeKey="alice">
        <Incoming>f1</Incoming>
        <Outgoing>f2</Outgoing>
        <FormData>{"fields":["decision"]}</FormData>
    </Task>
    <ExclusiveGateway executionId="X">
        <Incoming>f2</Incoming>
        <Outgoing>f3</Outgoing>
        <Outgoing>f4</Outgoing>
    </ExclusiveGateway>
    <Task executionId="W" name="Rework" assigneeType="ByAssigneeName" assigneeKey="bob">
        <Incoming>f4</Incoming>
        <Outgoing>f5</Outgoing>
    </Task>
    <EndEvent executionId="end" name="End">
        <Incoming>f3</Incoming>
        <Incoming>f5</Incoming>
    </EndEvent>
    <SequenceFlow executionId="f1" sourceRef="s" targetRef="A"/>
    <SequenceFlow executionId="f2" sourceRef="A" targetRef="X"/>
    <SequenceFlow executionId="f3" sourceRef="X" targetRef="end">
        <ConditionExpression>A.decision == 'yes'</ConditionExpression>
    </SequenceFlow>
    <SequenceFlow executionId="f4" sourceRef="X" targetRef="W">
        <ConditionExpression>A.decision == 'no'</ConditionExpression>
    </SequenceFlow>
    <SequenceFlow executionId="f5" sourceRef="W" targetRef="end"/>
</Process>
"#;

/// Engine over a fresh on-disk database; keep the `TempDir` alive for the test
pub async fn engine_with(listeners: ListenerRegistry) -> (TempDir, Arc<ProcessEngine>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config {
        database: DatabaseConfig::for_path(&dir.path().join("procweave.db")),
        ..Config::default()
    };
    let database = Database::connect(&config.database).await.expect("database");
    let engine = create_engine(&database, &config, listeners).await.expect("engine");
    (dir, engine)
}

pub async fn engine() -> (TempDir, Arc<ProcessEngine>) {
    engine_with(ListenerRegistry::with_defaults()).await
}

/// The single pending task of `assignee`, by row id
pub async fn only_task(engine: &ProcessEngine, assignee: &str) -> i64 {
    let tasks = engine.pending_tasks_for_assignee(assignee).await.unwrap();
    assert_eq!(tasks.len(), 1, "expected exactly one task for {assignee}, got {tasks:?}");
    tasks[0].id
}

/// Element names of an instance's audit trail, in visit order
pub async fn trail(engine: &ProcessEngine, instance_id: i64) -> Vec<String> {
    engine
        .instance_history(instance_id)
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.element_name)
        .collect()
}
