mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{engine, APPROVAL_XML};
use procweave::server::create_router;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

#[tokio::test]
async fn health_check() {
    let (_dir, engine) = engine().await;
    let app = create_router(engine);
    let (status, body) = call(&app, "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn approval_lifecycle_over_http() {
    let (_dir, engine) = engine().await;
    let app = create_router(engine);

    let (status, deployed) = call(
        &app,
        "POST",
        "/api/definitions",
        Some(json!({ "content": APPROVAL_XML, "created_by": "ops" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(deployed["version"], 1);

    let (status, form) = call(&app, "GET", "/api/definitions/approval/forms/A", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(form["form_data"], r#"{"fields":["decision"]}"#);

    let (status, started) = call(
        &app,
        "POST",
        "/api/instances",
        Some(json!({
            "definition_name": "approval",
            "business_key": "PO-42",
            "created_by": "requester",
            "form_data": { "amount": 99 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let instance_id = started["instance_id"].as_i64().unwrap();

    let (status, inbox) = call(&app, "GET", "/api/tasks?assignee=alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inbox.as_array().unwrap().len(), 1);
    assert_eq!(inbox[0]["business_key"], "PO-42");
    let task_id = inbox[0]["id"].as_i64().unwrap();

    let complete_uri = format!("/api/tasks/{task_id}/complete");
    let (status, _) = call(
        &app,
        "POST",
        &complete_uri,
        Some(json!({ "user": "bob", "output": { "decision": "no" } })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        "POST",
        &complete_uri,
        Some(json!({ "user": "alice", "output": { "decision": "no" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &app,
        "POST",
        &complete_uri,
        Some(json!({ "user": "alice", "output": { "decision": "yes" } })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, instance) = call(&app, "GET", &format!("/api/instances/{instance_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(instance["status"], "running");

    let (status, history) = call(&app, "GET", &format!("/api/instances/{instance_id}/history"), None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["element_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Start", "Approve", "exclusiveGateway"]);

    let (status, task) = call(&app, "GET", &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["task"]["output_data"], r#"{"decision":"no"}"#);
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let (_dir, engine) = engine().await;
    let app = create_router(engine);

    let (status, body) = call(
        &app,
        "POST",
        "/api/definitions",
        Some(json!({ "content": "<Process name=", "created_by": "ops" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("parse"));

    let (status, _) = call(&app, "GET", "/api/definitions/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, "GET", "/api/instances/404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, "GET", "/api/tasks/404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        "POST",
        "/api/instances",
        Some(json!({ "definition_name": "ghost", "business_key": "k", "created_by": "u" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn completing_a_task_of_an_ended_instance_conflicts() {
    let (_dir, engine) = engine().await;
    let app = create_router(engine);

    let (status, _) = call(
        &app,
        "POST",
        "/api/definitions",
        Some(json!({ "content": APPROVAL_XML, "created_by": "ops" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, started) = call(
        &app,
        "POST",
        "/api/instances",
        Some(json!({ "definition_name": "approval", "business_key": "PO-43", "created_by": "requester" })),
    )
    .await;
    let instance_id = started["instance_id"].as_i64().unwrap();

    let (_, inbox) = call(&app, "GET", "/api/tasks?assignee=alice", None).await;
    let complete_uri = format!("/api/tasks/{}/complete", inbox[0]["id"].as_i64().unwrap());
    let body = json!({ "user": "alice", "output": { "decision": "yes" } });

    let (status, _) = call(&app, "POST", &complete_uri, Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (_, instance) = call(&app, "GET", &format!("/api/instances/{instance_id}"), None).await;
    assert_eq!(instance["status"], "completed");

    // runtime rows are gone, the history still marks the task as done
    let (status, _) = call(&app, "POST", &complete_uri, Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &app,
        "POST",
        "/api/tasks/9999/complete",
        Some(json!({ "user": "alice", "output": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn definition_versions_are_addressable() {
    let (_dir, engine) = engine().await;
    let app = create_router(engine);

    for assignee in ["alice", "carol"] {
        let content = APPROVAL_XML.replace("assigneeKey=\"alice\"", &format!("assigneeKey=\"{assignee}\""));
        let (status, _) = call(
            &app,
            "POST",
            "/api/definitions",
            Some(json!({ "content": content, "created_by": "ops" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, latest) = call(&app, "GET", "/api/definitions/approval", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["version"], 2);

    let (status, first) = call(&app, "GET", "/api/definitions/approval/versions/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["version"], 1);
    assert!(first["content"].as_str().unwrap().contains("assigneeKey=\"alice\""));

    let (status, _) = call(&app, "GET", "/api/definitions/approval/versions/3", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
