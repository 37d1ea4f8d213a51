use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

mod axum_example {
    #![allow(dead_code)]
    include!(concat!(env!("CARGO_MANIFEST_DIR"), "/demos/axum.rs"));
}

fn axum_app() -> Router {
    axum_example::app()
}

async fn post_policy(uri: &str, policy: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "text/plain")
        .body(Body::from(policy.to_string()))
        .unwrap();

    let response = axum_app().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn graph_returns_hierarchy_and_buckets() {
    let (status, graph) = post_policy(
        "/graph",
        "p, alice, data1, read\np, data2_admin, data2, write\ng, alice, data2_admin",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(graph["connections"]["p"].as_array().map(Vec::len), Some(2));
    assert_eq!(graph["connections"]["g"].as_array().map(Vec::len), Some(1));

    let admin = graph["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|node| node["name"] == "data2_admin")
        .unwrap();
    assert_eq!(admin["type"], "role");
    assert_eq!(admin["level"], 0);
    assert_eq!(admin["children"][0]["name"], "alice");
    assert_eq!(admin["children"][0]["level"], 1);
}

#[tokio::test]
async fn graph_reports_skipped_lines() {
    let (status, graph) = post_policy("/graph", "g, alice, admin\np, onlyTwoFields").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(graph["relations"].as_array().map(Vec::len), Some(1));
    assert_eq!(graph["skipped"][0]["line"], 2);
    assert_eq!(graph["skipped"][0]["reason"]["kind"], "missingFields");
}

#[tokio::test]
async fn graph_rejects_text_without_rules() {
    let (status, graph) = post_policy("/graph", "q, not, a, rule").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(graph["nodes"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn graph_accepts_empty_body() {
    let (status, graph) = post_policy("/graph", "").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(graph["relations"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn graph_uses_configured_classifier() {
    let (_, graph) = post_policy("/graph", "p, role:auditor, logs, read").await;

    let auditor = graph["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|node| node["name"] == "role:auditor")
        .unwrap();
    assert_eq!(auditor["type"], "role");
}

#[tokio::test]
async fn cycles_lists_role_loops() {
    let (status, cycles) = post_policy("/cycles", "g, a, b\ng, b, c\ng, c, a").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(cycles, serde_json::json!([["a", "b", "c"]]));
}

#[tokio::test]
async fn cycles_empty_for_acyclic_policy() {
    let (_, cycles) = post_policy("/cycles", "g, alice, admin\ng, admin, root").await;

    assert_eq!(cycles, serde_json::json!([]));
}
