//! HTTP integration tests for the Notegraph REST API
//!
//! Run against an in-memory store, so no database is needed. Requests go
//! through the full axum router with `oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use notegraph_core::NotegraphConfig;
use notegraph_server::http::build_router;
use notegraph_server::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

fn make_state() -> Arc<AppState> {
    Arc::new(AppState::in_memory(NotegraphConfig::default()).unwrap())
}

async fn call(state: &Arc<AppState>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = build_router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn create(state: &Arc<AppState>, title: &str, content: &str, auto_link: bool) -> String {
    let (status, body) = call(
        state,
        "POST",
        "/notes",
        Some(json!({"title": title, "content": content, "auto_link": auto_link})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {:?}", body);
    body["note"]["id"].as_str().unwrap().to_string()
}

// ===========================================================================
// TEST 1: GET /version and /health
// ===========================================================================
#[tokio::test]
async fn test_version_and_health_endpoints() {
    let state = make_state();
    let (status, body) = call(&state, "GET", "/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["protocol"], "notegraph/1");

    let (status, body) = call(&state, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "memory");
}

// ===========================================================================
// TEST 2: GET /profiles lists every preset
// ===========================================================================
#[tokio::test]
async fn test_profiles_endpoint_lists_presets() {
    let (status, body) = call(&make_state(), "GET", "/profiles", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["default"], "default");
    let names: Vec<&str> = body["profiles"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    for expected in [
        "default",
        "semantic_focused",
        "keyword_focused",
        "strict",
        "permissive",
        "academic",
        "creative",
    ] {
        assert!(names.contains(&expected), "missing profile {}", expected);
    }
}

// ===========================================================================
// TEST 3: Note CRUD
// ===========================================================================
#[tokio::test]
async fn test_note_create_get_list_delete() {
    let state = make_state();
    let id = create(&state, "Rust ownership", "Each value has one owner.", false).await;

    let (status, body) = call(&state, "GET", &format!("/notes/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["note"]["title"], "Rust ownership");
    assert_eq!(body["note"]["has_embedding"], false);

    let (_, body) = call(&state, "GET", "/notes", None).await;
    assert_eq!(body["count"], 1);

    let (status, body) = call(&state, "DELETE", &format!("/notes/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);

    let (status, body) = call(&state, "GET", &format!("/notes/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_kind"], "not_found");
}

// ===========================================================================
// TEST 4: Analyze previews without writing, link writes
// ===========================================================================
#[tokio::test]
async fn test_analyze_then_link() {
    let state = make_state();
    let content = "Borrowing in Rust lets code reference values without ownership transfer.";
    let a = create(&state, "Borrowing", content, false).await;
    let b = create(&state, "Borrowing rules", content, false).await;
    create(&state, "Bread", "Knead the dough and let it rise overnight.", false).await;

    let (status, body) = call(&state, "POST", &format!("/notes/{}/analyze", a), None).await;
    assert_eq!(status, StatusCode::OK, "{:?}", body);
    assert_eq!(body["pairs_evaluated"], 2);
    assert!(body["total_candidates"].as_u64().unwrap() >= 1);
    assert!(body["took_ms"].is_number());
    assert_eq!(state.graph.list_edges(a.parse().unwrap()).await.unwrap().len(), 0);

    let (status, body) = call(
        &state,
        "POST",
        &format!("/notes/{}/link", a),
        Some(json!({"profile": "default"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{:?}", body);
    let created = body["created"].as_array().unwrap();
    assert!(created.iter().any(|e| e["target_id"] == b.as_str()));

    // Second run creates nothing new
    let (_, body) = call(&state, "POST", &format!("/notes/{}/link", a), None).await;
    assert!(body["created"].as_array().unwrap().is_empty());

    let (status, body) = call(&state, "GET", &format!("/notes/{}/relationships", b), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["count"].as_u64().unwrap() >= 1);
}

// ===========================================================================
// TEST 5: Inline overrides are applied and validated
// ===========================================================================
#[tokio::test]
async fn test_analyze_with_overrides() {
    let state = make_state();
    let a = create(&state, "one", "graphs and edges and nodes", false).await;
    create(&state, "two", "graphs and edges and nodes", false).await;

    let (status, body) = call(
        &state,
        "POST",
        &format!("/notes/{}/analyze", a),
        Some(json!({"profile": "strict", "overrides": {"max_relationships_per_note": 0}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile"], "strict+custom");
    assert_eq!(body["total_candidates"], 0);

    let (status, _) = call(
        &state,
        "POST",
        &format!("/notes/{}/analyze", a),
        Some(json!({"overrides": {"semantically_related_threshold": 1.5}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &state,
        "POST",
        &format!("/notes/{}/analyze", a),
        Some(json!({"profile": "no_such_profile"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ===========================================================================
// TEST 6: Manual relationships, available links, deletion
// ===========================================================================
#[tokio::test]
async fn test_manual_relationship_lifecycle() {
    let state = make_state();
    let a = create(&state, "alpha", "first note body", false).await;
    let b = create(&state, "beta", "second note body", false).await;
    let c = create(&state, "gamma", "third note body", false).await;

    let (status, body) = call(
        &state,
        "POST",
        &format!("/notes/{}/relationships", a),
        Some(json!({"target_id": b, "rel_type": "related", "bidirectional": true, "description": "see also"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{:?}", body);
    assert_eq!(body["outcome"], "created");

    let (status, body) = call(&state, "GET", &format!("/notes/{}/relationships", a), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["relationships"][0]["origin"], "manual");

    let (_, body) = call(&state, "GET", &format!("/notes/{}/available-links", a), None).await;
    let ids: Vec<&str> = body["notes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![c.as_str()]);

    let (_, body) = call(
        &state,
        "GET",
        &format!("/notes/{}/available-links?exclude_existing=false", a),
        None,
    )
    .await;
    assert_eq!(body["count"], 2);

    let (status, body) = call(
        &state,
        "DELETE",
        &format!("/notes/{}/relationships/{}?bidirectional=true", a, b),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 2);

    let (status, _) = call(
        &state,
        "DELETE",
        &format!("/notes/{}/relationships/{}", a, b),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ===========================================================================
// TEST 7: Bad manual relationships are rejected
// ===========================================================================
#[tokio::test]
async fn test_manual_relationship_validation() {
    let state = make_state();
    let a = create(&state, "alpha", "first note body", false).await;

    let (status, _) = call(
        &state,
        "POST",
        &format!("/notes/{}/relationships", a),
        Some(json!({"target_id": a})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &state,
        "POST",
        &format!("/notes/{}/relationships", a),
        Some(json!({"target_id": uuid::Uuid::new_v4(), "rel_type": "RELATED"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let b = create(&state, "beta", "second", false).await;
    let (status, _) = call(
        &state,
        "POST",
        &format!("/notes/{}/relationships", a),
        Some(json!({"target_id": b, "rel_type": "SIMILAR_ISH"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ===========================================================================
// TEST 8: Deleting a note removes its edges
// ===========================================================================
#[tokio::test]
async fn test_delete_note_removes_edges() {
    let state = make_state();
    let a = create(&state, "alpha", "first note body", false).await;
    let b = create(&state, "beta", "second note body", false).await;
    call(
        &state,
        "POST",
        &format!("/notes/{}/relationships", a),
        Some(json!({"target_id": b, "bidirectional": true})),
    )
    .await;

    let (_, body) = call(&state, "DELETE", &format!("/notes/{}", a), None).await;
    assert_eq!(body["edges_removed"], 2);

    let (_, body) = call(&state, "GET", &format!("/notes/{}/relationships", b), None).await;
    assert_eq!(body["count"], 0);
}

// ===========================================================================
// TEST 9: Deleting a bidirectional edge from either side removes the pair
// ===========================================================================
#[tokio::test]
async fn test_one_sided_delete_removes_both_rows() {
    let state = make_state();
    let a = create(&state, "alpha", "first note body", false).await;
    let b = create(&state, "beta", "second note body", false).await;
    call(
        &state,
        "POST",
        &format!("/notes/{}/relationships", a),
        Some(json!({"target_id": b, "bidirectional": true})),
    )
    .await;

    let (status, body) = call(
        &state,
        "DELETE",
        &format!("/notes/{}/relationships/{}", b, a),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{:?}", body);
    assert_eq!(body["removed"], 2);

    for id in [&a, &b] {
        let (_, body) = call(&state, "GET", &format!("/notes/{}/relationships", id), None).await;
        assert_eq!(body["count"], 0);
    }
}
