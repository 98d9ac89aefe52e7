//! Notegraph HTTP REST API
//!
//! Axum server exposing the same operations as the Unix socket. Each endpoint
//! is a thin handler over an `*_inner` function that builds a
//! `NotegraphRequest`, runs it through the shared router and maps the
//! response's error kind onto an HTTP status.
//!
//! Endpoints:
//! - GET    /health, /version, /profiles
//! - POST   /notes                          create (embed, optional auto-link)
//! - GET    /notes                          list
//! - GET    /notes/:id                      fetch
//! - DELETE /notes/:id                      delete with its edges
//! - POST   /notes/:id/analyze              preview candidates
//! - POST   /notes/:id/link                 create edges
//! - GET    /notes/:id/similar              embedding neighbours
//! - GET    /notes/:id/relationships        edge list
//! - POST   /notes/:id/relationships        manual edge
//! - DELETE /notes/:id/relationships/:target
//! - GET    /notes/:id/available-links

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use notegraph_core::ipc::{error_kind, NotegraphRequest, NotegraphResponse};
use notegraph_core::profile::ProfileOverrides;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/profiles", get(profiles_handler))
        .route("/notes", post(create_note_handler).get(list_notes_handler))
        .route("/notes/:id", get(get_note_handler).delete(delete_note_handler))
        .route("/notes/:id/analyze", post(analyze_handler))
        .route("/notes/:id/link", post(link_handler))
        .route("/notes/:id/similar", get(similar_handler))
        .route(
            "/notes/:id/relationships",
            get(relationships_handler).post(create_relationship_handler),
        )
        .route(
            "/notes/:id/relationships/:target",
            axum::routing::delete(delete_relationship_handler),
        )
        .route("/notes/:id/available-links", get(available_links_handler))
        .with_state(state)
}

/// Serve until the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Notegraph HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub auto_link: Option<bool>,
    pub profile: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ProfileRequest {
    pub profile: Option<String>,
    pub overrides: Option<ProfileOverrides>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SimilarQuery {
    pub top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRelationshipRequest {
    pub target_id: Uuid,
    pub rel_type: Option<String>,
    #[serde(default)]
    pub bidirectional: bool,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DeleteRelationshipQuery {
    pub rel_type: Option<String>,
    #[serde(default)]
    pub bidirectional: bool,
}

#[derive(Debug, Deserialize)]
pub struct AvailableLinksQuery {
    #[serde(default = "default_true")]
    pub exclude_existing: bool,
}

impl Default for AvailableLinksQuery {
    fn default() -> Self {
        Self {
            exclude_existing: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

async fn dispatch(state: &AppState, request: NotegraphRequest) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(request, state).await;
    response_to_http(response)
}

pub async fn health_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    let (status, mut body) = dispatch(state, NotegraphRequest::Health).await;
    if status == StatusCode::OK {
        if let Some(obj) = body.as_object_mut() {
            obj.insert(
                "socket".to_string(),
                serde_json::json!(state.config.service.socket_path),
            );
            obj.insert(
                "version".to_string(),
                serde_json::json!(env!("CARGO_PKG_VERSION")),
            );
        }
    }
    (status, body)
}

pub fn version_inner() -> serde_json::Value {
    crate::router::version_info()
}

pub async fn profiles_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    dispatch(state, NotegraphRequest::ListProfiles).await
}

pub async fn create_note_inner(
    state: &AppState,
    req: CreateNoteRequest,
) -> (StatusCode, serde_json::Value) {
    let content = match req.content {
        Some(c) if !c.trim().is_empty() => c,
        _ => return bad_request("content field is required"),
    };

    let (status, body) = dispatch(
        state,
        NotegraphRequest::CreateNote {
            title: req.title.unwrap_or_default(),
            content,
            auto_link: req.auto_link,
            profile: req.profile,
        },
    )
    .await;
    match status {
        StatusCode::OK => (StatusCode::CREATED, body),
        other => (other, body),
    }
}

pub async fn list_notes_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    dispatch(state, NotegraphRequest::ListNotes).await
}

pub async fn get_note_inner(state: &AppState, id: Uuid) -> (StatusCode, serde_json::Value) {
    dispatch(state, NotegraphRequest::GetNote { id }).await
}

pub async fn delete_note_inner(state: &AppState, id: Uuid) -> (StatusCode, serde_json::Value) {
    dispatch(state, NotegraphRequest::DeleteNote { id }).await
}

pub async fn analyze_inner(
    state: &AppState,
    id: Uuid,
    req: ProfileRequest,
) -> (StatusCode, serde_json::Value) {
    let start = Instant::now();
    let (status, mut body) = dispatch(
        state,
        NotegraphRequest::Analyze {
            id,
            profile: req.profile,
            overrides: req.overrides,
        },
    )
    .await;
    if status == StatusCode::OK {
        if let Some(obj) = body.as_object_mut() {
            let took_ms = start.elapsed().as_millis() as u64;
            obj.insert("took_ms".to_string(), serde_json::json!(took_ms));
        }
    }
    (status, body)
}

pub async fn link_inner(
    state: &AppState,
    id: Uuid,
    req: ProfileRequest,
) -> (StatusCode, serde_json::Value) {
    dispatch(
        state,
        NotegraphRequest::Link {
            id,
            profile: req.profile,
            overrides: req.overrides,
        },
    )
    .await
}

pub async fn similar_inner(
    state: &AppState,
    id: Uuid,
    query: SimilarQuery,
) -> (StatusCode, serde_json::Value) {
    dispatch(
        state,
        NotegraphRequest::Similar {
            id,
            top_k: query.top_k,
        },
    )
    .await
}

pub async fn relationships_inner(state: &AppState, id: Uuid) -> (StatusCode, serde_json::Value) {
    dispatch(state, NotegraphRequest::Relationships { id }).await
}

pub async fn create_relationship_inner(
    state: &AppState,
    source_id: Uuid,
    req: CreateRelationshipRequest,
) -> (StatusCode, serde_json::Value) {
    let (status, body) = dispatch(
        state,
        NotegraphRequest::CreateRelationship {
            source_id,
            target_id: req.target_id,
            rel_type: req.rel_type.unwrap_or_else(|| "RELATED".to_string()),
            bidirectional: req.bidirectional,
            description: req.description,
        },
    )
    .await;
    match status {
        StatusCode::OK => (StatusCode::CREATED, body),
        other => (other, body),
    }
}

pub async fn delete_relationship_inner(
    state: &AppState,
    source_id: Uuid,
    target_id: Uuid,
    query: DeleteRelationshipQuery,
) -> (StatusCode, serde_json::Value) {
    dispatch(
        state,
        NotegraphRequest::DeleteRelationship {
            source_id,
            target_id,
            rel_type: query.rel_type,
            bidirectional: query.bidirectional,
        },
    )
    .await
}

pub async fn available_links_inner(
    state: &AppState,
    id: Uuid,
    query: AvailableLinksQuery,
) -> (StatusCode, serde_json::Value) {
    dispatch(
        state,
        NotegraphRequest::AvailableLinks {
            id,
            exclude_existing: query.exclude_existing,
        },
    )
    .await
}

// ============================================================================
// Axum handler wrappers
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn profiles_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = profiles_inner(&state).await;
    (status, Json(body))
}

pub async fn create_note_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateNoteRequest>,
) -> impl IntoResponse {
    let (status, body) = create_note_inner(&state, req).await;
    (status, Json(body))
}

pub async fn list_notes_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = list_notes_inner(&state).await;
    (status, Json(body))
}

pub async fn get_note_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = get_note_inner(&state, id).await;
    (status, Json(body))
}

pub async fn delete_note_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = delete_note_inner(&state, id).await;
    (status, Json(body))
}

pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    req: Option<Json<ProfileRequest>>,
) -> impl IntoResponse {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let (status, body) = analyze_inner(&state, id, req).await;
    (status, Json(body))
}

pub async fn link_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    req: Option<Json<ProfileRequest>>,
) -> impl IntoResponse {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let (status, body) = link_inner(&state, id, req).await;
    (status, Json(body))
}

pub async fn similar_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<SimilarQuery>,
) -> impl IntoResponse {
    let (status, body) = similar_inner(&state, id, query).await;
    (status, Json(body))
}

pub async fn relationships_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = relationships_inner(&state, id).await;
    (status, Json(body))
}

pub async fn create_relationship_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateRelationshipRequest>,
) -> impl IntoResponse {
    let (status, body) = create_relationship_inner(&state, id, req).await;
    (status, Json(body))
}

pub async fn delete_relationship_handler(
    State(state): State<Arc<AppState>>,
    Path((id, target)): Path<(Uuid, Uuid)>,
    Query(query): Query<DeleteRelationshipQuery>,
) -> impl IntoResponse {
    let (status, body) = delete_relationship_inner(&state, id, target, query).await;
    (status, Json(body))
}

pub async fn available_links_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<AvailableLinksQuery>,
) -> impl IntoResponse {
    let (status, body) = available_links_inner(&state, id, query).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

fn bad_request(msg: &str) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::BAD_REQUEST,
        serde_json::json!({
            "error": msg,
            "error_kind": error_kind::INVALID,
            "status": "error",
        }),
    )
}

/// Map an IPC response onto an HTTP status and body.
pub fn response_to_http(response: NotegraphResponse) -> (StatusCode, serde_json::Value) {
    if response.is_ok() {
        return (
            StatusCode::OK,
            response.data.unwrap_or(serde_json::json!({})),
        );
    }

    let kind = response
        .error_kind
        .unwrap_or_else(|| error_kind::INTERNAL.to_string());
    let status = match kind.as_str() {
        error_kind::NOT_FOUND => StatusCode::NOT_FOUND,
        error_kind::INVALID => StatusCode::BAD_REQUEST,
        error_kind::UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        serde_json::json!({
            "error": response.error.unwrap_or_else(|| "unknown error".to_string()),
            "error_kind": kind,
            "status": "error",
        }),
    )
}

// ============================================================================
// Unit Tests
// ============================================================================
