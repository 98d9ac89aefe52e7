use crate::state::AppState;
use crate::subsystems::{analyze, notes, relationships, ServiceError, ServiceResult};
use notegraph_core::ipc::{NotegraphRequest, NotegraphResponse, PROTOCOL_VERSION};
use serde_json::{json, Value};

/// Dispatch one request. Shared by the IPC socket and the HTTP API.
pub async fn handle_request(request: NotegraphRequest, state: &AppState) -> NotegraphResponse {
    match request {
        NotegraphRequest::Ping => NotegraphResponse::pong(),
        NotegraphRequest::Version => NotegraphResponse::ok(version_info()),
        NotegraphRequest::Health => respond(health(state).await),
        NotegraphRequest::ListProfiles => NotegraphResponse::ok(analyze::list_profiles(state)),
        NotegraphRequest::CreateNote {
            title,
            content,
            auto_link,
            profile,
        } => respond(notes::create_note(state, title, content, auto_link, profile).await),
        NotegraphRequest::ListNotes => respond(notes::list_notes(state).await),
        NotegraphRequest::GetNote { id } => respond(notes::get_note(state, id).await),
        NotegraphRequest::DeleteNote { id } => respond(notes::delete_note(state, id).await),
        NotegraphRequest::Analyze {
            id,
            profile,
            overrides,
        } => respond(analyze::analyze_note(state, id, profile, overrides).await),
        NotegraphRequest::Link {
            id,
            profile,
            overrides,
        } => respond(analyze::link_by_id(state, id, profile, overrides).await),
        NotegraphRequest::Similar { id, top_k } => {
            respond(notes::similar(state, id, top_k).await)
        }
        NotegraphRequest::Relationships { id } => {
            respond(relationships::list_relationships(state, id).await)
        }
        NotegraphRequest::CreateRelationship {
            source_id,
            target_id,
            rel_type,
            bidirectional,
            description,
        } => respond(
            relationships::create_relationship(
                state,
                source_id,
                target_id,
                &rel_type,
                bidirectional,
                description,
            )
            .await,
        ),
        NotegraphRequest::DeleteRelationship {
            source_id,
            target_id,
            rel_type,
            bidirectional,
        } => respond(
            relationships::delete_relationship(
                state,
                source_id,
                target_id,
                rel_type.as_deref(),
                bidirectional,
            )
            .await,
        ),
        NotegraphRequest::AvailableLinks {
            id,
            exclude_existing,
        } => respond(relationships::available_links(state, id, exclude_existing).await),
    }
}

fn respond(result: ServiceResult<Value>) -> NotegraphResponse {
    match result {
        Ok(data) => NotegraphResponse::ok(data),
        Err(e) => {
            if matches!(e, ServiceError::Internal(_) | ServiceError::Unavailable(_)) {
                tracing::error!(error = %e, kind = e.kind(), "Request failed");
            }
            e.into_response()
        }
    }
}

pub fn version_info() -> Value {
    json!({
        "version": PROTOCOL_VERSION,
        "protocol": "notegraph/1",
    })
}

async fn health(state: &AppState) -> ServiceResult<Value> {
    let embedder = state.embedder.as_ref().map(|e| e.name()).unwrap_or("none");
    let Some(pool) = state.pool.as_ref() else {
        return Ok(json!({
            "status": "healthy",
            "store": state.notes.backend_name(),
            "embedder": embedder,
        }));
    };

    let pg_ver = notegraph_core::db::health_check(pool)
        .await
        .map_err(|e| ServiceError::Unavailable(format!("DB health check failed: {}", e)))?;
    let vec_ver = notegraph_core::db::check_pgvector(pool)
        .await
        .unwrap_or_else(|e| format!("unavailable: {}", e));

    Ok(json!({
        "status": "healthy",
        "store": state.notes.backend_name(),
        "embedder": embedder,
        "postgresql": pg_ver,
        "pgvector": vec_ver,
    }))
}
