//! Note lifecycle: create (embed + optional auto-link), read, delete, and
//! nearest-neighbour lookup by embedding.

use notegraph_core::models::{Note, NoteSummary};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{analyze, ServiceError, ServiceResult};
use crate::state::AppState;

pub const DEFAULT_TOP_K: usize = 5;

pub async fn load_note(state: &AppState, id: Uuid) -> ServiceResult<Note> {
    state
        .notes
        .get_note(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("note {} not found", id)))
}

fn note_json(note: &Note) -> Value {
    json!({
        "id": note.id,
        "title": note.title,
        "content": note.content,
        "has_embedding": note.embedding.is_some(),
        "created_at": note.created_at,
    })
}

pub async fn create_note(
    state: &AppState,
    title: String,
    content: String,
    auto_link: Option<bool>,
    profile: Option<String>,
) -> ServiceResult<Value> {
    if content.trim().is_empty() {
        return Err(ServiceError::Invalid("content is required".to_string()));
    }

    let auto_link = auto_link.unwrap_or(state.config.linking.auto_link_on_create);
    // Resolve up front so a bad profile name never leaves a half-created note
    let resolved = if auto_link {
        Some(analyze::resolve_profile(state, profile, None)?)
    } else {
        None
    };

    let mut note = Note::new(title.trim(), content);
    note.embedding = state.embed(&note.full_text()).await;
    state.notes.insert_note(&note).await?;

    tracing::info!(
        note_id = %note.id,
        embedded = note.embedding.is_some(),
        auto_link,
        "Note created"
    );

    let (link, link_error) = match resolved {
        Some(profile) => match analyze::link_note(state, &note, &profile).await {
            Ok(report) => (Some(report), None),
            Err(e) => {
                tracing::warn!(note_id = %note.id, error = %e, "Auto-link failed");
                (None, Some(e.to_string()))
            }
        },
        None => (None, None),
    };

    Ok(json!({
        "note": note_json(&note),
        "embedded": note.embedding.is_some(),
        "link": link,
        "link_error": link_error,
    }))
}

pub async fn list_notes(state: &AppState) -> ServiceResult<Value> {
    let notes: Vec<NoteSummary> = state
        .notes
        .list_notes()
        .await?
        .iter()
        .map(Note::summary)
        .collect();
    Ok(json!({
        "count": notes.len(),
        "notes": notes,
    }))
}

pub async fn get_note(state: &AppState, id: Uuid) -> ServiceResult<Value> {
    let note = load_note(state, id).await?;
    Ok(json!({ "note": note_json(&note) }))
}

pub async fn delete_note(state: &AppState, id: Uuid) -> ServiceResult<Value> {
    load_note(state, id).await?;
    let edges_removed = state.graph.remove_edges_for_note(id).await?;
    let deleted = state.notes.delete_note(id).await?;
    tracing::info!(note_id = %id, edges_removed, "Note deleted");
    Ok(json!({
        "deleted": deleted,
        "id": id,
        "edges_removed": edges_removed,
    }))
}

pub async fn similar(state: &AppState, id: Uuid, top_k: Option<usize>) -> ServiceResult<Value> {
    let note = load_note(state, id).await?;
    let embedding = note
        .embedding
        .as_deref()
        .ok_or_else(|| ServiceError::Invalid(format!("note {} has no embedding yet", id)))?;

    let top_k = top_k.unwrap_or(DEFAULT_TOP_K).max(1);
    let ranked = state.notes.nearest(embedding, id, top_k).await?;
    let results: Vec<Value> = ranked
        .iter()
        .map(|(n, score)| {
            json!({
                "id": n.id,
                "title": n.title,
                "score": score,
            })
        })
        .collect();

    Ok(json!({
        "note_id": id,
        "count": results.len(),
        "results": results,
    }))
}
