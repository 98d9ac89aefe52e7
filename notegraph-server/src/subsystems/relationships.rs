//! Edge listing and manual edge management.

use std::collections::{HashMap, HashSet};

use notegraph_core::models::{EdgeKey, Origin, Relationship, RelationshipType};
use serde_json::{json, Value};
use uuid::Uuid;

use super::notes::load_note;
use super::{ServiceError, ServiceResult};
use crate::state::AppState;

fn parse_type(raw: &str) -> ServiceResult<RelationshipType> {
    Ok(raw.parse::<RelationshipType>()?)
}

/// Every edge touching `id`, seen from `id`. A bidirectional pair is listed
/// once, as its outgoing row.
pub async fn list_relationships(state: &AppState, id: Uuid) -> ServiceResult<Value> {
    load_note(state, id).await?;
    let edges = state.graph.list_edges(id).await?;
    let titles: HashMap<Uuid, String> = state
        .notes
        .list_notes()
        .await?
        .into_iter()
        .map(|n| (n.id, n.title))
        .collect();

    let outgoing: HashSet<EdgeKey> = edges
        .iter()
        .filter(|e| e.source_id == id)
        .map(Relationship::key)
        .collect();

    let items: Vec<Value> = edges
        .iter()
        .filter(|e| {
            e.source_id == id || !(e.bidirectional && outgoing.contains(&e.key().reversed()))
        })
        .map(|e| {
            let (direction, other) = if e.source_id == id {
                ("outgoing", e.target_id)
            } else {
                ("incoming", e.source_id)
            };
            json!({
                "source_id": e.source_id,
                "target_id": e.target_id,
                "direction": direction,
                "other_id": other,
                "other_title": titles.get(&other),
                "rel_type": e.rel_type,
                "category": e.rel_type.category(),
                "bidirectional": e.bidirectional,
                "origin": e.origin,
                "score": e.score,
                "description": e.description,
                "created_at": e.created_at,
            })
        })
        .collect();

    let manual = edges.iter().filter(|e| e.origin == Origin::Manual).count();
    Ok(json!({
        "note_id": id,
        "count": items.len(),
        "manual": manual,
        "relationships": items,
    }))
}

pub async fn create_relationship(
    state: &AppState,
    source_id: Uuid,
    target_id: Uuid,
    rel_type: &str,
    bidirectional: bool,
    description: Option<String>,
) -> ServiceResult<Value> {
    let rel_type = parse_type(rel_type)?;
    if source_id == target_id {
        return Err(ServiceError::Invalid(
            "a note cannot be related to itself".to_string(),
        ));
    }
    load_note(state, source_id).await?;
    load_note(state, target_id).await?;

    let edge = Relationship::manual(source_id, target_id, rel_type, bidirectional, description);
    let outcome = state.writer.upsert_edge(&edge, bidirectional).await?;
    tracing::info!(edge = %edge.key(), bidirectional, ?outcome, "Manual relationship written");

    Ok(json!({
        "outcome": outcome,
        "relationship": edge,
    }))
}

/// Remove edges from `source_id` to `target_id`; every type when `rel_type`
/// is absent.
pub async fn delete_relationship(
    state: &AppState,
    source_id: Uuid,
    target_id: Uuid,
    rel_type: Option<&str>,
    bidirectional: bool,
) -> ServiceResult<Value> {
    let keys: Vec<EdgeKey> = match rel_type {
        Some(raw) => vec![EdgeKey::new(source_id, target_id, parse_type(raw)?)],
        None => state
            .graph
            .list_edges(source_id)
            .await?
            .iter()
            .filter(|e| e.source_id == source_id && e.target_id == target_id)
            .map(Relationship::key)
            .collect(),
    };

    let mut removed = 0usize;
    for key in &keys {
        let outcome = state.writer.delete_edge(key, bidirectional).await?;
        removed += outcome.forward as usize + outcome.reverse as usize;
    }

    if removed == 0 {
        return Err(ServiceError::NotFound(format!(
            "no relationship from {} to {}",
            source_id, target_id
        )));
    }
    tracing::info!(%source_id, %target_id, removed, "Relationships deleted");
    Ok(json!({ "removed": removed }))
}

/// Notes `id` could be linked to by hand.
pub async fn available_links(
    state: &AppState,
    id: Uuid,
    exclude_existing: bool,
) -> ServiceResult<Value> {
    load_note(state, id).await?;
    let linked: HashSet<Uuid> = if exclude_existing {
        state
            .graph
            .list_edges(id)
            .await?
            .iter()
            .map(|e| if e.source_id == id { e.target_id } else { e.source_id })
            .collect()
    } else {
        HashSet::new()
    };

    let notes: Vec<Value> = state
        .notes
        .list_notes()
        .await?
        .iter()
        .filter(|n| n.id != id && !linked.contains(&n.id))
        .map(|n| json!({ "id": n.id, "title": n.title }))
        .collect();

    Ok(json!({
        "note_id": id,
        "count": notes.len(),
        "notes": notes,
    }))
}
