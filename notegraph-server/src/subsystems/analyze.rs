//! Analysis preview and link execution for a single note.
//!
//! Pair evaluation is CPU-bound, so the orchestrator runs on the blocking
//! pool (where rayon fans it out) against a corpus read once per call.

use std::collections::{BTreeMap, HashMap};

use notegraph_core::classify::RelationshipCandidate;
use notegraph_core::models::Note;
use notegraph_core::profile::{ConfigProfile, ProfileOverrides, ProfileSelection};
use notegraph_core::{Analysis, LinkReport};
use serde_json::{json, Value};
use uuid::Uuid;

use super::notes::load_note;
use super::{ServiceError, ServiceResult};
use crate::state::AppState;

pub fn resolve_profile(
    state: &AppState,
    profile: Option<String>,
    overrides: Option<ProfileOverrides>,
) -> ServiceResult<ConfigProfile> {
    Ok(state.catalog.resolve(&ProfileSelection { profile, overrides })?)
}

/// Run the orchestrator for `note` against the current corpus.
async fn run_analysis(
    state: &AppState,
    note: &Note,
    profile: &ConfigProfile,
) -> ServiceResult<(Analysis, Vec<Note>)> {
    let corpus = state.notes.list_notes().await?;
    let existing = state.graph.list_edges(note.id).await?;

    let orchestrator = state.orchestrator.clone();
    let note = note.clone();
    let profile = profile.clone();
    tokio::task::spawn_blocking(move || {
        let analysis = orchestrator.analyze(&note, &corpus, &profile, &existing)?;
        Ok::<_, ServiceError>((analysis, corpus))
    })
    .await
    .map_err(|e| ServiceError::Internal(e.into()))?
}

pub async fn link_note(
    state: &AppState,
    note: &Note,
    profile: &ConfigProfile,
) -> ServiceResult<LinkReport> {
    let (analysis, _) = run_analysis(state, note, profile).await?;
    if !analysis.failures.is_empty() {
        tracing::warn!(
            note_id = %note.id,
            failures = analysis.failures.len(),
            "Some corpus notes could not be featurized"
        );
    }
    Ok(state.writer.apply_plan(&analysis.plan()).await?)
}

fn candidate_json(c: &RelationshipCandidate, titles: &HashMap<Uuid, &str>) -> Value {
    json!({
        "target_id": c.target_id,
        "target_title": titles.get(&c.target_id).copied().unwrap_or_default(),
        "rel_type": c.rel_type,
        "composite_score": c.composite_score,
        "scores": c.evidence.scores,
        "patterns": c.evidence.patterns,
        "reason": c.evidence.describe(),
    })
}

pub async fn analyze_note(
    state: &AppState,
    id: Uuid,
    profile: Option<String>,
    overrides: Option<ProfileOverrides>,
) -> ServiceResult<Value> {
    let profile = resolve_profile(state, profile, overrides)?;
    let note = load_note(state, id).await?;
    let (analysis, corpus) = run_analysis(state, &note, &profile).await?;

    let titles: HashMap<Uuid, &str> = corpus.iter().map(|n| (n.id, n.title.as_str())).collect();
    let categories: BTreeMap<_, Vec<Value>> = analysis
        .categorized()
        .into_iter()
        .map(|(category, cs)| {
            let items = cs.iter().map(|c| candidate_json(c, &titles)).collect();
            (category, items)
        })
        .collect();

    Ok(json!({
        "note_id": analysis.note_id,
        "profile": analysis.profile,
        "snapshot_version": analysis.snapshot_version,
        "pairs_evaluated": analysis.pairs_evaluated,
        "total_candidates": analysis.accepted.len(),
        "categories": categories,
        "unrelated": analysis.unrelated,
        "manual_overrides": analysis.manual_overrides.len(),
        "already_linked": analysis.already_linked.len(),
        "over_cap": analysis.over_cap.len(),
        "failures": analysis.failures,
    }))
}

pub async fn link_by_id(
    state: &AppState,
    id: Uuid,
    profile: Option<String>,
    overrides: Option<ProfileOverrides>,
) -> ServiceResult<Value> {
    let profile = resolve_profile(state, profile, overrides)?;
    let note = load_note(state, id).await?;
    let report = link_note(state, &note, &profile).await?;
    serde_json::to_value(report).map_err(|e| ServiceError::Internal(e.into()))
}

pub fn list_profiles(state: &AppState) -> Value {
    let profiles: Vec<&ConfigProfile> = state.catalog.list().collect();
    json!({
        "default": state.catalog.default_name(),
        "profiles": profiles,
    })
}
