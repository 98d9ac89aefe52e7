//! Embedding backfill worker
//!
//! Notes created while the embedding provider was down are stored without a
//! vector. This worker periodically embeds them and, when auto-linking is on,
//! re-links each one so its semantic scores take effect. Notes that fail are
//! marked as attempted so the next batch starts with the ones not yet tried.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::analyze;
use crate::state::AppState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub embedded: usize,
    pub skipped: usize,
    pub edges_created: usize,
}

pub async fn run_backfill_worker(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    if state.embedder.is_none() {
        tracing::info!("Backfill worker disabled: no embedding backend");
        return;
    }

    let secs = state.config.embedding.backfill_interval_secs.max(1);
    let mut ticker = interval(Duration::from_secs(secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(
        interval_secs = secs,
        batch_size = state.config.embedding.backfill_batch_size,
        "Embedding backfill worker started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_backfill_tick(&state).await {
                    Ok(report) if report.embedded > 0 || report.skipped > 0 => {
                        tracing::info!(
                            embedded = report.embedded,
                            skipped = report.skipped,
                            edges_created = report.edges_created,
                            "Backfill tick complete"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Backfill tick failed"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Backfill worker shutting down");
                break;
            }
        }
    }
}

/// One pass over a batch of notes lacking an embedding.
pub async fn run_backfill_tick(state: &AppState) -> Result<BackfillReport> {
    let Some(backend) = state.embedder.as_ref() else {
        return Ok(BackfillReport::default());
    };

    let batch = state
        .notes
        .notes_missing_embeddings(state.config.embedding.backfill_batch_size)
        .await?;
    if batch.is_empty() {
        return Ok(BackfillReport::default());
    }

    let profile = analyze::resolve_profile(state, None, None)?;
    let mut report = BackfillReport::default();

    for (i, note) in batch.iter().enumerate() {
        match backend.embed(&note.full_text()).await {
            Ok(Some(vector)) => {
                if !state.notes.set_embedding(note.id, &vector).await? {
                    // Deleted since the batch was read
                    report.skipped += 1;
                    continue;
                }
                report.embedded += 1;

                if state.config.linking.auto_link_on_create {
                    let embedded = note.clone().with_embedding(vector);
                    match analyze::link_note(state, &embedded, &profile).await {
                        Ok(link) => report.edges_created += link.created.len(),
                        Err(e) => tracing::warn!(note_id = %note.id, error = %e, "Re-link after backfill failed"),
                    }
                }
            }
            Ok(None) => {
                // Provider is in fallback mode; try again next tick
                tracing::debug!("Backend returned no vector, stopping batch");
                state.notes.record_embedding_attempt(note.id).await?;
                report.skipped += batch.len() - i;
                return Ok(report);
            }
            Err(e) => {
                tracing::warn!(note_id = %note.id, error = %e, "Failed to embed note, skipping");
                state.notes.record_embedding_attempt(note.id).await?;
                report.skipped += 1;
            }
        }
    }

    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================
