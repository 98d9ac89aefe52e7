use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{GraphStore, InsertOutcome, NoteStore};
use crate::error::StoreError;
use crate::models::{EdgeKey, Note, Relationship};

/// In-process store for both notes and edges.
///
/// Enforces the same constraints as the PostgreSQL schema: edges need both
/// endpoints to exist, self edges are rejected, and deleting a note cascades.
#[derive(Default)]
pub struct MemoryStore {
    notes: RwLock<BTreeMap<Uuid, Note>>,
    edges: RwLock<BTreeMap<EdgeKey, Relationship>>,
    /// Sequence number of the latest failed embedding attempt per note.
    attempts: RwLock<BTreeMap<Uuid, u64>>,
    attempt_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn edge_count(&self) -> usize {
        self.edges.read().await.len()
    }
}

#[async_trait]
impl NoteStore for MemoryStore {
    async fn insert_note(&self, note: &Note) -> Result<(), StoreError> {
        self.notes.write().await.insert(note.id, note.clone());
        Ok(())
    }

    async fn get_note(&self, id: Uuid) -> Result<Option<Note>, StoreError> {
        Ok(self.notes.read().await.get(&id).cloned())
    }

    async fn list_notes(&self) -> Result<Vec<Note>, StoreError> {
        let mut notes: Vec<Note> = self.notes.read().await.values().cloned().collect();
        notes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(notes)
    }

    async fn set_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<bool, StoreError> {
        match self.notes.write().await.get_mut(&id) {
            Some(note) => {
                note.embedding = Some(embedding.to_vec());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_note(&self, id: Uuid) -> Result<bool, StoreError> {
        let removed = self.notes.write().await.remove(&id).is_some();
        if removed {
            self.attempts.write().await.remove(&id);
            self.edges
                .write()
                .await
                .retain(|_, e| e.source_id != id && e.target_id != id);
        }
        Ok(removed)
    }

    async fn notes_missing_embeddings(&self, limit: u32) -> Result<Vec<Note>, StoreError> {
        let attempts = self.attempts.read().await;
        let mut missing: Vec<Note> = self
            .list_notes()
            .await?
            .into_iter()
            .filter(|n| n.embedding.is_none())
            .collect();
        // list_notes is already oldest first; the stable sort keeps that within a tier
        missing.sort_by_key(|n| attempts.get(&n.id).copied());
        missing.truncate(limit as usize);
        Ok(missing)
    }

    async fn record_embedding_attempt(&self, id: Uuid) -> Result<(), StoreError> {
        if self.notes.read().await.contains_key(&id) {
            let seq = self.attempt_seq.fetch_add(1, Ordering::SeqCst);
            self.attempts.write().await.insert(id, seq);
        }
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn insert_edge(&self, edge: &Relationship) -> Result<InsertOutcome, StoreError> {
        if edge.source_id == edge.target_id {
            return Err(StoreError::SelfRelationship(edge.source_id));
        }
        {
            let notes = self.notes.read().await;
            for id in [edge.source_id, edge.target_id] {
                if !notes.contains_key(&id) {
                    return Err(StoreError::NoteMissing(id));
                }
            }
        }

        let mut edges = self.edges.write().await;
        if let Some(existing) = edges.get(&edge.key()) {
            return Ok(InsertOutcome::Exists(existing.clone()));
        }
        edges.insert(edge.key(), edge.clone());
        Ok(InsertOutcome::Created)
    }

    async fn replace_edge(&self, edge: &Relationship) -> Result<bool, StoreError> {
        let mut edges = self.edges.write().await;
        match edges.get_mut(&edge.key()) {
            Some(slot) => {
                *slot = edge.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_edge(&self, key: &EdgeKey) -> Result<Option<Relationship>, StoreError> {
        Ok(self.edges.read().await.get(key).cloned())
    }

    async fn remove_edge(&self, key: &EdgeKey) -> Result<bool, StoreError> {
        Ok(self.edges.write().await.remove(key).is_some())
    }

    async fn list_edges(&self, note_id: Uuid) -> Result<Vec<Relationship>, StoreError> {
        Ok(self
            .edges
            .read()
            .await
            .values()
            .filter(|e| e.source_id == note_id || e.target_id == note_id)
            .cloned()
            .collect())
    }

    async fn remove_edges_for_note(&self, note_id: Uuid) -> Result<u64, StoreError> {
        let mut edges = self.edges.write().await;
        let before = edges.len();
        edges.retain(|_, e| e.source_id != note_id && e.target_id != note_id);
        Ok((before - edges.len()) as u64)
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
