//! Document and graph store seams
//!
//! The engine never talks to a database directly. Server code hands it notes
//! read through `NoteStore` and applies its write plans through `GraphStore`
//! (wrapped by `EdgeWriter` for locking, retries and bidirectional pairing).

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{EdgeKey, Note, Relationship};
use crate::scoring::cosine;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Result of a create-if-absent edge insert.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Created,
    /// An edge with the same `(source, target, type)` was already stored.
    Exists(Relationship),
}

#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn insert_note(&self, note: &Note) -> Result<(), StoreError>;

    async fn get_note(&self, id: Uuid) -> Result<Option<Note>, StoreError>;

    /// Every note, oldest first.
    async fn list_notes(&self) -> Result<Vec<Note>, StoreError>;

    /// Returns false when the note does not exist.
    async fn set_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<bool, StoreError>;

    /// Deletes the note; backends also drop every edge touching it.
    async fn delete_note(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Notes without an embedding: never-attempted ones first, then the
    /// least recently attempted, oldest note breaking ties.
    async fn notes_missing_embeddings(&self, limit: u32) -> Result<Vec<Note>, StoreError>;

    /// Mark that embedding `id` was just tried and did not produce a vector.
    async fn record_embedding_attempt(&self, id: Uuid) -> Result<(), StoreError>;

    /// Notes ranked by embedding cosine against `embedding`, excluding `exclude`.
    async fn nearest(
        &self,
        embedding: &[f32],
        exclude: Uuid,
        top_k: usize,
    ) -> Result<Vec<(Note, f32)>, StoreError> {
        let mut ranked: Vec<(Note, f32)> = self
            .list_notes()
            .await?
            .into_iter()
            .filter(|n| n.id != exclude)
            .filter_map(|n| {
                let sim = cosine(embedding, n.embedding.as_deref()?)?;
                Some((n, sim))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.id.cmp(&b.0.id)));
        ranked.truncate(top_k);
        Ok(ranked)
    }

    fn backend_name(&self) -> &str;
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create-if-absent on `(source_id, target_id, rel_type)`.
    async fn insert_edge(&self, edge: &Relationship) -> Result<InsertOutcome, StoreError>;

    /// Overwrite the stored edge with the same key. Returns false if absent.
    async fn replace_edge(&self, edge: &Relationship) -> Result<bool, StoreError>;

    async fn get_edge(&self, key: &EdgeKey) -> Result<Option<Relationship>, StoreError>;

    async fn remove_edge(&self, key: &EdgeKey) -> Result<bool, StoreError>;

    /// Edges where the note is either source or target.
    async fn list_edges(&self, note_id: Uuid) -> Result<Vec<Relationship>, StoreError>;

    async fn remove_edges_for_note(&self, note_id: Uuid) -> Result<u64, StoreError>;

    fn backend_name(&self) -> &str;
}
