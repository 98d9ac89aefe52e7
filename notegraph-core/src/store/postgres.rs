use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::PgPool;
use uuid::Uuid;

use super::{GraphStore, InsertOutcome, NoteStore};
use crate::error::StoreError;
use crate::models::{EdgeKey, Note, Relationship};

/// PostgreSQL class 23 code for a missing referenced row.
const FOREIGN_KEY_VIOLATION: &str = "23503";

type NoteRow = (Uuid, String, String, Option<Vector>, DateTime<Utc>);
type EdgeRow = (
    Uuid,
    Uuid,
    String,
    bool,
    Option<String>,
    String,
    Option<f32>,
    DateTime<Utc>,
);

const EDGE_COLUMNS: &str =
    "source_id, target_id, rel_type, bidirectional, description, origin, score, created_at";

/// Notes and edges backed by the `notes` / `note_relationships` tables.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn note_from_row((id, title, content, embedding, created_at): NoteRow) -> Note {
    Note {
        id,
        title,
        content,
        embedding: embedding.map(|v| v.to_vec()),
        created_at,
    }
}

fn edge_from_row(row: EdgeRow) -> Result<Relationship, StoreError> {
    let (source_id, target_id, rel_type, bidirectional, description, origin, score, created_at) =
        row;
    Ok(Relationship {
        source_id,
        target_id,
        rel_type: rel_type
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("{}", e)))?,
        bidirectional,
        description,
        origin: origin
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("{}", e)))?,
        score,
        created_at,
    })
}

/// Classify a conflicting row that was gone by the time it was read back.
fn vanished_edge_error(edge: &Relationship, source_exists: bool, target_exists: bool) -> StoreError {
    match (source_exists, target_exists) {
        (false, _) => StoreError::NoteMissing(edge.source_id),
        (_, false) => StoreError::NoteMissing(edge.target_id),
        _ => StoreError::Conflict(format!(
            "edge {} was removed concurrently with this insert",
            edge.key()
        )),
    }
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .map(|code| code == FOREIGN_KEY_VIOLATION)
        .unwrap_or(false)
}

#[async_trait]
impl NoteStore for PgStore {
    async fn insert_note(&self, note: &Note) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notes (id, title, content, embedding, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(note.id)
        .bind(&note.title)
        .bind(&note.content)
        .bind(note.embedding.clone().map(Vector::from))
        .bind(note.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_note(&self, id: Uuid) -> Result<Option<Note>, StoreError> {
        let row: Option<NoteRow> = sqlx::query_as(
            "SELECT id, title, content, embedding, created_at FROM notes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(note_from_row))
    }

    async fn list_notes(&self) -> Result<Vec<Note>, StoreError> {
        let rows: Vec<NoteRow> = sqlx::query_as(
            "SELECT id, title, content, embedding, created_at FROM notes ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(note_from_row).collect())
    }

    async fn set_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE notes SET embedding = $2 WHERE id = $1")
            .bind(id)
            .bind(Vector::from(embedding.to_vec()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_note(&self, id: Uuid) -> Result<bool, StoreError> {
        // note_relationships rows go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn notes_missing_embeddings(&self, limit: u32) -> Result<Vec<Note>, StoreError> {
        let rows: Vec<NoteRow> = sqlx::query_as(
            r#"
            SELECT id, title, content, embedding, created_at
            FROM notes
            WHERE embedding IS NULL
            ORDER BY embedding_attempted_at NULLS FIRST, created_at, id
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(note_from_row).collect())
    }

    async fn record_embedding_attempt(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE notes SET embedding_attempted_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn nearest(
        &self,
        embedding: &[f32],
        exclude: Uuid,
        top_k: usize,
    ) -> Result<Vec<(Note, f32)>, StoreError> {
        let vector = Vector::from(embedding.to_vec());
        let rows = sqlx::query_as::<_, (Uuid, String, String, Option<Vector>, DateTime<Utc>, f64)>(
            r#"
            SELECT id, title, content, embedding, created_at,
                   1 - (embedding <=> $1::vector) AS score
            FROM notes
            WHERE id <> $2
              AND embedding IS NOT NULL
              AND vector_dims(embedding) = $3
            ORDER BY embedding <=> $1::vector, id
            LIMIT $4
            "#,
        )
        .bind(&vector)
        .bind(exclude)
        .bind(embedding.len() as i32)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, title, content, emb, created_at, score)| {
                let note = note_from_row((id, title, content, emb, created_at));
                (note, (score as f32).clamp(0.0, 1.0))
            })
            .collect())
    }

    fn backend_name(&self) -> &str {
        "postgres"
    }
}

#[async_trait]
impl GraphStore for PgStore {
    async fn insert_edge(&self, edge: &Relationship) -> Result<InsertOutcome, StoreError> {
        if edge.source_id == edge.target_id {
            return Err(StoreError::SelfRelationship(edge.source_id));
        }

        let inserted = sqlx::query_as::<_, (Uuid,)>(
            r#"
            INSERT INTO note_relationships
                (source_id, target_id, rel_type, bidirectional, description, origin, score, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_id, target_id, rel_type) DO NOTHING
            RETURNING source_id
            "#,
        )
        .bind(edge.source_id)
        .bind(edge.target_id)
        .bind(edge.rel_type.as_str())
        .bind(edge.bidirectional)
        .bind(&edge.description)
        .bind(edge.origin.as_str())
        .bind(edge.score)
        .bind(edge.created_at)
        .fetch_optional(&self.pool)
        .await;

        match inserted {
            Ok(Some(_)) => Ok(InsertOutcome::Created),
            Ok(None) => match self.get_edge(&edge.key()).await? {
                Some(existing) => Ok(InsertOutcome::Exists(existing)),
                // Lost a race with a delete of the edge or one of its notes.
                None => {
                    let source_exists = self.get_note(edge.source_id).await?.is_some();
                    let target_exists = self.get_note(edge.target_id).await?.is_some();
                    Err(vanished_edge_error(edge, source_exists, target_exists))
                }
            },
            Err(e) if is_foreign_key_violation(&e) => {
                let source_exists = self.get_note(edge.source_id).await?.is_some();
                let missing = if source_exists {
                    edge.target_id
                } else {
                    edge.source_id
                };
                Err(StoreError::NoteMissing(missing))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_edge(&self, edge: &Relationship) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE note_relationships
            SET bidirectional = $4, description = $5, origin = $6, score = $7, created_at = $8
            WHERE source_id = $1 AND target_id = $2 AND rel_type = $3
            "#,
        )
        .bind(edge.source_id)
        .bind(edge.target_id)
        .bind(edge.rel_type.as_str())
        .bind(edge.bidirectional)
        .bind(&edge.description)
        .bind(edge.origin.as_str())
        .bind(edge.score)
        .bind(edge.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_edge(&self, key: &EdgeKey) -> Result<Option<Relationship>, StoreError> {
        let row: Option<EdgeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM note_relationships WHERE source_id = $1 AND target_id = $2 AND rel_type = $3",
            EDGE_COLUMNS
        ))
        .bind(key.source_id)
        .bind(key.target_id)
        .bind(key.rel_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(edge_from_row).transpose()
    }

    async fn remove_edge(&self, key: &EdgeKey) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM note_relationships WHERE source_id = $1 AND target_id = $2 AND rel_type = $3",
        )
        .bind(key.source_id)
        .bind(key.target_id)
        .bind(key.rel_type.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_edges(&self, note_id: Uuid) -> Result<Vec<Relationship>, StoreError> {
        let rows: Vec<EdgeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM note_relationships WHERE source_id = $1 OR target_id = $1 ORDER BY created_at",
            EDGE_COLUMNS
        ))
        .bind(note_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(edge_from_row).collect()
    }

    async fn remove_edges_for_note(&self, note_id: Uuid) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM note_relationships WHERE source_id = $1 OR target_id = $1")
                .bind(note_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    fn backend_name(&self) -> &str {
        "postgres"
    }
}
