use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Idempotent schema setup, applied in order at startup.
const SCHEMA: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS vector",
    r#"
    CREATE TABLE IF NOT EXISTS notes (
        id          UUID PRIMARY KEY,
        title       TEXT NOT NULL,
        content     TEXT NOT NULL,
        embedding   vector,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS note_relationships (
        source_id     UUID NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
        target_id     UUID NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
        rel_type      TEXT NOT NULL,
        bidirectional BOOLEAN NOT NULL DEFAULT false,
        description   TEXT,
        origin        TEXT NOT NULL,
        score         REAL,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (source_id, target_id, rel_type),
        CHECK (source_id <> target_id)
    )
    "#,
    "ALTER TABLE notes ADD COLUMN IF NOT EXISTS embedding_attempted_at TIMESTAMPTZ",
    "CREATE INDEX IF NOT EXISTS idx_note_relationships_target ON note_relationships (target_id)",
    "CREATE INDEX IF NOT EXISTS idx_notes_missing_embedding ON notes (created_at) WHERE embedding IS NULL",
];

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!(statements = SCHEMA.len(), "Schema up to date");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn check_pgvector(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) =
        sqlx::query_as("SELECT extversion FROM pg_extension WHERE extname = 'vector'")
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}
