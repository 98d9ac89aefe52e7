//! Shared service state
//!
//! One `AppState` is built at startup and shared (behind an `Arc`) by the IPC
//! server, the HTTP API and the backfill worker.

use std::sync::Arc;

use anyhow::Result;
use notegraph_core::config::StoreBackend;
use notegraph_core::embeddings::{create_backend, BackendConfig, EmbeddingBackend};
use notegraph_core::features::{FeatureCache, FeatureExtractor};
use notegraph_core::store::{GraphStore, MemoryStore, NoteStore, PgStore};
use notegraph_core::{EdgeWriter, LinkingOrchestrator, NotegraphConfig, ProfileCatalog};
use sqlx::PgPool;

pub struct AppState {
    pub config: NotegraphConfig,
    pub notes: Arc<dyn NoteStore>,
    pub graph: Arc<dyn GraphStore>,
    /// Present only for the PostgreSQL backend; used by health checks.
    pub pool: Option<PgPool>,
    pub catalog: ProfileCatalog,
    pub orchestrator: Arc<LinkingOrchestrator>,
    pub writer: EdgeWriter,
    pub embedder: Option<Arc<dyn EmbeddingBackend>>,
}

impl AppState {
    /// Build state for the configured store backend, migrating PostgreSQL.
    pub async fn connect(config: NotegraphConfig) -> Result<Self> {
        match config.database.backend {
            StoreBackend::Postgres => {
                let pool = notegraph_core::db::create_pool(&config.database).await?;
                notegraph_core::db::migrate(&pool).await?;
                let store = Arc::new(PgStore::new(pool.clone()));
                Self::assemble(config, store.clone(), store, Some(pool))
            }
            StoreBackend::Memory => Self::in_memory(config),
        }
    }

    /// State over a fresh `MemoryStore`, whatever the database section says.
    pub fn in_memory(config: NotegraphConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        Self::assemble(config, store.clone(), store, None)
    }

    fn assemble(
        config: NotegraphConfig,
        notes: Arc<dyn NoteStore>,
        graph: Arc<dyn GraphStore>,
        pool: Option<PgPool>,
    ) -> Result<Self> {
        let catalog =
            ProfileCatalog::new(&config.linking.default_profile, &config.linking.profiles)?;

        let extractor = Arc::new(FeatureExtractor::new()?);
        let cache = Arc::new(FeatureCache::new(config.linking.feature_cache_capacity));
        let orchestrator = Arc::new(LinkingOrchestrator::new(extractor).with_cache(cache));

        let writer = EdgeWriter::new(
            graph.clone(),
            config.linking.write_retries,
            config.linking.write_retry_delay_ms,
        );

        let embedder = create_backend(BackendConfig::from_settings(&config.embedding)?)?
            .map(Arc::<dyn EmbeddingBackend>::from);

        tracing::info!(
            store = notes.backend_name(),
            embedder = embedder.as_ref().map(|e| e.name()).unwrap_or("none"),
            default_profile = catalog.default_name(),
            profiles = catalog.list().count(),
            "Service state ready"
        );

        Ok(Self {
            config,
            notes,
            graph,
            pool,
            catalog,
            orchestrator,
            writer,
            embedder,
        })
    }

    /// Swap the embedding backend (tests inject mocks here).
    pub fn with_embedder(mut self, embedder: Option<Arc<dyn EmbeddingBackend>>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Embed `text`, treating a failing provider as "no vector yet".
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let backend = self.embedder.as_ref()?;
        match backend.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(backend = backend.name(), error = %e, "Embedding failed, storing note without vector");
                None
            }
        }
    }
}
