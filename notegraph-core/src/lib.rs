pub mod classify;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod features;
pub mod ipc;
pub mod linking;
pub mod models;
pub mod patterns;
pub mod profile;
pub mod scoring;
pub mod store;
pub mod writer;

pub use classify::{classify, DecisionBasis, Evidence, RelationshipCandidate, ScoreBasis};
pub use config::NotegraphConfig;
pub use embeddings::{
    create_backend, BackendConfig, EmbeddingBackend, EmbeddingError, FallbackEmbeddingClient,
    HttpEmbeddingClient, HttpEmbeddingConfig,
};
pub use error::{EdgeWriteError, FeatureExtractionError, NotegraphError, StoreError};
pub use features::{CorpusSnapshot, FeatureBundle, FeatureCache, FeatureExtractor};
pub use linking::{Analysis, EdgeWrite, EdgeWritePlan, LinkingOrchestrator, SkippedNote};
pub use models::{EdgeKey, Note, NoteSummary, Origin, Relationship, RelationshipType};
pub use patterns::{PatternDetector, PatternSignal};
pub use profile::{ConfigProfile, ProfileCatalog, ProfileOverrides, ProfileSelection};
pub use scoring::{score, PairScore};
pub use store::{GraphStore, InsertOutcome, MemoryStore, NoteStore, PgStore};
pub use writer::{EdgeWriter, LinkReport, UpsertOutcome};
