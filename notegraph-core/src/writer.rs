//! Edge persistence with per-pair locking and retry
//!
//! Every write for a pair of notes and a relationship type goes through one
//! async mutex keyed by the direction-free pair, so a forward row and its
//! reverse are always written (or rolled back) together.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use uuid::Uuid;

use crate::error::{EdgeWriteError, StoreError};
use crate::linking::EdgeWritePlan;
use crate::models::{EdgeKey, Origin, Relationship, RelationshipType};
use crate::store::{GraphStore, InsertOutcome};

type PairKey = (Uuid, Uuid, RelationshipType);

/// Registry of per-pair mutexes. Entries are dropped once nobody holds or
/// waits on them.
#[derive(Default)]
pub struct EdgeLocks {
    inner: DashMap<PairKey, Arc<Mutex<()>>>,
}

pub struct EdgeGuard<'a> {
    locks: &'a EdgeLocks,
    key: PairKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl EdgeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &EdgeKey) -> EdgeGuard<'_> {
        let pair = key.pair_key();
        let mutex = self.inner.entry(pair).or_default().clone();
        let guard = mutex.lock_owned().await;
        EdgeGuard {
            locks: self,
            key: pair,
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Drop for EdgeGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .inner
            .remove_if(&self.key, |_, m| Arc::strong_count(m) == 1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    AlreadyExists,
    /// An existing row was overwritten: a manual write took over an
    /// automatic edge, or the stored direction flag changed.
    Replaced,
}

/// One row written by `write_side`, with whatever it displaced.
#[derive(Debug)]
enum SideWrite {
    Created,
    AlreadyExists,
    Replaced(Relationship),
}

impl SideWrite {
    fn outcome(&self) -> UpsertOutcome {
        match self {
            SideWrite::Created => UpsertOutcome::Created,
            SideWrite::AlreadyExists => UpsertOutcome::AlreadyExists,
            SideWrite::Replaced(_) => UpsertOutcome::Replaced,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub forward: bool,
    pub reverse: bool,
}

impl DeleteOutcome {
    pub fn removed(&self) -> bool {
        self.forward || self.reverse
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteFailure {
    pub key: EdgeKey,
    pub kind: String,
    pub message: String,
}

/// What happened to each write in a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkReport {
    pub note_id: Uuid,
    pub profile: String,
    pub created: Vec<Relationship>,
    pub skipped: Vec<EdgeKey>,
    pub failed: Vec<WriteFailure>,
}

pub struct EdgeWriter {
    graph: Arc<dyn GraphStore>,
    locks: EdgeLocks,
    retries: usize,
    retry_delay_ms: u64,
}

impl EdgeWriter {
    pub fn new(graph: Arc<dyn GraphStore>, retries: usize, retry_delay_ms: u64) -> Self {
        Self {
            graph,
            locks: EdgeLocks::new(),
            retries,
            retry_delay_ms,
        }
    }

    pub fn graph(&self) -> &Arc<dyn GraphStore> {
        &self.graph
    }

    pub fn locks(&self) -> &EdgeLocks {
        &self.locks
    }

    fn strategy(&self) -> impl Iterator<Item = std::time::Duration> {
        ExponentialBackoff::from_millis(self.retry_delay_ms.max(1))
            .max_delay(std::time::Duration::from_secs(2))
            .map(jitter)
            .take(self.retries)
    }

    async fn insert(&self, edge: &Relationship) -> Result<InsertOutcome, StoreError> {
        RetryIf::spawn(
            self.strategy(),
            || self.graph.insert_edge(edge),
            |e: &StoreError| e.is_transient(),
        )
        .await
    }

    async fn remove(&self, key: &EdgeKey) -> Result<bool, StoreError> {
        RetryIf::spawn(
            self.strategy(),
            || self.graph.remove_edge(key),
            |e: &StoreError| e.is_transient(),
        )
        .await
    }

    /// Insert one side. Manual writes supersede automatic rows; automatic
    /// writes never touch a manual row. A row of the same origin is rewritten
    /// only when its direction flag differs.
    async fn write_side(&self, edge: &Relationship) -> Result<SideWrite, EdgeWriteError> {
        let conflict = |reason: String| EdgeWriteError::Conflict {
            key: edge.key(),
            reason,
        };
        let outcome = match self.insert(edge).await {
            Ok(o) => o,
            Err(StoreError::NoteMissing(id)) => {
                return Err(conflict(format!("note {} does not exist", id)))
            }
            Err(StoreError::SelfRelationship(_)) => {
                return Err(conflict("source and target are the same note".to_string()))
            }
            Err(StoreError::Conflict(reason)) => return Err(conflict(reason)),
            Err(e) => return Err(e.into()),
        };

        let existing = match outcome {
            InsertOutcome::Created => return Ok(SideWrite::Created),
            InsertOutcome::Exists(existing) => existing,
        };
        let replace = match (existing.origin, edge.origin) {
            (Origin::Manual, Origin::Automatic) => {
                return Err(conflict("a manual edge already exists".to_string()))
            }
            (Origin::Automatic, Origin::Manual) => true,
            _ => existing.bidirectional != edge.bidirectional,
        };
        if !replace {
            return Ok(SideWrite::AlreadyExists);
        }
        self.graph.replace_edge(edge).await?;
        Ok(SideWrite::Replaced(existing))
    }

    /// Put the forward row back the way it was before `forward` was written.
    async fn undo_side(&self, key: &EdgeKey, forward: &SideWrite) -> bool {
        let undone = match forward {
            SideWrite::AlreadyExists => return true,
            SideWrite::Created => self.remove(key).await,
            SideWrite::Replaced(previous) => self.graph.replace_edge(previous).await,
        };
        match undone {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(edge = %key, error = %e, "Rollback of forward edge failed");
                false
            }
        }
    }

    /// Create-if-absent for one edge, and its reverse when `bidirectional`.
    ///
    /// If the reverse cannot be written, the forward row is restored to its
    /// prior state (removed if this call created it, rewritten if this call
    /// replaced it) and `EdgeWriteError::Bidirectional` is returned.
    pub async fn upsert_edge(
        &self,
        edge: &Relationship,
        bidirectional: bool,
    ) -> Result<UpsertOutcome, EdgeWriteError> {
        let key = edge.key();
        let _guard = self.locks.acquire(&key).await;

        let forward = self.write_side(edge).await?;
        if !bidirectional {
            return Ok(forward.outcome());
        }

        match self.write_side(&edge.reversed()).await {
            Ok(reverse) => Ok(match (forward.outcome(), reverse.outcome()) {
                (UpsertOutcome::Created, _) | (_, UpsertOutcome::Created) => UpsertOutcome::Created,
                (UpsertOutcome::Replaced, _) | (_, UpsertOutcome::Replaced) => {
                    UpsertOutcome::Replaced
                }
                _ => UpsertOutcome::AlreadyExists,
            }),
            Err(cause) => {
                let rolled_back = self.undo_side(&key, &forward).await;
                tracing::warn!(edge = %key, rolled_back, error = %cause, "Reverse edge write failed");
                Err(EdgeWriteError::Bidirectional {
                    key,
                    rolled_back,
                    cause: cause.to_string(),
                })
            }
        }
    }

    /// Remove one edge. The reverse row goes too when `bidirectional` is set
    /// or the stored edge is itself bidirectional, so a pair is never left
    /// half-deleted. A forward row removed before the reverse fails is restored.
    pub async fn delete_edge(
        &self,
        key: &EdgeKey,
        bidirectional: bool,
    ) -> Result<DeleteOutcome, EdgeWriteError> {
        let _guard = self.locks.acquire(key).await;

        let stored = self.graph.get_edge(key).await?;
        let pair = bidirectional || stored.as_ref().is_some_and(|e| e.bidirectional);

        let forward = self.remove(key).await?;
        if !pair {
            return Ok(DeleteOutcome {
                forward,
                reverse: false,
            });
        }

        match self.remove(&key.reversed()).await {
            Ok(reverse) => Ok(DeleteOutcome { forward, reverse }),
            Err(cause) => {
                let rolled_back = match stored {
                    Some(edge) if forward => self.insert(&edge).await.is_ok(),
                    _ => !forward,
                };
                tracing::warn!(edge = %key, rolled_back, error = %cause, "Reverse edge delete failed");
                Err(EdgeWriteError::Bidirectional {
                    key: *key,
                    rolled_back,
                    cause: cause.to_string(),
                })
            }
        }
    }

    /// Apply every write of a plan. Per-edge failures are collected; an
    /// unavailable store stops the run.
    pub async fn apply_plan(&self, plan: &EdgeWritePlan) -> Result<LinkReport, EdgeWriteError> {
        let mut report = LinkReport {
            note_id: plan.note_id,
            profile: plan.profile.clone(),
            ..Default::default()
        };

        for write in &plan.writes {
            let edge = write.to_relationship();
            match self.upsert_edge(&edge, write.bidirectional).await {
                Ok(UpsertOutcome::Created) | Ok(UpsertOutcome::Replaced) => {
                    report.created.push(edge)
                }
                Ok(UpsertOutcome::AlreadyExists) => report.skipped.push(edge.key()),
                Err(e) if e.is_fatal() => {
                    tracing::error!(note_id = %plan.note_id, error = %e, "Aborting link run");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(edge = %edge.key(), kind = e.kind(), error = %e, "Edge write failed");
                    report.failed.push(WriteFailure {
                        key: edge.key(),
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            note_id = %plan.note_id,
            profile = %plan.profile,
            created = report.created.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Link run applied"
        );
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linking::EdgeWrite;
    use crate::models::Note;
    use crate::store::{MemoryStore, NoteStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Delegates to a MemoryStore, failing inserts whose source is `poisoned`,
    /// inserts whose target is `conflicted` and removals whose source is
    /// `undeletable`.
    struct FlakyGraph {
        inner: MemoryStore,
        poisoned: Option<Uuid>,
        conflicted: Option<Uuid>,
        undeletable: Option<Uuid>,
        transient_failures: AtomicUsize,
    }

    impl FlakyGraph {
        fn over(inner: Arc<MemoryStore>) -> Self {
            Self {
                inner: Arc::try_unwrap(inner).ok().unwrap(),
                poisoned: None,
                conflicted: None,
                undeletable: None,
                transient_failures: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GraphStore for FlakyGraph {
        async fn insert_edge(&self, edge: &Relationship) -> Result<InsertOutcome, StoreError> {
            if self.transient_failures.load(Ordering::SeqCst) > 0 {
                self.transient_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("blip".to_string()));
            }
            if Some(edge.source_id) == self.poisoned {
                return Err(StoreError::Database(sqlx::Error::RowNotFound));
            }
            if Some(edge.target_id) == self.conflicted {
                return Err(StoreError::Conflict("removed concurrently".to_string()));
            }
            self.inner.insert_edge(edge).await
        }
        async fn replace_edge(&self, edge: &Relationship) -> Result<bool, StoreError> {
            self.inner.replace_edge(edge).await
        }
        async fn get_edge(&self, key: &EdgeKey) -> Result<Option<Relationship>, StoreError> {
            self.inner.get_edge(key).await
        }
        async fn remove_edge(&self, key: &EdgeKey) -> Result<bool, StoreError> {
            if Some(key.source_id) == self.undeletable {
                return Err(StoreError::Database(sqlx::Error::RowNotFound));
            }
            self.inner.remove_edge(key).await
        }
        async fn list_edges(&self, note_id: Uuid) -> Result<Vec<Relationship>, StoreError> {
            self.inner.list_edges(note_id).await
        }
        async fn remove_edges_for_note(&self, note_id: Uuid) -> Result<u64, StoreError> {
            self.inner.remove_edges_for_note(note_id).await
        }
        fn backend_name(&self) -> &str {
            "flaky"
        }
    }

    async fn two_notes() -> (Arc<MemoryStore>, Note, Note) {
        let store = Arc::new(MemoryStore::new());
        let a = Note::new("a", "alpha");
        let b = Note::new("b", "beta");
        store.insert_note(&a).await.unwrap();
        store.insert_note(&b).await.unwrap();
        (store, a, b)
    }

    // ========================================================================
    // TEST 1: Bidirectional upsert writes both rows, repeat is a no-op
    // ========================================================================
    #[tokio::test]
    async fn test_bidirectional_upsert_is_idempotent() {
        let (store, a, b) = two_notes().await;
        let writer = EdgeWriter::new(store.clone(), 2, 1);
        let edge = Relationship::automatic(a.id, b.id, RelationshipType::HighlyRelated, true, 0.9);

        assert_eq!(writer.upsert_edge(&edge, true).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(
            writer.upsert_edge(&edge, true).await.unwrap(),
            UpsertOutcome::AlreadyExists
        );
        assert_eq!(store.edge_count().await, 2);
        assert!(writer.locks().is_empty());
    }

    // ========================================================================
    // TEST 2: Reverse failure rolls back the forward row
    // ========================================================================
    #[tokio::test]
    async fn test_reverse_failure_rolls_back_forward() {
        let (inner, a, b) = two_notes().await;
        let graph = Arc::new(FlakyGraph {
            poisoned: Some(b.id),
            ..FlakyGraph::over(inner)
        });
        let writer = EdgeWriter::new(graph.clone(), 2, 1);
        let edge = Relationship::automatic(a.id, b.id, RelationshipType::KeywordRelated, true, 0.7);

        let err = writer.upsert_edge(&edge, true).await.unwrap_err();
        assert!(matches!(
            err,
            EdgeWriteError::Bidirectional {
                rolled_back: true,
                ..
            }
        ));
        assert_eq!(err.kind(), "bidirectional_write_failure");
        assert_eq!(graph.inner.edge_count().await, 0);
    }

    // ========================================================================
    // TEST 3: Transient errors are retried
    // ========================================================================
    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let (inner, a, b) = two_notes().await;
        let graph = Arc::new(FlakyGraph {
            transient_failures: AtomicUsize::new(2),
            ..FlakyGraph::over(inner)
        });
        let writer = EdgeWriter::new(graph.clone(), 3, 1);
        let edge = Relationship::automatic(a.id, b.id, RelationshipType::Contains, false, 0.6);

        assert_eq!(writer.upsert_edge(&edge, false).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(graph.inner.edge_count().await, 1);
    }

    // ========================================================================
    // TEST 4: Automatic writes never overwrite manual edges
    // ========================================================================
    #[tokio::test]
    async fn test_manual_edge_wins_over_automatic() {
        let (store, a, b) = two_notes().await;
        let writer = EdgeWriter::new(store.clone(), 1, 1);
        let manual = Relationship::manual(a.id, b.id, RelationshipType::Related, false, None);
        writer.upsert_edge(&manual, false).await.unwrap();

        let auto = Relationship::automatic(a.id, b.id, RelationshipType::Related, false, 0.8);
        let err = writer.upsert_edge(&auto, false).await.unwrap_err();
        assert_eq!(err.kind(), "edge_write_conflict");
        let stored = store.get_edge(&manual.key()).await.unwrap().unwrap();
        assert_eq!(stored.origin, Origin::Manual);
    }

    #[tokio::test]
    async fn test_manual_write_replaces_automatic() {
        let (store, a, b) = two_notes().await;
        let writer = EdgeWriter::new(store.clone(), 1, 1);
        let auto = Relationship::automatic(a.id, b.id, RelationshipType::Related, false, 0.8);
        writer.upsert_edge(&auto, false).await.unwrap();

        let manual = Relationship::manual(a.id, b.id, RelationshipType::Related, false, None);
        assert_eq!(
            writer.upsert_edge(&manual, false).await.unwrap(),
            UpsertOutcome::Replaced
        );
        let stored = store.get_edge(&manual.key()).await.unwrap().unwrap();
        assert_eq!(stored.origin, Origin::Manual);
    }

    // ========================================================================
    // TEST 5: Missing endpoints are reported, not fatal
    // ========================================================================
    #[tokio::test]
    async fn test_apply_plan_collects_failures() {
        let (store, a, b) = two_notes().await;
        let writer = EdgeWriter::new(store.clone(), 1, 1);
        let ghost = Uuid::new_v4();
        let plan = EdgeWritePlan {
            note_id: a.id,
            profile: "default".to_string(),
            writes: vec![
                EdgeWrite {
                    source_id: a.id,
                    target_id: b.id,
                    rel_type: RelationshipType::SemanticallyRelated,
                    bidirectional: true,
                    score: 0.75,
                    description: "semantic score 0.82 >= 0.70".to_string(),
                },
                EdgeWrite {
                    source_id: a.id,
                    target_id: ghost,
                    rel_type: RelationshipType::LooselyRelated,
                    bidirectional: true,
                    score: 0.55,
                    description: "composite score 0.55 >= 0.50".to_string(),
                },
            ],
        };

        let report = writer.apply_plan(&plan).await.unwrap();
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].kind, "edge_write_conflict");
        assert_eq!(store.edge_count().await, 2);

        let again = writer.apply_plan(&plan).await.unwrap();
        assert!(again.created.is_empty());
        assert_eq!(again.skipped.len(), 1);
    }

    // ========================================================================
    // TEST 6: Concurrent writers on the same pair produce one pair of rows
    // ========================================================================
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_serialize_per_pair() {
        let (store, a, b) = two_notes().await;
        let writer = Arc::new(EdgeWriter::new(store.clone(), 1, 1));
        let created = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..8 {
            let writer = writer.clone();
            let created = created.clone();
            // Half the tasks write from the other side
            let edge = if i % 2 == 0 {
                Relationship::automatic(a.id, b.id, RelationshipType::TopicallyRelated, true, 0.6)
            } else {
                Relationship::automatic(b.id, a.id, RelationshipType::TopicallyRelated, true, 0.6)
            };
            handles.push(tokio::spawn(async move {
                if writer.upsert_edge(&edge, true).await.unwrap() == UpsertOutcome::Created {
                    created.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(store.edge_count().await, 2);
        assert!(writer.locks().is_empty());
    }

    #[tokio::test]
    async fn test_delete_edge_removes_both_sides() {
        let (store, a, b) = two_notes().await;
        let writer = EdgeWriter::new(store.clone(), 1, 1);
        let edge = Relationship::manual(a.id, b.id, RelationshipType::Related, true, None);
        writer.upsert_edge(&edge, true).await.unwrap();

        let outcome = writer.delete_edge(&edge.key(), true).await.unwrap();
        assert!(outcome.forward && outcome.reverse);
        assert_eq!(store.edge_count().await, 0);
        assert!(!writer.delete_edge(&edge.key(), true).await.unwrap().removed());
    }

    // ========================================================================
    // TEST 7: Deleting one side of a bidirectional edge removes both rows
    // ========================================================================
    #[tokio::test]
    async fn test_one_sided_delete_of_bidirectional_edge() {
        let (store, a, b) = two_notes().await;
        let writer = EdgeWriter::new(store.clone(), 1, 1);
        let edge = Relationship::automatic(a.id, b.id, RelationshipType::HighlyRelated, true, 0.9);
        writer.upsert_edge(&edge, true).await.unwrap();

        // Caller did not ask for the pair, and names the reverse row.
        let outcome = writer.delete_edge(&edge.key().reversed(), false).await.unwrap();
        assert!(outcome.forward && outcome.reverse);
        assert_eq!(store.edge_count().await, 0);

        let one_way = Relationship::manual(a.id, b.id, RelationshipType::Prerequisite, false, None);
        let back = Relationship::manual(b.id, a.id, RelationshipType::Prerequisite, false, None);
        writer.upsert_edge(&one_way, false).await.unwrap();
        writer.upsert_edge(&back, false).await.unwrap();
        let outcome = writer.delete_edge(&one_way.key(), false).await.unwrap();
        assert!(outcome.forward && !outcome.reverse);
        assert!(store.get_edge(&back.key()).await.unwrap().is_some());
    }

    // ========================================================================
    // TEST 8: Failed reverse delete restores the forward row
    // ========================================================================
    #[tokio::test]
    async fn test_failed_reverse_delete_restores_forward() {
        let (inner, a, b) = two_notes().await;
        let graph = Arc::new(FlakyGraph {
            undeletable: Some(b.id),
            ..FlakyGraph::over(inner)
        });
        let writer = EdgeWriter::new(graph.clone(), 1, 1);
        let edge = Relationship::manual(a.id, b.id, RelationshipType::Related, true, None);
        writer.upsert_edge(&edge, true).await.unwrap();

        let err = writer.delete_edge(&edge.key(), false).await.unwrap_err();
        assert!(matches!(
            err,
            EdgeWriteError::Bidirectional {
                rolled_back: true,
                ..
            }
        ));
        assert_eq!(graph.inner.edge_count().await, 2);
        let restored = graph.inner.get_edge(&edge.key()).await.unwrap().unwrap();
        assert_eq!(restored.origin, Origin::Manual);
        assert!(restored.bidirectional);
    }

    // ========================================================================
    // TEST 9: Reverse failure after a replace restores the replaced row
    // ========================================================================
    #[tokio::test]
    async fn test_reverse_failure_restores_replaced_forward() {
        let (inner, a, b) = two_notes().await;
        let graph = Arc::new(FlakyGraph {
            poisoned: Some(b.id),
            ..FlakyGraph::over(inner)
        });
        let auto = Relationship::automatic(a.id, b.id, RelationshipType::Related, false, 0.6);
        graph.inner.insert_edge(&auto).await.unwrap();
        let writer = EdgeWriter::new(graph.clone(), 1, 1);

        let manual = Relationship::manual(a.id, b.id, RelationshipType::Related, true, None);
        let err = writer.upsert_edge(&manual, true).await.unwrap_err();
        assert!(matches!(
            err,
            EdgeWriteError::Bidirectional {
                rolled_back: true,
                ..
            }
        ));

        let stored = graph.inner.get_edge(&auto.key()).await.unwrap().unwrap();
        assert_eq!(stored.origin, Origin::Automatic);
        assert!(!stored.bidirectional);
        assert_eq!(stored.score, Some(0.6));
        assert_eq!(graph.inner.edge_count().await, 1);
    }

    // ========================================================================
    // TEST 10: A changed direction flag rewrites an automatic row
    // ========================================================================
    #[tokio::test]
    async fn test_direction_flag_change_replaces_row() {
        let (store, a, b) = two_notes().await;
        let writer = EdgeWriter::new(store.clone(), 1, 1);
        let one_way = Relationship::automatic(a.id, b.id, RelationshipType::LooselyRelated, false, 0.5);
        writer.upsert_edge(&one_way, false).await.unwrap();

        let pair = Relationship::automatic(a.id, b.id, RelationshipType::LooselyRelated, true, 0.5);
        assert_eq!(writer.upsert_edge(&pair, true).await.unwrap(), UpsertOutcome::Created);
        assert!(store.get_edge(&pair.key()).await.unwrap().unwrap().bidirectional);
        assert_eq!(store.edge_count().await, 2);
    }

    // ========================================================================
    // TEST 11: A concurrent-removal conflict is reported and the plan continues
    // ========================================================================
    #[tokio::test]
    async fn test_store_conflict_does_not_abort_plan() {
        let (inner, a, b) = two_notes().await;
        let c = Note::new("c", "gamma");
        inner.insert_note(&c).await.unwrap();
        let graph = Arc::new(FlakyGraph {
            conflicted: Some(b.id),
            ..FlakyGraph::over(inner)
        });
        let writer = EdgeWriter::new(graph.clone(), 1, 1);
        let write = |target_id: Uuid| EdgeWrite {
            source_id: a.id,
            target_id,
            rel_type: RelationshipType::KeywordRelated,
            bidirectional: false,
            score: 0.7,
            description: "keyword score 0.70 >= 0.60".to_string(),
        };
        let plan = EdgeWritePlan {
            note_id: a.id,
            profile: "default".to_string(),
            writes: vec![write(b.id), write(c.id)],
        };

        let report = writer.apply_plan(&plan).await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].kind, "edge_write_conflict");
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].target_id, c.id);
    }
}
