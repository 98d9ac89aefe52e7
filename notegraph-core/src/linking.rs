//! Linking orchestration: one note against the whole corpus
//!
//! `analyze` is the pure half: snapshot the corpus, extract (or fetch cached)
//! features, score and classify every pair in parallel, then apply manual
//! precedence, the per-type cap and the per-note cap. `link` turns the accepted candidates into
//! an `EdgeWritePlan` for `EdgeWriter` to apply. Nothing here touches a store.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::{classify, RelationshipCandidate};
use crate::error::{FeatureExtractionError, NotegraphError};
use crate::features::{CorpusSnapshot, FeatureBundle, FeatureCache, FeatureExtractor};
use crate::models::{Note, Origin, Relationship, RelationshipCategory, RelationshipType};
use crate::patterns::PatternDetector;
use crate::profile::ConfigProfile;
use crate::scoring::score;

/// A corpus note that could not take part in the analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedNote {
    pub note_id: Uuid,
    pub reason: String,
}

impl From<FeatureExtractionError> for SkippedNote {
    fn from(e: FeatureExtractionError) -> Self {
        Self {
            note_id: e.note_id(),
            reason: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub note_id: Uuid,
    pub profile: String,
    pub snapshot_version: u64,
    pub pairs_evaluated: usize,
    /// Kept candidates, best first, at most `max_relationships_per_note`.
    pub accepted: Vec<RelationshipCandidate>,
    /// Qualified but cut by the per-type or per-note cap, best first.
    pub over_cap: Vec<RelationshipCandidate>,
    /// Qualified but already covered by a manual edge.
    pub manual_overrides: Vec<RelationshipCandidate>,
    /// Directional candidates whose inverse is already stored from the other side.
    pub already_linked: Vec<RelationshipCandidate>,
    /// Pairs where no threshold was met.
    pub unrelated: usize,
    pub failures: Vec<SkippedNote>,
}

impl Analysis {
    /// Accepted candidates grouped for display.
    pub fn categorized(&self) -> BTreeMap<RelationshipCategory, Vec<&RelationshipCandidate>> {
        let mut groups: BTreeMap<RelationshipCategory, Vec<&RelationshipCandidate>> =
            BTreeMap::new();
        for c in &self.accepted {
            groups.entry(c.rel_type.category()).or_default().push(c);
        }
        groups
    }

    pub fn plan(&self) -> EdgeWritePlan {
        EdgeWritePlan {
            note_id: self.note_id,
            profile: self.profile.clone(),
            writes: self.accepted.iter().map(EdgeWrite::from_candidate).collect(),
        }
    }
}

/// One create-if-absent instruction. Symmetric types are written as a
/// forward + reverse pair that must land together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeWrite {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub rel_type: RelationshipType,
    pub bidirectional: bool,
    pub score: f32,
    pub description: String,
}

impl EdgeWrite {
    fn from_candidate(c: &RelationshipCandidate) -> Self {
        Self {
            source_id: c.source_id,
            target_id: c.target_id,
            rel_type: c.rel_type,
            bidirectional: c.rel_type.is_symmetric(),
            score: c.composite_score,
            description: c.evidence.describe(),
        }
    }

    pub fn to_relationship(&self) -> Relationship {
        let mut edge = Relationship::automatic(
            self.source_id,
            self.target_id,
            self.rel_type,
            self.bidirectional,
            self.score,
        );
        edge.description = Some(self.description.clone());
        edge
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeWritePlan {
    pub note_id: Uuid,
    pub profile: String,
    pub writes: Vec<EdgeWrite>,
}

enum PairOutcome {
    Candidate(RelationshipCandidate),
    Unrelated,
    Failed(SkippedNote),
}

pub struct LinkingOrchestrator {
    extractor: Arc<FeatureExtractor>,
    cache: Option<Arc<FeatureCache>>,
}

impl LinkingOrchestrator {
    pub fn new(extractor: Arc<FeatureExtractor>) -> Self {
        Self {
            extractor,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<FeatureCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Orchestrator with a fresh extractor and no cache.
    pub fn standalone() -> Result<Self, NotegraphError> {
        Ok(Self::new(Arc::new(FeatureExtractor::new()?)))
    }

    fn features(
        &self,
        note: &Note,
        snapshot: &CorpusSnapshot,
    ) -> Result<Arc<FeatureBundle>, FeatureExtractionError> {
        match &self.cache {
            Some(cache) => cache.get_or_extract(&self.extractor, note, snapshot),
            None => self.extractor.extract(note, snapshot).map(Arc::new),
        }
    }

    /// Classify `note` against every other corpus member without writing.
    ///
    /// Fails only when `note` itself cannot be featurized; other notes that
    /// fail are listed in `failures` and skipped.
    pub fn analyze(
        &self,
        note: &Note,
        corpus: &[Note],
        profile: &ConfigProfile,
        existing: &[Relationship],
    ) -> Result<Analysis, FeatureExtractionError> {
        let snapshot = if corpus.iter().any(|n| n.id == note.id) {
            self.extractor.snapshot(corpus)
        } else {
            let mut all = corpus.to_vec();
            all.push(note.clone());
            self.extractor.snapshot(&all)
        };

        let source = self.features(note, &snapshot)?;
        let detector = PatternDetector::from_profile(profile);

        let outcomes: Vec<PairOutcome> = corpus
            .par_iter()
            .filter(|other| other.id != note.id)
            .map(|other| {
                let target = match self.features(other, &snapshot) {
                    Ok(f) => f,
                    Err(e) => return PairOutcome::Failed(e.into()),
                };
                let pair = score(&source, &target, &profile.weights);
                let patterns = detector.detect(&source, &target);
                match classify(&pair, &patterns, profile) {
                    Some(c) => PairOutcome::Candidate(c),
                    None => PairOutcome::Unrelated,
                }
            })
            .collect();

        let pairs_evaluated = outcomes.len();
        let mut candidates = Vec::new();
        let mut manual_overrides = Vec::new();
        let mut already_linked = Vec::new();
        let mut unrelated = 0;
        let mut failures = Vec::new();

        for outcome in outcomes {
            match outcome {
                PairOutcome::Candidate(c) if has_manual_edge(existing, &c) => {
                    manual_overrides.push(c)
                }
                PairOutcome::Candidate(c) if has_inverse_edge(existing, &c) => {
                    already_linked.push(c)
                }
                PairOutcome::Candidate(c) => candidates.push(c),
                PairOutcome::Unrelated => unrelated += 1,
                PairOutcome::Failed(f) => failures.push(f),
            }
        }

        candidates.sort_by(rank);
        let mut per_type: BTreeMap<RelationshipType, usize> = BTreeMap::new();
        let (mut candidates, mut over_cap): (Vec<_>, Vec<_>) =
            candidates.into_iter().partition(|c| {
                let seen = per_type.entry(c.rel_type).or_insert(0);
                *seen += 1;
                *seen <= profile.max_relationships_per_type
            });
        let cap = profile.max_relationships_per_note.min(candidates.len());
        over_cap.extend(candidates.split_off(cap));
        over_cap.sort_by(rank);

        tracing::debug!(
            note_id = %note.id,
            profile = %profile.name,
            snapshot = snapshot.version(),
            pairs = pairs_evaluated,
            accepted = candidates.len(),
            over_cap = over_cap.len(),
            manual = manual_overrides.len(),
            already_linked = already_linked.len(),
            failures = failures.len(),
            "Analysis complete"
        );

        Ok(Analysis {
            note_id: note.id,
            profile: profile.name.clone(),
            snapshot_version: snapshot.version(),
            pairs_evaluated,
            accepted: candidates,
            over_cap,
            manual_overrides,
            already_linked,
            unrelated,
            failures,
        })
    }

    pub fn link(
        &self,
        note: &Note,
        corpus: &[Note],
        profile: &ConfigProfile,
        existing: &[Relationship],
    ) -> Result<EdgeWritePlan, FeatureExtractionError> {
        Ok(self.analyze(note, corpus, profile, existing)?.plan())
    }
}

/// A manual edge already states this relationship, read in either direction.
fn has_manual_edge(existing: &[Relationship], c: &RelationshipCandidate) -> bool {
    existing.iter().filter(|e| e.origin == Origin::Manual).any(|e| {
        (e.source_id == c.source_id && e.target_id == c.target_id && e.rel_type == c.rel_type)
            || (e.source_id == c.target_id
                && e.target_id == c.source_id
                && e.rel_type == c.rel_type.inverse())
    })
}

/// Best composite first; ties broken by target then type for a stable order.
fn rank(a: &RelationshipCandidate, b: &RelationshipCandidate) -> Ordering {
    b.composite_score
        .total_cmp(&a.composite_score)
        .then(a.target_id.cmp(&b.target_id))
        .then(a.rel_type.cmp(&b.rel_type))
}

/// An automatic edge stored from the target's side already expresses this
/// directional candidate, e.g. `B CONTAINED_BY A` for a planned `A CONTAINS B`.
fn has_inverse_edge(existing: &[Relationship], c: &RelationshipCandidate) -> bool {
    if c.rel_type.is_symmetric() {
        return false;
    }
    existing.iter().filter(|e| e.origin == Origin::Automatic).any(|e| {
        e.source_id == c.target_id
            && e.target_id == c.source_id
            && e.rel_type == c.rel_type.inverse()
    })
}

// ============================================================================
// TESTS
// ============================================================================
