//! Pairwise similarity scoring
//!
//! Four dimensions per pair, each in [0, 1]:
//! - semantic: embedding cosine, `None` when either side has no embedding
//! - keyword: cosine of the TF-IDF vectors over shared terms
//! - structural: 1 - normalized L1 distance between signatures
//! - topic: Jaccard overlap of topic-term sets
//!
//! Composite = Σ(w·s) / Σ(w) over the dimensions that are available, so a
//! missing embedding redistributes its weight instead of counting as zero.
//!
//! Concept overlap (Jaccard of the named-concept sets) rides along on the
//! score but stays out of the composite; only CONCEPTUALLY_RELATED reads it.
//! Every function here is pure and symmetric in its two bundles.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::features::{FeatureBundle, SIGNATURE_MAX_BUCKET, SIGNATURE_SLOTS};
use crate::profile::DimensionWeights;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    pub source_id: Uuid,
    pub target_id: Uuid,
    /// `None` means the dimension was unavailable, not that it scored zero.
    pub semantic: Option<f32>,
    pub keyword: f32,
    pub structural: f32,
    pub topic: f32,
    pub concept: f32,
    pub composite: f32,
    /// Both notes carry markdown markup.
    pub shared_markup: bool,
}

impl PairScore {
    /// Assemble a score from precomputed dimensions, with zero concept overlap.
    #[allow(clippy::too_many_arguments)]
    pub fn from_dimensions(
        source_id: Uuid,
        target_id: Uuid,
        semantic: Option<f32>,
        keyword: f32,
        structural: f32,
        topic: f32,
        shared_markup: bool,
        weights: &DimensionWeights,
    ) -> Self {
        Self {
            source_id,
            target_id,
            semantic,
            keyword,
            structural,
            topic,
            concept: 0.0,
            composite: composite(semantic, keyword, structural, topic, weights),
            shared_markup,
        }
    }

    pub fn with_concept(mut self, concept: f32) -> Self {
        self.concept = concept.clamp(0.0, 1.0);
        self
    }

    pub fn semantic_available(&self) -> bool {
        self.semantic.is_some()
    }
}

/// Score bundle `a` (source) against bundle `b` (target).
pub fn score(a: &FeatureBundle, b: &FeatureBundle, weights: &DimensionWeights) -> PairScore {
    let semantic = match (&a.embedding, &b.embedding) {
        (Some(x), Some(y)) => cosine(x, y),
        _ => None,
    };

    PairScore::from_dimensions(
        a.note_id,
        b.note_id,
        semantic,
        keyword_similarity(a, b),
        structural_similarity(a, b),
        jaccard(&a.topics, &b.topics),
        a.structure.has_markup() && b.structure.has_markup(),
        weights,
    )
    .with_concept(jaccard(&a.concepts, &b.concepts))
}

/// Weighted mean over available dimensions.
pub fn composite(
    semantic: Option<f32>,
    keyword: f32,
    structural: f32,
    topic: f32,
    weights: &DimensionWeights,
) -> f32 {
    let mut total = weights.keyword * keyword + weights.structural * structural + weights.topic * topic;
    let mut weight_sum = weights.keyword + weights.structural + weights.topic;

    if let Some(s) = semantic {
        total += weights.semantic * s;
        weight_sum += weights.semantic;
    }

    if weight_sum <= 0.0 {
        return 0.0;
    }
    (total / weight_sum).clamp(0.0, 1.0)
}

/// Cosine similarity clamped to [0, 1]. `None` on dimension mismatch or zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some((dot / (norm_a * norm_b)).clamp(0.0, 1.0))
}

/// Dot product of two normalized TF-IDF vectors.
///
/// Merge-join over the sorted term maps so the summation order does not depend
/// on which bundle is on the left.
pub fn keyword_similarity(a: &FeatureBundle, b: &FeatureBundle) -> f32 {
    let mut left = a.keywords.iter().peekable();
    let mut right = b.keywords.iter().peekable();
    let mut dot = 0.0f32;

    while let (Some((ka, wa)), Some((kb, wb))) = (left.peek(), right.peek()) {
        match ka.cmp(kb) {
            Ordering::Less => {
                left.next();
            }
            Ordering::Greater => {
                right.next();
            }
            Ordering::Equal => {
                dot += **wa * **wb;
                left.next();
                right.next();
            }
        }
    }

    dot.clamp(0.0, 1.0)
}

pub fn structural_similarity(a: &FeatureBundle, b: &FeatureBundle) -> f32 {
    let max = (SIGNATURE_SLOTS as u32 * SIGNATURE_MAX_BUCKET as u32) as f32;
    1.0 - a.structure.l1_distance(&b.structure) as f32 / max
}

pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f32 / union as f32
}

// ============================================================================
// TESTS
// ============================================================================
