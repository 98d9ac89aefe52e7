//! Relationship classification
//!
//! Decision order, first match wins:
//! 1. hierarchical signal (when enabled) → CONTAINS / CONTAINED_BY
//! 2. exactly one sequential direction (when enabled) → PREREQUISITE / FOLLOWS
//! 3. thresholds in `THRESHOLD_PRIORITY` order; CONCEPTUALLY_RELATED reads the
//!    concept overlap and only when concept analysis is enabled
//! 4. nothing → `None`
//!
//! Ties at step 3 go to the earlier type in the priority list, never to the
//! highest score.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{RelationshipType, THRESHOLD_PRIORITY};
use crate::patterns::PatternSignal;
use crate::profile::ConfigProfile;
use crate::scoring::PairScore;

/// Which score a threshold decision was made on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBasis {
    Composite,
    Semantic,
    Topic,
    Structural,
    Keyword,
    Concept,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum DecisionBasis {
    Pattern { signal: PatternSignal },
    Threshold {
        score: ScoreBasis,
        value: f32,
        threshold: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub scores: PairScore,
    pub patterns: Vec<PatternSignal>,
    pub decided_by: DecisionBasis,
}

impl Evidence {
    /// One-line human-readable account of the decision.
    pub fn describe(&self) -> String {
        match self.decided_by {
            DecisionBasis::Pattern { signal } => {
                format!("{} pattern detected", signal.rel_type().as_str().to_lowercase())
            }
            DecisionBasis::Threshold {
                score,
                value,
                threshold,
            } => format!("{:?} score {:.2} >= {:.2}", score, value, threshold).to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipCandidate {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub rel_type: RelationshipType,
    pub composite_score: f32,
    pub evidence: Evidence,
}

pub fn classify(
    scores: &PairScore,
    patterns: &BTreeSet<PatternSignal>,
    profile: &ConfigProfile,
) -> Option<RelationshipCandidate> {
    if scores.source_id == scores.target_id {
        return None;
    }

    let (rel_type, decided_by) = match pattern_decision(patterns, profile) {
        Some(signal) => (signal.rel_type(), DecisionBasis::Pattern { signal }),
        None => threshold_decision(scores, profile)?,
    };

    Some(RelationshipCandidate {
        source_id: scores.source_id,
        target_id: scores.target_id,
        rel_type,
        composite_score: scores.composite,
        evidence: Evidence {
            scores: *scores,
            patterns: patterns.iter().copied().collect(),
            decided_by,
        },
    })
}

fn pattern_decision(
    patterns: &BTreeSet<PatternSignal>,
    profile: &ConfigProfile,
) -> Option<PatternSignal> {
    if profile.enable_hierarchical_detection {
        if let Some(signal) = patterns.iter().find(|p| p.is_hierarchical()) {
            return Some(*signal);
        }
    }

    if profile.enable_sequential_detection {
        let mut sequential = patterns.iter().filter(|p| p.is_sequential());
        // Both directions at once is ambiguous; fall through to thresholds.
        if let (Some(signal), None) = (sequential.next(), sequential.next()) {
            return Some(*signal);
        }
    }

    None
}

fn threshold_decision(
    scores: &PairScore,
    profile: &ConfigProfile,
) -> Option<(RelationshipType, DecisionBasis)> {
    let t = &profile.thresholds;

    for rel_type in THRESHOLD_PRIORITY {
        let hit = match rel_type {
            RelationshipType::HighlyRelated => {
                meets(ScoreBasis::Composite, Some(scores.composite), t.highly_related)
            }
            RelationshipType::SemanticallyRelated => {
                meets(ScoreBasis::Semantic, scores.semantic, t.semantically_related)
            }
            RelationshipType::TopicallyRelated => {
                meets(ScoreBasis::Topic, Some(scores.topic), t.topically_related)
            }
            RelationshipType::StructurallyRelated => {
                if scores.shared_markup {
                    meets(ScoreBasis::Structural, Some(scores.structural), t.structurally_related)
                } else {
                    None
                }
            }
            RelationshipType::KeywordRelated => {
                meets(ScoreBasis::Keyword, Some(scores.keyword), t.keyword_related)
            }
            RelationshipType::LooselyRelated => {
                meets(ScoreBasis::Composite, Some(scores.composite), t.loosely_related)
            }
            RelationshipType::ConceptuallyRelated => {
                if profile.enable_concept_analysis {
                    meets(ScoreBasis::Concept, Some(scores.concept), t.conceptually_related)
                } else {
                    None
                }
            }
            RelationshipType::WeaklyRelated => {
                if profile.enable_weak_relationships {
                    meets(ScoreBasis::Composite, Some(scores.composite), t.weakly_related)
                } else {
                    None
                }
            }
            _ => None,
        };

        if let Some(basis) = hit {
            return Some((rel_type, basis));
        }
    }

    None
}

fn meets(score: ScoreBasis, value: Option<f32>, threshold: f32) -> Option<DecisionBasis> {
    let value = value?;
    (value >= threshold).then_some(DecisionBasis::Threshold {
        score,
        value,
        threshold,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{Hierarchy, Sequence};
    use crate::profile::DimensionWeights;

    fn pair(semantic: Option<f32>, keyword: f32, structural: f32, topic: f32) -> PairScore {
        PairScore::from_dimensions(
            Uuid::new_v4(),
            Uuid::new_v4(),
            semantic,
            keyword,
            structural,
            topic,
            false,
            &DimensionWeights::default(),
        )
    }

    fn signals(items: &[PatternSignal]) -> BTreeSet<PatternSignal> {
        items.iter().copied().collect()
    }

    // ========================================================================
    // TEST 1: Semantic 0.82 with low other dimensions → SEMANTICALLY_RELATED
    // ========================================================================
    #[test]
    fn test_semantic_scenario() {
        let scores = pair(Some(0.82), 0.3, 0.1, 0.2);
        assert!(scores.composite < 0.5);

        let c = classify(&scores, &BTreeSet::new(), &ConfigProfile::default()).unwrap();
        assert_eq!(c.rel_type, RelationshipType::SemanticallyRelated);
        assert!(matches!(
            c.evidence.decided_by,
            DecisionBasis::Threshold {
                score: ScoreBasis::Semantic,
                ..
            }
        ));
    }

    // ========================================================================
    // TEST 2: Hierarchical signal wins over any threshold
    // ========================================================================
    #[test]
    fn test_hierarchy_beats_thresholds() {
        let scores = pair(Some(0.55), 0.5, 0.5, 0.5);
        assert!(scores.composite >= 0.5);

        let c = classify(
            &scores,
            &signals(&[PatternSignal::Hierarchical(Hierarchy::Contains)]),
            &ConfigProfile::default(),
        )
        .unwrap();
        assert_eq!(c.rel_type, RelationshipType::Contains);
    }

    // ========================================================================
    // TEST 3: Hierarchy is checked before sequence
    // ========================================================================
    #[test]
    fn test_hierarchy_before_sequence() {
        let c = classify(
            &pair(None, 0.0, 0.0, 0.0),
            &signals(&[
                PatternSignal::Sequential(Sequence::Prerequisite),
                PatternSignal::Hierarchical(Hierarchy::ContainedBy),
            ]),
            &ConfigProfile::default(),
        )
        .unwrap();
        assert_eq!(c.rel_type, RelationshipType::ContainedBy);
    }

    // ========================================================================
    // TEST 4: Disabled detectors are ignored
    // ========================================================================
    #[test]
    fn test_disabled_detection_falls_through() {
        let mut profile = ConfigProfile::default();
        profile.enable_hierarchical_detection = false;
        profile.enable_sequential_detection = false;

        let c = classify(
            &pair(None, 0.9, 0.0, 0.0),
            &signals(&[
                PatternSignal::Hierarchical(Hierarchy::Contains),
                PatternSignal::Sequential(Sequence::Follows),
            ]),
            &profile,
        )
        .unwrap();
        assert_eq!(c.rel_type, RelationshipType::KeywordRelated);
    }

    // ========================================================================
    // TEST 5: Ambiguous sequence falls through to thresholds
    // ========================================================================
    #[test]
    fn test_ambiguous_sequence_falls_through() {
        let both = signals(&[
            PatternSignal::Sequential(Sequence::Prerequisite),
            PatternSignal::Sequential(Sequence::Follows),
        ]);
        assert!(classify(&pair(None, 0.1, 0.1, 0.1), &both, &ConfigProfile::default()).is_none());

        let one = signals(&[PatternSignal::Sequential(Sequence::Follows)]);
        let c = classify(&pair(None, 0.1, 0.1, 0.1), &one, &ConfigProfile::default()).unwrap();
        assert_eq!(c.rel_type, RelationshipType::Follows);
    }

    // ========================================================================
    // TEST 6: Priority order decides ties, not the highest score
    // ========================================================================
    #[test]
    fn test_priority_beats_highest_score() {
        // topic 0.65 qualifies for TOPICALLY, keyword 0.95 for KEYWORD
        let c = classify(&pair(None, 0.95, 0.0, 0.65), &BTreeSet::new(), &ConfigProfile::default())
            .unwrap();
        assert_eq!(c.rel_type, RelationshipType::TopicallyRelated);
    }

    // ========================================================================
    // TEST 7: Structural threshold needs markup on both sides
    // ========================================================================
    #[test]
    fn test_structural_requires_shared_markup() {
        let profile = ConfigProfile::default();
        let plain = pair(None, 0.0, 1.0, 0.0);
        assert_ne!(
            classify(&plain, &BTreeSet::new(), &profile).map(|c| c.rel_type),
            Some(RelationshipType::StructurallyRelated)
        );

        let mut marked = plain;
        marked.shared_markup = true;
        marked.composite = 0.3;
        let c = classify(&marked, &BTreeSet::new(), &profile).unwrap();
        assert_eq!(c.rel_type, RelationshipType::StructurallyRelated);
    }

    // ========================================================================
    // TEST 8: Nothing qualifies → None; weak links only when enabled
    // ========================================================================
    #[test]
    fn test_weak_relationships_gated() {
        let scores = pair(Some(0.45), 0.45, 0.45, 0.45);
        assert!(scores.composite >= 0.4 && scores.composite < 0.5);

        assert!(classify(&scores, &BTreeSet::new(), &ConfigProfile::default()).is_none());

        let mut profile = ConfigProfile::default();
        profile.enable_weak_relationships = true;
        let c = classify(&scores, &BTreeSet::new(), &profile).unwrap();
        assert_eq!(c.rel_type, RelationshipType::WeaklyRelated);
    }

    // ========================================================================
    // TEST 9: A note is never related to itself
    // ========================================================================
    #[test]
    fn test_no_self_relationship() {
        let id = Uuid::new_v4();
        let scores = PairScore::from_dimensions(
            id,
            id,
            Some(1.0),
            1.0,
            1.0,
            1.0,
            true,
            &DimensionWeights::default(),
        );
        let patterns = signals(&[PatternSignal::Hierarchical(Hierarchy::Contains)]);
        for profile in crate::profile::presets() {
            assert!(classify(&scores, &patterns, &profile).is_none());
        }
    }

    #[test]
    fn test_highly_related_first() {
        let c = classify(&pair(Some(0.9), 0.9, 0.9, 0.9), &BTreeSet::new(), &ConfigProfile::default())
            .unwrap();
        assert_eq!(c.rel_type, RelationshipType::HighlyRelated);
        assert_eq!(c.evidence.describe(), "composite score 0.90 >= 0.80");
    }

    // ========================================================================
    // TEST 10: Shared concepts link otherwise dissimilar notes when enabled
    // ========================================================================
    #[test]
    fn test_concept_overlap_classification() {
        let scores = pair(None, 0.1, 0.2, 0.1).with_concept(0.34);
        assert!(scores.composite < 0.4);

        let c = classify(&scores, &BTreeSet::new(), &ConfigProfile::default()).unwrap();
        assert_eq!(c.rel_type, RelationshipType::ConceptuallyRelated);
        assert_eq!(c.evidence.describe(), "concept score 0.34 >= 0.30");

        let mut off = ConfigProfile::default();
        off.enable_concept_analysis = false;
        assert!(classify(&scores, &BTreeSet::new(), &off).is_none());

        let below = pair(None, 0.1, 0.2, 0.1).with_concept(0.29);
        assert!(classify(&below, &BTreeSet::new(), &ConfigProfile::default()).is_none());
    }
}
