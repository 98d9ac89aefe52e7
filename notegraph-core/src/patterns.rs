//! Hierarchical and sequential pattern detection
//!
//! Rule-based and best-effort. Signals are always expressed from the first
//! note's point of view: `Contains` means the first note contains the second.
//! Malformed input yields an empty set rather than an error.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::features::FeatureBundle;
use crate::models::RelationshipType;
use crate::profile::ConfigProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hierarchy {
    Contains,
    ContainedBy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sequence {
    /// The first note comes before the second.
    Prerequisite,
    /// The first note builds on the second.
    Follows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "direction", rename_all = "snake_case")]
pub enum PatternSignal {
    Hierarchical(Hierarchy),
    Sequential(Sequence),
}

impl PatternSignal {
    pub fn rel_type(&self) -> RelationshipType {
        match self {
            PatternSignal::Hierarchical(Hierarchy::Contains) => RelationshipType::Contains,
            PatternSignal::Hierarchical(Hierarchy::ContainedBy) => RelationshipType::ContainedBy,
            PatternSignal::Sequential(Sequence::Prerequisite) => RelationshipType::Prerequisite,
            PatternSignal::Sequential(Sequence::Follows) => RelationshipType::Follows,
        }
    }

    pub fn is_hierarchical(&self) -> bool {
        matches!(self, PatternSignal::Hierarchical(_))
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, PatternSignal::Sequential(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternDetector {
    coverage: f32,
    min_cues: u32,
}

impl PatternDetector {
    pub fn new(coverage: f32, min_cues: u32) -> Self {
        Self { coverage, min_cues }
    }

    pub fn from_profile(profile: &ConfigProfile) -> Self {
        Self::new(profile.hierarchical_coverage, profile.sequential_min_cues)
    }

    pub fn detect(&self, a: &FeatureBundle, b: &FeatureBundle) -> BTreeSet<PatternSignal> {
        let mut signals = BTreeSet::new();
        if a.note_id == b.note_id {
            return signals;
        }

        if let Some(h) = self.hierarchy(a, b) {
            signals.insert(PatternSignal::Hierarchical(h));
        }
        signals.extend(self.sequence(a, b).into_iter().map(PatternSignal::Sequential));
        signals
    }

    /// Strict superset check with a coverage ratio against the smaller set.
    fn hierarchy(&self, a: &FeatureBundle, b: &FeatureBundle) -> Option<Hierarchy> {
        let (larger, smaller, direction) = match a.topics.len().cmp(&b.topics.len()) {
            std::cmp::Ordering::Greater => (&a.topics, &b.topics, Hierarchy::Contains),
            std::cmp::Ordering::Less => (&b.topics, &a.topics, Hierarchy::ContainedBy),
            std::cmp::Ordering::Equal => return None,
        };
        if smaller.is_empty() {
            return None;
        }

        let overlap = smaller.intersection(larger).count() as f32;
        if overlap / smaller.len() as f32 >= self.coverage {
            Some(direction)
        } else {
            None
        }
    }

    /// Cue words in one note referencing concepts shared with the other.
    ///
    /// A note signals when it carries more than `min_cues` cues of one kind and
    /// more than the other note does. Both directions may come back; the
    /// classifier treats that as ambiguous.
    fn sequence(&self, a: &FeatureBundle, b: &FeatureBundle) -> BTreeSet<Sequence> {
        let mut found = BTreeSet::new();
        if a.topics.intersection(&b.topics).next().is_none() {
            return found;
        }

        let dominant = |mine: u32, theirs: u32| mine > self.min_cues && mine > theirs;

        if dominant(a.cues.prerequisite, b.cues.prerequisite) {
            found.insert(Sequence::Prerequisite);
        }
        if dominant(a.cues.follow_up, b.cues.follow_up) {
            found.insert(Sequence::Follows);
        }
        if dominant(b.cues.prerequisite, a.cues.prerequisite) {
            found.insert(Sequence::Follows);
        }
        if dominant(b.cues.follow_up, a.cues.follow_up) {
            found.insert(Sequence::Prerequisite);
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{SequenceCues, StructuralSignature};
    use uuid::Uuid;

    fn bundle(topics: &[&str], prerequisite: u32, follow_up: u32) -> FeatureBundle {
        FeatureBundle {
            note_id: Uuid::new_v4(),
            content_hash: String::new(),
            snapshot_version: 0,
            embedding: None,
            keywords: Default::default(),
            structure: StructuralSignature::default(),
            concepts: Default::default(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            cues: SequenceCues {
                prerequisite,
                follow_up,
            },
        }
    }

    fn topics(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_ninety_percent_superset_contains() {
        // D has 10 topics, C covers 9 of them plus 5 more
        let d_topics = topics("t", 10);
        let mut c_topics: Vec<String> = d_topics[..9].to_vec();
        c_topics.extend(topics("extra", 5));

        let c = bundle(&c_topics.iter().map(|s| s.as_str()).collect::<Vec<_>>(), 0, 0);
        let d = bundle(&d_topics.iter().map(|s| s.as_str()).collect::<Vec<_>>(), 0, 0);

        let detector = PatternDetector::from_profile(&ConfigProfile::default());
        let cd = detector.detect(&c, &d);
        assert!(cd.contains(&PatternSignal::Hierarchical(Hierarchy::Contains)));
        let dc = detector.detect(&d, &c);
        assert!(dc.contains(&PatternSignal::Hierarchical(Hierarchy::ContainedBy)));
    }

    #[test]
    fn test_equal_sized_sets_are_not_hierarchical() {
        let a = bundle(&["x", "y"], 0, 0);
        let b = bundle(&["x", "y"], 0, 0);
        assert!(PatternDetector::new(0.8, 2).detect(&a, &b).is_empty());
    }

    #[test]
    fn test_low_coverage_is_not_hierarchical() {
        let a = bundle(&["a", "b", "c", "d", "e"], 0, 0);
        let b = bundle(&["a", "z", "q"], 0, 0);
        assert!(PatternDetector::new(0.8, 2).detect(&a, &b).is_empty());
    }

    #[test]
    fn test_prerequisite_cues_in_source() {
        let intro = bundle(&["ownership", "borrowing"], 4, 0);
        let advanced = bundle(&["ownership"], 0, 1);
        let signals = PatternDetector::new(1.1, 2).detect(&intro, &advanced);
        assert_eq!(
            signals.into_iter().collect::<Vec<_>>(),
            vec![PatternSignal::Sequential(Sequence::Prerequisite)]
        );
    }

    #[test]
    fn test_follow_up_cues_in_target_flip_direction() {
        let basics = bundle(&["tokio"], 0, 0);
        let next = bundle(&["tokio"], 0, 3);
        let signals = PatternDetector::new(0.8, 2).detect(&basics, &next);
        assert!(signals.contains(&PatternSignal::Sequential(Sequence::Prerequisite)));
        assert!(!signals.contains(&PatternSignal::Sequential(Sequence::Follows)));
    }

    #[test]
    fn test_cues_without_shared_topic_are_ignored() {
        let a = bundle(&["rust"], 5, 0);
        let b = bundle(&["gardening"], 0, 0);
        assert!(PatternDetector::new(0.8, 2).detect(&a, &b).is_empty());
    }

    #[test]
    fn test_cues_at_minimum_do_not_fire() {
        let a = bundle(&["rust"], 2, 0);
        let b = bundle(&["rust"], 0, 0);
        assert!(PatternDetector::new(0.8, 2).detect(&a, &b).is_empty());
    }

    #[test]
    fn test_same_note_yields_nothing() {
        let a = bundle(&["a", "b", "c"], 5, 5);
        assert!(PatternDetector::new(0.8, 2).detect(&a, &a.clone()).is_empty());
    }

    #[test]
    fn test_only_the_dominant_note_signals() {
        // both notes are cue-heavy but b has more prerequisite phrasing
        let a = bundle(&["rust"], 4, 0);
        let b = bundle(&["rust"], 5, 0);
        let signals = PatternDetector::new(0.8, 2).detect(&a, &b);
        assert_eq!(
            signals.into_iter().collect::<Vec<_>>(),
            vec![PatternSignal::Sequential(Sequence::Follows)]
        );
    }

    #[test]
    fn test_agreeing_cues_collapse_to_one_direction() {
        let intro = bundle(&["rust"], 4, 0);
        let advanced = bundle(&["rust"], 0, 4);
        let signals = PatternDetector::new(0.8, 2).detect(&intro, &advanced);
        assert_eq!(signals.len(), 1);
        assert!(signals.contains(&PatternSignal::Sequential(Sequence::Prerequisite)));
    }

    #[test]
    fn test_mixed_cues_yield_both_directions() {
        let mixed = bundle(&["rust"], 4, 4);
        let plain = bundle(&["rust"], 0, 0);
        let signals = PatternDetector::new(0.8, 2).detect(&mixed, &plain);
        assert_eq!(signals.len(), 2);
        assert!(signals.iter().all(|s| s.is_sequential()));
    }
}
