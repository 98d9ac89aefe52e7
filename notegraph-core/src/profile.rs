//! Similarity profiles: weights, thresholds and detector switches as data
//!
//! A `ConfigProfile` is an immutable value handed explicitly to every scoring
//! and classification call. Named presets mirror the catalogue users pick from;
//! callers can also send a partial `ProfileOverrides` that is layered on top of
//! a named base. `ProfileCatalog` owns the presets plus any profiles declared in
//! `[linking.profiles.*]` and resolves selections against them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::NotegraphError;
use crate::models::RelationshipType;

pub const DEFAULT_PROFILE: &str = "default";

/// Relative importance of each similarity dimension. Need not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionWeights {
    pub semantic: f32,
    pub keyword: f32,
    pub structural: f32,
    pub topic: f32,
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            semantic: 0.4,
            keyword: 0.3,
            structural: 0.15,
            topic: 0.15,
        }
    }
}

/// Minimum score per relationship type, checked in `THRESHOLD_PRIORITY` order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub highly_related: f32,
    pub semantically_related: f32,
    pub topically_related: f32,
    pub structurally_related: f32,
    pub keyword_related: f32,
    pub loosely_related: f32,
    /// Jaccard overlap of named concepts, not a composite score.
    pub conceptually_related: f32,
    pub weakly_related: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            highly_related: 0.8,
            semantically_related: 0.7,
            topically_related: 0.6,
            structurally_related: 0.6,
            keyword_related: 0.6,
            loosely_related: 0.5,
            conceptually_related: 0.3,
            weakly_related: 0.4,
        }
    }
}

impl Thresholds {
    /// Threshold for a similarity type; `None` for pattern-driven or manual types.
    pub fn for_type(&self, rel_type: RelationshipType) -> Option<f32> {
        match rel_type {
            RelationshipType::HighlyRelated => Some(self.highly_related),
            RelationshipType::SemanticallyRelated => Some(self.semantically_related),
            RelationshipType::TopicallyRelated => Some(self.topically_related),
            RelationshipType::StructurallyRelated => Some(self.structurally_related),
            RelationshipType::KeywordRelated => Some(self.keyword_related),
            RelationshipType::LooselyRelated => Some(self.loosely_related),
            RelationshipType::ConceptuallyRelated => Some(self.conceptually_related),
            RelationshipType::WeaklyRelated => Some(self.weakly_related),
            _ => None,
        }
    }

    fn all(&self) -> [(&'static str, f32); 8] {
        [
            ("highly_related", self.highly_related),
            ("semantically_related", self.semantically_related),
            ("topically_related", self.topically_related),
            ("structurally_related", self.structurally_related),
            ("keyword_related", self.keyword_related),
            ("loosely_related", self.loosely_related),
            ("conceptually_related", self.conceptually_related),
            ("weakly_related", self.weakly_related),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigProfile {
    pub name: String,
    pub weights: DimensionWeights,
    pub thresholds: Thresholds,
    /// Share of the smaller topic set the larger one must cover for CONTAINS.
    pub hierarchical_coverage: f32,
    /// A note needs strictly more cue words than this to signal a sequence.
    pub sequential_min_cues: u32,
    pub enable_hierarchical_detection: bool,
    pub enable_sequential_detection: bool,
    pub enable_weak_relationships: bool,
    pub enable_concept_analysis: bool,
    /// Accepted edges of any one type per analysis, applied before the total cap.
    pub max_relationships_per_type: usize,
    pub max_relationships_per_note: usize,
}

impl Default for ConfigProfile {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROFILE.to_string(),
            weights: DimensionWeights::default(),
            thresholds: Thresholds::default(),
            hierarchical_coverage: 0.8,
            sequential_min_cues: 2,
            enable_hierarchical_detection: true,
            enable_sequential_detection: true,
            enable_weak_relationships: false,
            enable_concept_analysis: true,
            max_relationships_per_type: 5,
            max_relationships_per_note: 20,
        }
    }
}

impl ConfigProfile {
    /// Reject profiles that would make scores meaningless.
    pub fn validate(&self) -> Result<(), NotegraphError> {
        let invalid = |reason: String| NotegraphError::InvalidProfile {
            name: self.name.clone(),
            reason,
        };

        let w = &self.weights;
        for (dim, value) in [
            ("semantic", w.semantic),
            ("keyword", w.keyword),
            ("structural", w.structural),
            ("topic", w.topic),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{} weight must be a non-negative number", dim)));
            }
        }
        if w.semantic + w.keyword + w.structural + w.topic <= 0.0 {
            return Err(invalid("at least one weight must be positive".to_string()));
        }

        for (name, value) in self.thresholds.all() {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{} threshold must be within [0, 1]", name)));
            }
        }

        if !(0.0..=1.0).contains(&self.hierarchical_coverage) || self.hierarchical_coverage == 0.0
        {
            return Err(invalid("hierarchical_coverage must be within (0, 1]".to_string()));
        }

        if self.max_relationships_per_type == 0 {
            return Err(invalid("max_relationships_per_type must be at least 1".to_string()));
        }

        Ok(())
    }
}

/// Partial profile: every field optional, applied over a base profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOverrides {
    pub semantic_weight: Option<f32>,
    pub keyword_weight: Option<f32>,
    pub structural_weight: Option<f32>,
    pub topic_weight: Option<f32>,
    pub highly_related_threshold: Option<f32>,
    pub semantically_related_threshold: Option<f32>,
    pub topically_related_threshold: Option<f32>,
    pub structurally_related_threshold: Option<f32>,
    pub keyword_related_threshold: Option<f32>,
    pub loosely_related_threshold: Option<f32>,
    #[serde(alias = "concept_overlap_threshold")]
    pub conceptually_related_threshold: Option<f32>,
    pub weakly_related_threshold: Option<f32>,
    pub hierarchical_coverage: Option<f32>,
    pub sequential_min_cues: Option<u32>,
    pub enable_hierarchical_detection: Option<bool>,
    pub enable_sequential_detection: Option<bool>,
    pub enable_weak_relationships: Option<bool>,
    pub enable_concept_analysis: Option<bool>,
    pub max_relationships_per_type: Option<usize>,
    pub max_relationships_per_note: Option<usize>,
}

impl ProfileOverrides {
    pub fn is_empty(&self) -> bool {
        self == &ProfileOverrides::default()
    }

    pub fn apply(&self, base: &ConfigProfile) -> ConfigProfile {
        let mut p = base.clone();
        macro_rules! set {
            ($src:ident => $($dst:ident).+) => {
                if let Some(v) = self.$src {
                    p.$($dst).+ = v;
                }
            };
        }
        set!(semantic_weight => weights.semantic);
        set!(keyword_weight => weights.keyword);
        set!(structural_weight => weights.structural);
        set!(topic_weight => weights.topic);
        set!(highly_related_threshold => thresholds.highly_related);
        set!(semantically_related_threshold => thresholds.semantically_related);
        set!(topically_related_threshold => thresholds.topically_related);
        set!(structurally_related_threshold => thresholds.structurally_related);
        set!(keyword_related_threshold => thresholds.keyword_related);
        set!(loosely_related_threshold => thresholds.loosely_related);
        set!(conceptually_related_threshold => thresholds.conceptually_related);
        set!(weakly_related_threshold => thresholds.weakly_related);
        set!(hierarchical_coverage => hierarchical_coverage);
        set!(sequential_min_cues => sequential_min_cues);
        set!(enable_hierarchical_detection => enable_hierarchical_detection);
        set!(enable_sequential_detection => enable_sequential_detection);
        set!(enable_weak_relationships => enable_weak_relationships);
        set!(enable_concept_analysis => enable_concept_analysis);
        set!(max_relationships_per_type => max_relationships_per_type);
        set!(max_relationships_per_note => max_relationships_per_note);
        p
    }
}

/// How a caller picks a profile: a name, inline overrides, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSelection {
    pub profile: Option<String>,
    pub overrides: Option<ProfileOverrides>,
}

impl ProfileSelection {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            profile: Some(name.into()),
            overrides: None,
        }
    }
}

/// Built-in presets.
pub fn presets() -> Vec<ConfigProfile> {
    let base = ConfigProfile::default();
    let named = |name: &str, o: ProfileOverrides| {
        let mut p = o.apply(&base);
        p.name = name.to_string();
        p
    };

    vec![
        base.clone(),
        named(
            "semantic_focused",
            ProfileOverrides {
                semantic_weight: Some(0.6),
                keyword_weight: Some(0.2),
                structural_weight: Some(0.1),
                topic_weight: Some(0.1),
                semantically_related_threshold: Some(0.6),
                ..Default::default()
            },
        ),
        named(
            "keyword_focused",
            ProfileOverrides {
                semantic_weight: Some(0.2),
                keyword_weight: Some(0.5),
                keyword_related_threshold: Some(0.5),
                ..Default::default()
            },
        ),
        named(
            "strict",
            ProfileOverrides {
                highly_related_threshold: Some(0.85),
                semantically_related_threshold: Some(0.75),
                topically_related_threshold: Some(0.65),
                loosely_related_threshold: Some(0.6),
                max_relationships_per_type: Some(3),
                max_relationships_per_note: Some(10),
                ..Default::default()
            },
        ),
        named(
            "permissive",
            ProfileOverrides {
                highly_related_threshold: Some(0.7),
                semantically_related_threshold: Some(0.6),
                topically_related_threshold: Some(0.5),
                loosely_related_threshold: Some(0.4),
                weakly_related_threshold: Some(0.3),
                enable_weak_relationships: Some(true),
                max_relationships_per_type: Some(8),
                max_relationships_per_note: Some(30),
                ..Default::default()
            },
        ),
        named(
            "academic",
            ProfileOverrides {
                semantic_weight: Some(0.35),
                keyword_weight: Some(0.35),
                structural_weight: Some(0.2),
                topic_weight: Some(0.1),
                hierarchical_coverage: Some(0.75),
                conceptually_related_threshold: Some(0.25),
                ..Default::default()
            },
        ),
        named(
            "creative",
            ProfileOverrides {
                semantic_weight: Some(0.5),
                keyword_weight: Some(0.2),
                structural_weight: Some(0.1),
                topic_weight: Some(0.2),
                semantically_related_threshold: Some(0.6),
                ..Default::default()
            },
        ),
    ]
}

/// Immutable lookup table of every profile a deployment knows about.
#[derive(Debug, Clone)]
pub struct ProfileCatalog {
    profiles: BTreeMap<String, ConfigProfile>,
    default_name: String,
}

impl Default for ProfileCatalog {
    fn default() -> Self {
        Self {
            profiles: presets().into_iter().map(|p| (p.name.clone(), p)).collect(),
            default_name: DEFAULT_PROFILE.to_string(),
        }
    }
}

impl ProfileCatalog {
    /// Presets plus custom profiles, each custom one layered on `default`.
    pub fn new(
        default_name: &str,
        custom: &BTreeMap<String, ProfileOverrides>,
    ) -> Result<Self, NotegraphError> {
        let mut catalog = ProfileCatalog::default();
        let base = ConfigProfile::default();
        for (name, overrides) in custom {
            let mut profile = overrides.apply(&base);
            profile.name = name.clone();
            profile.validate()?;
            catalog.profiles.insert(name.clone(), profile);
        }
        if !catalog.profiles.contains_key(default_name) {
            return Err(NotegraphError::UnknownProfile(default_name.to_string()));
        }
        catalog.default_name = default_name.to_string();
        Ok(catalog)
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn get(&self, name: &str) -> Option<&ConfigProfile> {
        self.profiles.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ConfigProfile> {
        self.profiles.values()
    }

    /// Resolve a selection to a concrete, validated profile value.
    pub fn resolve(&self, selection: &ProfileSelection) -> Result<ConfigProfile, NotegraphError> {
        let name = selection.profile.as_deref().unwrap_or(&self.default_name);
        let base = self
            .get(name)
            .ok_or_else(|| NotegraphError::UnknownProfile(name.to_string()))?;

        let profile = match &selection.overrides {
            Some(o) if !o.is_empty() => {
                let mut p = o.apply(base);
                p.name = format!("{}+custom", base.name);
                p
            }
            _ => base.clone(),
        };
        profile.validate()?;
        Ok(profile)
    }
}
