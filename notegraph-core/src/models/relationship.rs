use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NotegraphError;

/// Closed set of relationship types the graph can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    HighlyRelated,
    SemanticallyRelated,
    TopicallyRelated,
    StructurallyRelated,
    KeywordRelated,
    LooselyRelated,
    /// Shared named concepts (proper nouns, identifiers, code spans).
    ConceptuallyRelated,
    WeaklyRelated,
    Contains,
    ContainedBy,
    Prerequisite,
    Follows,
    /// Generic user-asserted link with no inferred meaning.
    Related,
}

/// Order in which similarity thresholds are tested. Earlier entries win ties.
pub const THRESHOLD_PRIORITY: [RelationshipType; 8] = [
    RelationshipType::HighlyRelated,
    RelationshipType::SemanticallyRelated,
    RelationshipType::TopicallyRelated,
    RelationshipType::StructurallyRelated,
    RelationshipType::KeywordRelated,
    RelationshipType::LooselyRelated,
    RelationshipType::ConceptuallyRelated,
    RelationshipType::WeaklyRelated,
];

/// Grouping used by the analysis surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipCategory {
    Similarity,
    Hierarchical,
    Sequential,
    Conceptual,
    Weak,
    Manual,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 13] = [
        RelationshipType::HighlyRelated,
        RelationshipType::SemanticallyRelated,
        RelationshipType::TopicallyRelated,
        RelationshipType::StructurallyRelated,
        RelationshipType::KeywordRelated,
        RelationshipType::LooselyRelated,
        RelationshipType::ConceptuallyRelated,
        RelationshipType::WeaklyRelated,
        RelationshipType::Contains,
        RelationshipType::ContainedBy,
        RelationshipType::Prerequisite,
        RelationshipType::Follows,
        RelationshipType::Related,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::HighlyRelated => "HIGHLY_RELATED",
            RelationshipType::SemanticallyRelated => "SEMANTICALLY_RELATED",
            RelationshipType::TopicallyRelated => "TOPICALLY_RELATED",
            RelationshipType::StructurallyRelated => "STRUCTURALLY_RELATED",
            RelationshipType::KeywordRelated => "KEYWORD_RELATED",
            RelationshipType::LooselyRelated => "LOOSELY_RELATED",
            RelationshipType::ConceptuallyRelated => "CONCEPTUALLY_RELATED",
            RelationshipType::WeaklyRelated => "WEAKLY_RELATED",
            RelationshipType::Contains => "CONTAINS",
            RelationshipType::ContainedBy => "CONTAINED_BY",
            RelationshipType::Prerequisite => "PREREQUISITE",
            RelationshipType::Follows => "FOLLOWS",
            RelationshipType::Related => "RELATED",
        }
    }

    /// Symmetric types mean the same thing read in either direction.
    pub fn is_symmetric(&self) -> bool {
        !matches!(
            self,
            RelationshipType::Contains
                | RelationshipType::ContainedBy
                | RelationshipType::Prerequisite
                | RelationshipType::Follows
        )
    }

    /// The type that expresses the same fact from the other note's side.
    pub fn inverse(&self) -> RelationshipType {
        match self {
            RelationshipType::Contains => RelationshipType::ContainedBy,
            RelationshipType::ContainedBy => RelationshipType::Contains,
            RelationshipType::Prerequisite => RelationshipType::Follows,
            RelationshipType::Follows => RelationshipType::Prerequisite,
            other => *other,
        }
    }

    pub fn category(&self) -> RelationshipCategory {
        match self {
            RelationshipType::Contains | RelationshipType::ContainedBy => {
                RelationshipCategory::Hierarchical
            }
            RelationshipType::Prerequisite | RelationshipType::Follows => {
                RelationshipCategory::Sequential
            }
            RelationshipType::ConceptuallyRelated => RelationshipCategory::Conceptual,
            RelationshipType::WeaklyRelated => RelationshipCategory::Weak,
            RelationshipType::Related => RelationshipCategory::Manual,
            _ => RelationshipCategory::Similarity,
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = NotegraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        RelationshipType::ALL
            .iter()
            .find(|t| t.as_str() == normalized)
            .copied()
            .ok_or_else(|| NotegraphError::UnknownRelationshipType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Manual,
    Automatic,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Manual => "manual",
            Origin::Automatic => "automatic",
        }
    }
}

impl FromStr for Origin {
    type Err = NotegraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Origin::Manual),
            "automatic" => Ok(Origin::Automatic),
            other => Err(NotegraphError::Ipc(format!("unknown origin '{}'", other))),
        }
    }
}

/// Logical identity of one directed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub rel_type: RelationshipType,
}

impl EdgeKey {
    pub fn new(source_id: Uuid, target_id: Uuid, rel_type: RelationshipType) -> Self {
        Self {
            source_id,
            target_id,
            rel_type,
        }
    }

    pub fn reversed(&self) -> Self {
        Self::new(self.target_id, self.source_id, self.rel_type)
    }

    /// Direction-free key shared by an edge and its reverse.
    pub fn pair_key(&self) -> (Uuid, Uuid, RelationshipType) {
        let (lo, hi) = if self.source_id <= self.target_id {
            (self.source_id, self.target_id)
        } else {
            (self.target_id, self.source_id)
        };
        (lo, hi, self.rel_type)
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-[{}]->({})", self.source_id, self.rel_type, self.target_id)
    }
}

/// A persisted directed edge in the note graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub rel_type: RelationshipType,
    pub bidirectional: bool,
    pub description: Option<String>,
    pub origin: Origin,
    pub score: Option<f32>,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    pub fn manual(
        source_id: Uuid,
        target_id: Uuid,
        rel_type: RelationshipType,
        bidirectional: bool,
        description: Option<String>,
    ) -> Self {
        Self {
            source_id,
            target_id,
            rel_type,
            bidirectional,
            description,
            origin: Origin::Manual,
            score: None,
            created_at: Utc::now(),
        }
    }

    pub fn automatic(
        source_id: Uuid,
        target_id: Uuid,
        rel_type: RelationshipType,
        bidirectional: bool,
        score: f32,
    ) -> Self {
        Self {
            source_id,
            target_id,
            rel_type,
            bidirectional,
            description: None,
            origin: Origin::Automatic,
            score: Some(score),
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source_id, self.target_id, self.rel_type)
    }

    /// The paired reverse row of a bidirectional edge.
    pub fn reversed(&self) -> Self {
        Self {
            source_id: self.target_id,
            target_id: self.source_id,
            ..self.clone()
        }
    }

    /// True when this edge connects `a` and `b`, in either direction.
    pub fn joins(&self, a: Uuid, b: Uuid) -> bool {
        (self.source_id == a && self.target_id == b) || (self.source_id == b && self.target_id == a)
    }
}
