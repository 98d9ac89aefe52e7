pub mod note;
pub mod relationship;

pub use note::{Note, NoteSummary};
pub use relationship::{
    EdgeKey, Origin, Relationship, RelationshipCategory, RelationshipType, THRESHOLD_PRIORITY,
};
