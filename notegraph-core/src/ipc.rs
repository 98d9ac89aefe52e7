use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::profile::ProfileOverrides;

pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NotegraphRequest {
    Ping,
    Health,
    Version,
    ListProfiles,
    CreateNote {
        title: String,
        content: String,
        /// Overrides `linking.auto_link_on_create` for this call.
        auto_link: Option<bool>,
        profile: Option<String>,
    },
    ListNotes,
    GetNote {
        id: Uuid,
    },
    DeleteNote {
        id: Uuid,
    },
    Analyze {
        id: Uuid,
        profile: Option<String>,
        overrides: Option<ProfileOverrides>,
    },
    Link {
        id: Uuid,
        profile: Option<String>,
        overrides: Option<ProfileOverrides>,
    },
    Similar {
        id: Uuid,
        top_k: Option<usize>,
    },
    Relationships {
        id: Uuid,
    },
    CreateRelationship {
        source_id: Uuid,
        target_id: Uuid,
        rel_type: String,
        #[serde(default)]
        bidirectional: bool,
        description: Option<String>,
    },
    DeleteRelationship {
        source_id: Uuid,
        target_id: Uuid,
        /// All types between the pair when absent.
        rel_type: Option<String>,
        #[serde(default)]
        bidirectional: bool,
    },
    AvailableLinks {
        id: Uuid,
        #[serde(default = "default_true")]
        exclude_existing: bool,
    },
}

fn default_true() -> bool {
    true
}

/// Machine-readable failure classes carried next to the message.
pub mod error_kind {
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID: &str = "invalid_request";
    pub const UNAVAILABLE: &str = "unavailable";
    pub const INTERNAL: &str = "internal";
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotegraphResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    #[serde(default)]
    pub error_kind: Option<String>,
    pub version: String,
}

impl NotegraphResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            error_kind: None,
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self::err_kind(error_kind::INTERNAL, msg)
    }

    pub fn err_kind(kind: &str, msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            error_kind: Some(kind.to_string()),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::err_kind(error_kind::NOT_FOUND, msg)
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::err_kind(error_kind::INVALID, msg)
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
