pub mod analyze;
pub mod backfill;
pub mod notes;
pub mod relationships;

use notegraph_core::ipc::{error_kind, NotegraphResponse};
use notegraph_core::{EdgeWriteError, FeatureExtractionError, NotegraphError, StoreError};
use thiserror::Error;

/// Failure of one service operation, classified for IPC and HTTP callers.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Unavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => error_kind::NOT_FOUND,
            ServiceError::Invalid(_) => error_kind::INVALID,
            ServiceError::Unavailable(_) => error_kind::UNAVAILABLE,
            ServiceError::Internal(_) => error_kind::INTERNAL,
        }
    }

    pub fn into_response(self) -> NotegraphResponse {
        NotegraphResponse::err_kind(self.kind(), self.to_string())
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(_) => ServiceError::Unavailable(e.to_string()),
            StoreError::NoteMissing(_) => ServiceError::NotFound(e.to_string()),
            StoreError::SelfRelationship(_) | StoreError::Conflict(_) => {
                ServiceError::Invalid(e.to_string())
            }
            other => ServiceError::Internal(other.into()),
        }
    }
}

impl From<NotegraphError> for ServiceError {
    fn from(e: NotegraphError) -> Self {
        match e {
            NotegraphError::UnknownProfile(_)
            | NotegraphError::InvalidProfile { .. }
            | NotegraphError::UnknownRelationshipType(_) => ServiceError::Invalid(e.to_string()),
            NotegraphError::NoteNotFound(_) => ServiceError::NotFound(e.to_string()),
            NotegraphError::Store(inner) => inner.into(),
            other => ServiceError::Internal(other.into()),
        }
    }
}

impl From<FeatureExtractionError> for ServiceError {
    fn from(e: FeatureExtractionError) -> Self {
        ServiceError::Invalid(e.to_string())
    }
}

impl From<EdgeWriteError> for ServiceError {
    fn from(e: EdgeWriteError) -> Self {
        match e {
            EdgeWriteError::Store(inner) => inner.into(),
            EdgeWriteError::Conflict { .. } => ServiceError::Invalid(e.to_string()),
            EdgeWriteError::Bidirectional { .. } => ServiceError::Internal(e.into()),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
