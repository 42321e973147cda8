// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Repository-level error types.
//
// Presentation code decides status codes from `RepoError::kind()`, never from
// message text. Adapter errors that carry a meaning of their own (bad input,
// conflict, lost connection) are lifted into the matching variant; everything
// else stays wrapped as `Storage`.

use serde::Serialize;
use thiserror::Error;
use twinstore_adapter::StoreError;

/// Error classification for callers that map errors onto responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidArgument,
    Connection,
    Internal,
}

/// Errors returned by repositories, the uniqueness validator and services.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The target document does not exist or is not owned by the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint would be violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A required field is missing or a value fails its format constraint.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The storage backend is unreachable or not connected.
    #[error("connection error: {0}")]
    Connection(String),

    /// Any other storage failure.
    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepoError::NotFound(_) => ErrorKind::NotFound,
            RepoError::Conflict(_) => ErrorKind::Conflict,
            RepoError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            RepoError::Connection(_) => ErrorKind::Connection,
            RepoError::Storage(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidArgument(message) => RepoError::InvalidArgument(message),
            StoreError::Conflict(message) => RepoError::Conflict(message),
            StoreError::Connection(message) => RepoError::Connection(message),
            other => RepoError::Storage(other),
        }
    }
}

/// Convenience alias for repository results.
pub type RepoResult<T> = Result<T, RepoError>;
