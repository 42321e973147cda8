// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Storage error types for the TwinStore adapter contract.
//
// One enum covers both backends so that callers can react to a failure kind
// (bad input, lost connection, uniqueness violation) without knowing which
// backend produced it.

use thiserror::Error;

/// Errors that can occur when talking to a document adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request was malformed before any I/O happened (bad collection
    /// name, update touching `_id`, non-numeric `$inc`, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend is not connected, was closed, or the transport failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// A uniqueness constraint enforced by the backend was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The remote document server answered with an unexpected status.
    #[error("remote error ({status}): {message}")]
    Remote {
        /// HTTP status code returned by the server.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// An I/O error occurred in the embedded file store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored or received data has an unexpected shape.
    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::CorruptedData(format!("undecodable response: {err}"))
        } else if err.is_timeout() {
            StoreError::Connection(format!("request timed out: {err}"))
        } else {
            StoreError::Connection(err.to_string())
        }
    }
}

/// Convenience alias for adapter results.
pub type StoreResult<T> = Result<T, StoreError>;
