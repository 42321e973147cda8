// SPDX-License-Identifier: PMPL-1.0-or-later
//
// The document adapter contract.
//
// Both backends implement this trait identically, so repositories and
// services never learn which one is in use. Backends are shared across tokio
// tasks through `Arc<dyn DocumentAdapter>`.

use async_trait::async_trait;

use crate::document::{Document, Filter, FindOptions};
use crate::error::StoreResult;
use crate::update::{RemoveOptions, Update, UpdateOptions};

/// A backend-specific implementation of the uniform storage operation set.
///
/// Mutations default to affecting *every* matching document (`multi = true`).
/// Callers that need single-document semantics must ask for them through
/// [`UpdateOptions::single`] / [`RemoveOptions::single`].
#[async_trait]
pub trait DocumentAdapter: Send + Sync {
    /// Return the first document matching `filter`, if any.
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>>;

    /// Return all documents matching `filter`, sorted, skipped and limited
    /// according to `options`. Order is unspecified without a sort.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Store a new document and return it as stored.
    ///
    /// The returned document always carries the caller-supplied `id`, even
    /// when the backend also assigned its own `_id`.
    async fn insert(&self, collection: &str, doc: Document) -> StoreResult<Document>;

    /// Apply `update` to the matching documents and return how many were
    /// affected (an upsert that inserts counts as one).
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        options: UpdateOptions,
    ) -> StoreResult<u64>;

    /// Remove matching documents and return how many were removed.
    async fn remove(
        &self,
        collection: &str,
        filter: &Filter,
        options: RemoveOptions,
    ) -> StoreResult<u64>;

    /// Count documents matching `filter`.
    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Establish the backend session. Idempotent.
    async fn connect(&self) -> StoreResult<()>;

    /// Release the backend session and any cached handles.
    async fn close(&self) -> StoreResult<()>;

    /// A human-readable backend name for logging.
    fn name(&self) -> &str;
}
