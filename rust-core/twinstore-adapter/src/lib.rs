// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TwinStore Document Adapter
//
// This crate defines the uniform document storage contract used by TwinStore
// and its two interchangeable implementations. Repositories and services are
// written against `DocumentAdapter` and never learn which backend is active.
//
// # Modules
//
// - [`adapter`] -- The `DocumentAdapter` trait (find_one, find, insert,
//   update, remove, count, connect, close).
// - [`document`] -- Documents, equality filters, sorting and pagination.
// - [`update`] -- Tagged updates (`Set` merge or explicit operations) and
//   mutation options.
// - [`embedded`] -- File-per-collection journal store for single-process use.
// - [`networked`] -- Client for a remote JSON/HTTP document server.
// - [`config`] -- `StorageConfig` and environment loading.
// - [`registry`] -- `AdapterRegistry`, the explicit owner of the active adapter.
// - [`error`] -- The `StoreError` enum shared by both backends.
//
// # Example
//
// ```rust
// use twinstore_adapter::{AdapterRegistry, Filter, StorageConfig, Update, UpdateOptions};
//
// # tokio_test::block_on(async {
// let dir = tempfile::tempdir().unwrap();
// let registry = AdapterRegistry::new(StorageConfig::embedded(dir.path()));
// let store = registry.init().await.unwrap();
//
// let doc = serde_json::json!({"id": "p1", "name": "Demo"});
// store.insert("projects", doc.as_object().cloned().unwrap()).await.unwrap();
//
// let rename = Update::Set(serde_json::json!({"name": "Renamed"}).as_object().cloned().unwrap());
// let n = store
//     .update("projects", &Filter::by_id("p1"), &rename, UpdateOptions::single())
//     .await
//     .unwrap();
// assert_eq!(n, 1);
//
// registry.close().await.unwrap();
// # });
// ```

pub mod adapter;
pub mod config;
pub mod document;
pub mod embedded;
pub mod error;
mod journal;
pub mod networked;
pub mod registry;
pub mod update;

// Re-export the most commonly used types at the crate root for convenience.
pub use adapter::DocumentAdapter;
pub use config::{BackendKind, EmbeddedConfig, NetworkedConfig, StorageConfig};
pub use document::{Document, Filter, FindOptions, SortKey, SortOrder, ID_FIELD, INTERNAL_ID_FIELD};
pub use embedded::EmbeddedAdapter;
pub use error::{StoreError, StoreResult};
pub use networked::NetworkedAdapter;
pub use registry::{build_adapter, AdapterRegistry};
pub use update::{RemoveOptions, Update, UpdateOp, UpdateOptions};
