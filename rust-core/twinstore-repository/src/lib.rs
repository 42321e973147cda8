// SPDX-License-Identifier: PMPL-1.0-or-later
//
// TwinStore Repositories
//
// Tenant-aware data access built on the `twinstore-adapter` contract.
//
// # Modules
//
// - [`repository`] -- `Repository`, owner-scoped CRUD over one collection.
// - [`uniqueness`] -- `UniquenessScope`, secondary-key uniqueness across
//   collections with a per-scope critical section.
// - [`projects`] / [`design_projects`] -- services for the two entity kinds
//   sharing the `code` namespace.
// - [`content_configs`] / [`fields`] -- services whose codes are unique
//   within their own collection.
// - [`catalog`] -- `Catalog`, which hands out tenant-bound services.
// - [`clock`] -- strictly monotonic timestamps.
// - [`error`] -- `RepoError` and its `ErrorKind` classification.
//
// # Example
//
// ```rust
// use std::sync::Arc;
// use twinstore_adapter::{AdapterRegistry, StorageConfig};
// use twinstore_repository::Catalog;
//
// # tokio_test::block_on(async {
// let dir = tempfile::tempdir().unwrap();
// let registry = Arc::new(AdapterRegistry::new(StorageConfig::embedded(dir.path())));
// registry.init().await.unwrap();
//
// let catalog = Catalog::new(Arc::clone(&registry)).unwrap();
// let projects = catalog.projects(Some("alice")).await.unwrap();
// let data = serde_json::json!({"id": "p1", "code": "proj1", "name": "Proj"});
// projects.create(data.as_object().cloned().unwrap()).await.unwrap();
// # });
// ```

pub mod catalog;
pub mod clock;
mod coded;
pub mod content_configs;
pub mod design_projects;
pub mod error;
pub mod fields;
pub mod projects;
pub mod repository;
pub mod uniqueness;

pub use catalog::Catalog;
pub use content_configs::ContentConfigService;
pub use design_projects::DesignProjectService;
pub use error::{ErrorKind, RepoError, RepoResult};
pub use fields::FieldService;
pub use projects::ProjectService;
pub use repository::{Repository, CREATED_AT_FIELD, UPDATED_AT_FIELD, USER_ID_FIELD};
pub use uniqueness::{EntityRef, UniquenessScope};
