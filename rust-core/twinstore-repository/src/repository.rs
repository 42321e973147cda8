// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Generic tenant-scoped repository.
//
// A `Repository` wraps one adapter and one collection, optionally bound to a
// tenant. It is the layer that turns the adapter's permissive defaults into
// the guarantee the rest of TwinStore relies on: `update` and `delete` touch
// at most the one document named by `id`, and only when the bound tenant
// owns it.
//
// # Design
//
// - Every read conjoins `{userId: tenant}` when a tenant is bound; unbound
//   repositories see every document.
// - `create` stamps `userId` from the tenant and fills `createdAt` /
//   `updatedAt` unless the caller supplied them (data import).
// - `update` silently drops `id`, `userId`, `_id` and `createdAt` from the
//   payload, stamps `updatedAt`, and forces `multi = false`. Upserts insert
//   through `create`, never through the adapter's own upsert.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use twinstore_adapter::{
    DocumentAdapter, Document, Filter, FindOptions, RemoveOptions, Update, UpdateOptions, ID_FIELD,
    INTERNAL_ID_FIELD,
};

use crate::clock;
use crate::error::{RepoError, RepoResult};

/// Tenant marker stamped on owned documents.
pub const USER_ID_FIELD: &str = "userId";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Fields an update payload can never change.
const IMMUTABLE_FIELDS: [&str; 4] = [ID_FIELD, USER_ID_FIELD, INTERNAL_ID_FIELD, CREATED_AT_FIELD];

/// Owner-aware CRUD over one collection.
#[derive(Clone)]
pub struct Repository {
    adapter: Arc<dyn DocumentAdapter>,
    collection: String,
    tenant: Option<String>,
}

impl Repository {
    /// An unbound repository over `collection`.
    pub fn new(adapter: Arc<dyn DocumentAdapter>, collection: impl Into<String>) -> Self {
        Self {
            adapter,
            collection: collection.into(),
            tenant: None,
        }
    }

    /// Bind (or unbind, with `None`) the tenant context.
    pub fn with_tenant(mut self, tenant: Option<impl Into<String>>) -> Self {
        self.tenant = tenant.map(Into::into);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    pub fn adapter(&self) -> &Arc<dyn DocumentAdapter> {
        &self.adapter
    }

    /// `{userId: tenant}` when bound, otherwise the empty filter.
    pub fn owner_filter(&self) -> Filter {
        match &self.tenant {
            Some(tenant) => Filter::new().eq(USER_ID_FIELD, tenant.as_str()),
            None => Filter::new(),
        }
    }

    fn scoped(&self, filter: &Filter) -> Filter {
        filter.clone().and(&self.owner_filter())
    }

    /// Store a new document owned by the bound tenant.
    ///
    /// # Errors
    ///
    /// [`RepoError::InvalidArgument`] if `data` has no non-empty string `id`.
    pub async fn create(&self, mut data: Document) -> RepoResult<Document> {
        let id = match data.get(ID_FIELD) {
            Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
            _ => {
                return Err(RepoError::InvalidArgument(format!(
                    "a non-empty string `id` is required to create a document in `{}`",
                    self.collection
                )))
            }
        };

        match &self.tenant {
            Some(tenant) => {
                data.insert(USER_ID_FIELD.to_string(), Value::String(tenant.clone()));
            }
            None => {
                data.remove(USER_ID_FIELD);
            }
        }

        let now = clock::timestamp();
        let created_at = match data.get(CREATED_AT_FIELD) {
            Some(value) if !value.is_null() => value.clone(),
            _ => Value::String(now.clone()),
        };
        if matches!(data.get(UPDATED_AT_FIELD), None | Some(Value::Null)) {
            data.insert(UPDATED_AT_FIELD.to_string(), Value::String(now));
        }
        data.insert(CREATED_AT_FIELD.to_string(), created_at);

        let stored = self.adapter.insert(&self.collection, data).await?;
        debug!(collection = %self.collection, id = %id, tenant = ?self.tenant, "Created document");
        Ok(stored)
    }

    pub async fn find(&self, filter: &Filter, options: &FindOptions) -> RepoResult<Vec<Document>> {
        Ok(self
            .adapter
            .find(&self.collection, &self.scoped(filter), options)
            .await?)
    }

    pub async fn find_one(&self, filter: &Filter) -> RepoResult<Option<Document>> {
        Ok(self
            .adapter
            .find_one(&self.collection, &self.scoped(filter))
            .await?)
    }

    pub async fn find_by_id(&self, id: &str) -> RepoResult<Option<Document>> {
        self.find_one(&Filter::by_id(id)).await
    }

    /// Merge `data` into the document `id` owned by the bound tenant.
    ///
    /// Returns the number of affected documents (0 or 1).
    pub async fn update(&self, id: &str, data: Document) -> RepoResult<u64> {
        self.update_with(id, data, UpdateOptions::default()).await
    }

    /// [`Repository::update`] with caller options. `multi` is always
    /// overridden to `false`. With `upsert`, a missing `id` is inserted
    /// through [`Repository::create`] so it gets the same stamps; an `id`
    /// already held by another tenant is a `Conflict`.
    pub async fn update_with(
        &self,
        id: &str,
        mut data: Document,
        options: UpdateOptions,
    ) -> RepoResult<u64> {
        for field in IMMUTABLE_FIELDS {
            data.remove(field);
        }
        let fresh = options.upsert.then(|| {
            let mut fresh = data.clone();
            fresh.remove(UPDATED_AT_FIELD);
            fresh
        });
        data.insert(UPDATED_AT_FIELD.to_string(), Value::String(clock::timestamp()));

        let filter = self.scoped(&Filter::by_id(id));
        let single = UpdateOptions {
            multi: false,
            upsert: false,
        };
        let affected = self
            .adapter
            .update(&self.collection, &filter, &Update::Set(data), single)
            .await?;
        debug!(collection = %self.collection, id, tenant = ?self.tenant, affected, "Updated document");

        match fresh {
            Some(mut fresh) if affected == 0 => {
                let any_tenant = Repository::new(Arc::clone(&self.adapter), self.collection.clone());
                if any_tenant.exists(id).await? {
                    return Err(RepoError::Conflict(format!(
                        "`{id}` already exists in `{}`",
                        self.collection
                    )));
                }
                fresh.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
                self.create(fresh).await?;
                Ok(1)
            }
            _ => Ok(affected),
        }
    }

    /// Remove the document `id` owned by the bound tenant.
    pub async fn delete(&self, id: &str) -> RepoResult<u64> {
        let filter = self.scoped(&Filter::by_id(id));
        let removed = self
            .adapter
            .remove(&self.collection, &filter, RemoveOptions::single())
            .await?;
        debug!(collection = %self.collection, id, tenant = ?self.tenant, removed, "Deleted document");
        Ok(removed)
    }

    pub async fn count(&self, filter: &Filter) -> RepoResult<u64> {
        Ok(self
            .adapter
            .count(&self.collection, &self.scoped(filter))
            .await?)
    }

    pub async fn exists(&self, id: &str) -> RepoResult<bool> {
        Ok(self.find_by_id(id).await?.is_some())
    }

    /// Look up `id`, refusing documents owned by another tenant.
    ///
    /// With `check_ownership` and a bound tenant the stored `userId` is
    /// compared against the tenant before the document is returned, so a
    /// guessed id of a foreign document yields `None`. Otherwise this is
    /// [`Repository::find_by_id`].
    pub async fn find_by_id_with_user(
        &self,
        id: &str,
        check_ownership: bool,
    ) -> RepoResult<Option<Document>> {
        match (&self.tenant, check_ownership) {
            (Some(tenant), true) => {
                let doc = self.find_by_id(id).await?;
                Ok(doc.filter(|doc| {
                    doc.get(USER_ID_FIELD).and_then(Value::as_str) == Some(tenant.as_str())
                }))
            }
            _ => self.find_by_id(id).await,
        }
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("adapter", &self.adapter.name())
            .field("collection", &self.collection)
            .field("tenant", &self.tenant)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use twinstore_adapter::EmbeddedAdapter;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn repo(dir: &TempDir, tenant: Option<&str>) -> Repository {
        let adapter: Arc<dyn DocumentAdapter> = Arc::new(EmbeddedAdapter::new(dir.path()));
        Repository::new(adapter, "projects").with_tenant(tenant)
    }

    #[tokio::test]
    async fn test_create_requires_id() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir, Some("alice"));
        for bad in [json!({}), json!({"id": ""}), json!({"id": 7})] {
            let err = repo.create(doc(bad)).await.unwrap_err();
            assert!(matches!(err, RepoError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn test_create_stamps_owner_and_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir, Some("alice"));
        let created = repo
            .create(doc(json!({"id": "p1", "userId": "mallory"})))
            .await
            .unwrap();
        assert_eq!(created["userId"], json!("alice"));
        assert_eq!(created["createdAt"], created["updatedAt"]);
    }

    #[tokio::test]
    async fn test_unbound_create_leaves_owner_absent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir, None);
        let created = repo
            .create(doc(json!({"id": "p1", "userId": "mallory"})))
            .await
            .unwrap();
        assert!(!created.contains_key("userId"));
    }

    #[tokio::test]
    async fn test_import_keeps_supplied_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir, None);
        let created = repo
            .create(doc(json!({
                "id": "p1",
                "createdAt": "2020-01-01T00:00:00.000Z",
                "updatedAt": "2021-01-01T00:00:00.000Z"
            })))
            .await
            .unwrap();
        assert_eq!(created["createdAt"], json!("2020-01-01T00:00:00.000Z"));
        assert_eq!(created["updatedAt"], json!("2021-01-01T00:00:00.000Z"));
    }

    #[tokio::test]
    async fn test_update_ignores_immutable_fields() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo(&dir, Some("alice"));
        let created = repo.create(doc(json!({"id": "p1", "name": "a"}))).await.unwrap();

        let affected = repo
            .update(
                "p1",
                doc(json!({
                    "id": "other",
                    "userId": "x",
                    "_id": "forged",
                    "createdAt": "1999-01-01T00:00:00Z",
                    "name": "b"
                })),
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let updated = repo.find_by_id("p1").await.unwrap().unwrap();
        assert_eq!(updated["id"], json!("p1"));
        assert_eq!(updated["userId"], json!("alice"));
        assert_eq!(updated["_id"], created["_id"]);
        assert_eq!(updated["createdAt"], created["createdAt"]);
        assert_eq!(updated["name"], json!("b"));
        assert!(updated["updatedAt"].as_str().unwrap() > created["updatedAt"].as_str().unwrap());
    }

    #[tokio::test]
    async fn test_find_by_id_with_user() {
        let dir = tempfile::tempdir().unwrap();
        let alice = repo(&dir, Some("alice"));
        alice.create(doc(json!({"id": "p1"}))).await.unwrap();

        let bob = Repository::new(Arc::clone(alice.adapter()), "projects").with_tenant(Some("bob"));
        assert!(bob.find_by_id_with_user("p1", true).await.unwrap().is_none());
        assert!(bob.find_by_id_with_user("p1", false).await.unwrap().is_none());
        assert!(alice.find_by_id_with_user("p1", true).await.unwrap().is_some());

        let unbound = Repository::new(Arc::clone(alice.adapter()), "projects").with_tenant(None::<String>);
        assert!(unbound.find_by_id_with_user("p1", true).await.unwrap().is_some());
    }
}
