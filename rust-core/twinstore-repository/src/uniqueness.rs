// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Cross-collection uniqueness of a secondary key.
//
// A `UniquenessScope` names a field (e.g. `code`) and a set of collections
// across which its value must be unique. A check runs in three steps: the
// proposed value is matched against a format pattern before any I/O, every
// collection of the scope is queried concurrently, and any holder other than
// the entity being updated is a conflict.
//
// The existence check and the write that follows it are only atomic when
// both run inside `guarded`, which serializes them per scope. Writers in
// other processes are not covered.

use std::future::Future;

use futures::future::try_join_all;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use twinstore_adapter::{DocumentAdapter, Filter, FindOptions, ID_FIELD};

use crate::error::{RepoError, RepoResult};

/// Default format for codes: 1 to 64 ASCII letters, digits, `_` or `-`.
pub const DEFAULT_CODE_PATTERN: &str = "^[A-Za-z0-9_-]{1,64}$";

pub const CODE_FIELD: &str = "code";
pub const PROJECTS: &str = "projects";
pub const DESIGN_PROJECTS: &str = "designProjects";
pub const CONTENT_CONFIGS: &str = "contentConfigs";
pub const FIELDS: &str = "fields";

/// Identity of a stored entity: its collection plus logical `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub collection: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

/// A secondary key that must be unique across several collections.
#[derive(Debug)]
pub struct UniquenessScope {
    field: String,
    collections: Vec<String>,
    pattern: Regex,
    gate: Mutex<()>,
}

impl UniquenessScope {
    /// Build a scope over `collections` with values constrained by `pattern`.
    ///
    /// # Errors
    ///
    /// [`RepoError::InvalidArgument`] if `pattern` is not a valid regex or no
    /// collection is given.
    pub fn new<I, S>(field: impl Into<String>, collections: I, pattern: &str) -> RepoResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let collections: Vec<String> = collections.into_iter().map(Into::into).collect();
        if collections.is_empty() {
            return Err(RepoError::InvalidArgument(
                "a uniqueness scope needs at least one collection".to_string(),
            ));
        }
        let pattern = Regex::new(pattern)
            .map_err(|e| RepoError::InvalidArgument(format!("invalid format pattern: {e}")))?;
        Ok(Self {
            field: field.into(),
            collections,
            pattern,
            gate: Mutex::new(()),
        })
    }

    /// `code` across `projects` and `designProjects`.
    pub fn project_codes() -> RepoResult<Self> {
        Self::new(CODE_FIELD, [PROJECTS, DESIGN_PROJECTS], DEFAULT_CODE_PATTERN)
    }

    /// `code` within a single collection.
    pub fn collection_codes(collection: &str) -> RepoResult<Self> {
        Self::new(CODE_FIELD, [collection], DEFAULT_CODE_PATTERN)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    /// Reject malformed values without touching storage.
    pub fn validate_format(&self, value: &str) -> RepoResult<()> {
        if self.pattern.is_match(value) {
            Ok(())
        } else {
            Err(RepoError::InvalidArgument(format!(
                "`{value}` is not a valid {} (expected {})",
                self.field,
                self.pattern.as_str()
            )))
        }
    }

    /// Fail with [`RepoError::Conflict`] if any collection of the scope holds
    /// `value` on an entity other than `exclude`.
    ///
    /// Tenants are not consulted: the key is unique across all owners.
    pub async fn ensure_available(
        &self,
        adapter: &dyn DocumentAdapter,
        value: &str,
        exclude: Option<&EntityRef>,
    ) -> RepoResult<()> {
        self.validate_format(value)?;

        let filter = Filter::new().eq(self.field.as_str(), value);
        // Two hits are enough to tell a foreign holder from the excluded one.
        let options = FindOptions::new().limit(2);
        let lookups = self.collections.iter().map(|collection| {
            let filter = &filter;
            let options = &options;
            async move {
                let holders = adapter.find(collection, filter, options).await?;
                Ok::<_, RepoError>((collection.as_str(), holders))
            }
        });
        let results = try_join_all(lookups).await?;

        for (collection, holders) in results {
            let foreign = holders.iter().find(|doc| {
                let holder_id = doc.get(ID_FIELD).and_then(|v| v.as_str());
                !matches!(exclude, Some(entity)
                    if entity.collection == collection && Some(entity.id.as_str()) == holder_id)
            });
            if let Some(holder) = foreign {
                let holder_id = holder.get(ID_FIELD).and_then(|v| v.as_str()).unwrap_or("?");
                warn!(
                    field = %self.field,
                    value,
                    collection,
                    holder = holder_id,
                    "Uniqueness check rejected value"
                );
                return Err(RepoError::Conflict(format!(
                    "{} `{value}` is already used in `{collection}` by `{holder_id}`",
                    self.field
                )));
            }
        }

        debug!(field = %self.field, value, "Value available");
        Ok(())
    }

    /// Run `critical` while holding the scope's lock.
    ///
    /// Every check-then-write sequence on this scope must go through here for
    /// the check to stay valid until the write lands.
    pub async fn guarded<F, Fut, T>(&self, critical: F) -> RepoResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RepoResult<T>>,
    {
        let _guard = self.gate.lock().await;
        critical().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use twinstore_adapter::EmbeddedAdapter;

    async fn seeded() -> (tempfile::TempDir, Arc<EmbeddedAdapter>) {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(EmbeddedAdapter::new(dir.path()));
        adapter
            .insert(PROJECTS, json!({"id": "p1", "code": "alpha"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        adapter
            .insert(
                DESIGN_PROJECTS,
                json!({"id": "d1", "code": "beta"}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();
        (dir, adapter)
    }

    #[test]
    fn test_format_check() {
        let scope = UniquenessScope::project_codes().unwrap();
        assert!(scope.validate_format("proj_1-a").is_ok());
        for bad in ["", "has space", "dot.ted", "émoji", "x".repeat(65).as_str()] {
            assert!(matches!(
                scope.validate_format(bad),
                Err(RepoError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_invalid_scope_definition() {
        assert!(UniquenessScope::new("code", Vec::<String>::new(), DEFAULT_CODE_PATTERN).is_err());
        assert!(UniquenessScope::new("code", ["a"], "(").is_err());
    }

    #[tokio::test]
    async fn test_conflict_in_either_collection() {
        let (_dir, adapter) = seeded().await;
        let scope = UniquenessScope::project_codes().unwrap();

        assert!(scope.ensure_available(adapter.as_ref(), "gamma", None).await.is_ok());
        assert!(matches!(
            scope.ensure_available(adapter.as_ref(), "alpha", None).await,
            Err(RepoError::Conflict(_))
        ));
        assert!(matches!(
            scope.ensure_available(adapter.as_ref(), "beta", None).await,
            Err(RepoError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_excludes_only_the_same_entity() {
        let (_dir, adapter) = seeded().await;
        let scope = UniquenessScope::project_codes().unwrap();

        let p1 = EntityRef::new(PROJECTS, "p1");
        assert!(scope
            .ensure_available(adapter.as_ref(), "alpha", Some(&p1))
            .await
            .is_ok());

        // Same id in the other collection is a different entity.
        let d_p1 = EntityRef::new(DESIGN_PROJECTS, "p1");
        assert!(matches!(
            scope.ensure_available(adapter.as_ref(), "alpha", Some(&d_p1)).await,
            Err(RepoError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_value_fails_before_io() {
        let scope = UniquenessScope::project_codes().unwrap();
        // A networked adapter that was never connected would fail any I/O.
        let adapter = twinstore_adapter::NetworkedAdapter::new(Default::default()).unwrap();
        assert!(matches!(
            scope.ensure_available(&adapter, "not valid!", None).await,
            Err(RepoError::InvalidArgument(_))
        ));
        assert!(matches!(
            scope.ensure_available(&adapter, "valid", None).await,
            Err(RepoError::Connection(_))
        ));
    }
}
