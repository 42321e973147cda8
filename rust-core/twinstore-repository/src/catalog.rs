// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Catalog: hands out tenant-bound catalog services.
//
// The catalog owns the `code` uniqueness scopes: one shared by projects and
// design projects, and one per single-collection kind (content configs,
// fields). Every service it creates for a kind serializes code checks through
// that scope's critical section. The
// adapter is resolved from the registry on each call, which keeps services
// valid across a registry close/reopen.

use std::sync::Arc;

use twinstore_adapter::AdapterRegistry;

use crate::content_configs::ContentConfigService;
use crate::design_projects::DesignProjectService;
use crate::error::RepoResult;
use crate::fields::FieldService;
use crate::projects::ProjectService;
use crate::repository::Repository;
use crate::uniqueness::{UniquenessScope, CONTENT_CONFIGS, FIELDS};

#[derive(Debug, Clone)]
pub struct Catalog {
    registry: Arc<AdapterRegistry>,
    codes: Arc<UniquenessScope>,
    content_config_codes: Arc<UniquenessScope>,
    field_codes: Arc<UniquenessScope>,
}

impl Catalog {
    /// A catalog using the `code` scope over projects and design projects.
    pub fn new(registry: Arc<AdapterRegistry>) -> RepoResult<Self> {
        Self::with_scope(registry, UniquenessScope::project_codes()?)
    }

    /// A catalog whose projects and design projects use `codes`.
    pub fn with_scope(registry: Arc<AdapterRegistry>, codes: UniquenessScope) -> RepoResult<Self> {
        Ok(Self {
            registry,
            codes: Arc::new(codes),
            content_config_codes: Arc::new(UniquenessScope::collection_codes(CONTENT_CONFIGS)?),
            field_codes: Arc::new(UniquenessScope::collection_codes(FIELDS)?),
        })
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    pub fn codes(&self) -> &Arc<UniquenessScope> {
        &self.codes
    }

    /// A repository over `collection`, bound to `tenant` when given.
    pub async fn repository(&self, collection: &str, tenant: Option<&str>) -> RepoResult<Repository> {
        let adapter = self.registry.adapter().await?;
        Ok(Repository::new(adapter, collection).with_tenant(tenant))
    }

    pub async fn projects(&self, tenant: Option<&str>) -> RepoResult<ProjectService> {
        let repo = self.repository(ProjectService::collection(), tenant).await?;
        Ok(ProjectService::new(repo, Arc::clone(&self.codes)))
    }

    pub async fn design_projects(&self, tenant: Option<&str>) -> RepoResult<DesignProjectService> {
        let repo = self
            .repository(DesignProjectService::collection(), tenant)
            .await?;
        Ok(DesignProjectService::new(repo, Arc::clone(&self.codes)))
    }

    pub async fn content_configs(&self, tenant: Option<&str>) -> RepoResult<ContentConfigService> {
        let repo = self
            .repository(ContentConfigService::collection(), tenant)
            .await?;
        Ok(ContentConfigService::new(repo, Arc::clone(&self.content_config_codes)))
    }

    pub async fn fields(&self, tenant: Option<&str>) -> RepoResult<FieldService> {
        let repo = self.repository(FieldService::collection(), tenant).await?;
        Ok(FieldService::new(repo, Arc::clone(&self.field_codes)))
    }
}
