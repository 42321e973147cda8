// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Design project service: CRUD over `designProjects`, sharing the `code`
// namespace with projects.

use std::sync::Arc;

use serde_json::json;
use twinstore_adapter::{Document, Filter, FindOptions};

use crate::coded::CodedEntities;
use crate::error::RepoResult;
use crate::repository::Repository;
use crate::uniqueness::{UniquenessScope, DESIGN_PROJECTS};

/// Tenant-bound operations on design projects.
#[derive(Debug, Clone)]
pub struct DesignProjectService {
    entities: CodedEntities,
}

impl DesignProjectService {
    pub fn new(repo: Repository, codes: Arc<UniquenessScope>) -> Self {
        Self {
            entities: CodedEntities::new(repo, codes, "design project"),
        }
    }

    pub fn collection() -> &'static str {
        DESIGN_PROJECTS
    }

    pub fn repository(&self) -> &Repository {
        self.entities.repo()
    }

    pub async fn list(&self, filter: &Filter, options: &FindOptions) -> RepoResult<Vec<Document>> {
        self.repository().find(filter, options).await
    }

    pub async fn get(&self, id: &str) -> RepoResult<Document> {
        self.entities.get(id).await
    }

    /// `id`, `code` and `name` are required; `description`, `datasources`,
    /// `behaviors` and `pages` get defaults.
    pub async fn create(&self, data: Document) -> RepoResult<Document> {
        let defaults = vec![
            ("description", json!("")),
            ("datasources", json!([])),
            ("behaviors", json!([])),
            ("pages", json!([])),
        ];
        self.entities.create(data, defaults).await
    }

    pub async fn update(&self, id: &str, data: Document) -> RepoResult<Document> {
        self.entities.update(id, data).await
    }

    pub async fn delete(&self, id: &str) -> RepoResult<()> {
        self.entities.delete(id).await
    }
}
