// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Content config service: CRUD over `contentConfigs`. Codes are unique within
// the collection only, and ids are generated on create.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;
use twinstore_adapter::{Document, Filter, FindOptions, ID_FIELD};

use crate::coded::CodedEntities;
use crate::error::RepoResult;
use crate::repository::Repository;
use crate::uniqueness::{UniquenessScope, CODE_FIELD, CONTENT_CONFIGS};

const STATUS_FIELD: &str = "status";

/// Tenant-bound operations on content configs.
#[derive(Debug, Clone)]
pub struct ContentConfigService {
    entities: CodedEntities,
}

impl ContentConfigService {
    pub fn new(repo: Repository, codes: Arc<UniquenessScope>) -> Self {
        Self {
            entities: CodedEntities::new(repo, codes, "content config").with_generated_ids(),
        }
    }

    pub fn collection() -> &'static str {
        CONTENT_CONFIGS
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

    /// `code` and `name` are required and any supplied `id` is replaced by a
    /// fresh one. `status`, `tabs` and `description` get defaults.
    pub async fn create(&self, data: Document) -> RepoResult<Document> {
        let defaults = vec![
            (STATUS_FIELD, json!(false)),
            ("tabs", json!([])),
            ("description", json!("")),
        ];
        let config = self.entities.create(data, defaults).await?;
        let id = config.get(ID_FIELD).and_then(Value::as_str).unwrap_or_default();
        let code = config.get(CODE_FIELD).and_then(Value::as_str).unwrap_or_default();
        info!(id, code, "Created content config");
        Ok(config)
    }

    pub async fn update(&self, id: &str, data: Document) -> RepoResult<Document> {
        self.entities.update(id, data).await
    }

    pub async fn delete(&self, id: &str) -> RepoResult<()> {
        self.entities.delete(id).await
    }

    /// Set `status` and return the updated content config.
    pub async fn toggle_status(&self, id: &str, status: bool) -> RepoResult<Document> {
        let mut data = Document::new();
        data.insert(STATUS_FIELD.to_string(), Value::Bool(status));
        self.entities.update(id, data).await
    }
}
