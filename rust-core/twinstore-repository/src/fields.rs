// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Field service: CRUD over `fields`, with codes unique within the collection.

use std::sync::Arc;

use serde_json::{json, Value};
use twinstore_adapter::{Document, Filter, FindOptions};

use crate::coded::CodedEntities;
use crate::error::RepoResult;
use crate::repository::Repository;
use crate::uniqueness::{UniquenessScope, FIELDS};

const STATUS_FIELD: &str = "status";

/// Tenant-bound operations on fields.
#[derive(Debug, Clone)]
pub struct FieldService {
    entities: CodedEntities,
}

impl FieldService {
    pub fn new(repo: Repository, codes: Arc<UniquenessScope>) -> Self {
        Self {
            entities: CodedEntities::new(repo, codes, "field").with_generated_ids(),
        }
    }

    pub fn collection() -> &'static str {
        FIELDS
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

    /// `code` and `name` are required; the `id` is generated.
    pub async fn create(&self, data: Document) -> RepoResult<Document> {
        let defaults = vec![(STATUS_FIELD, json!(false)), ("description", json!(""))];
        self.entities.create(data, defaults).await
    }

    pub async fn update(&self, id: &str, data: Document) -> RepoResult<Document> {
        self.entities.update(id, data).await
    }

    pub async fn delete(&self, id: &str) -> RepoResult<()> {
        self.entities.delete(id).await
    }

    pub async fn toggle_status(&self, id: &str, status: bool) -> RepoResult<Document> {
        let mut data = Document::new();
        data.insert(STATUS_FIELD.to_string(), Value::Bool(status));
        self.entities.update(id, data).await
    }
}
