// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Project service.
//
// Projects live in the `projects` collection and share the `code` namespace
// with design projects. Besides CRUD, a project stores per-language
// configuration under `configs.<language>` and an optional exported JSON
// document under `json`.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::info;
use twinstore_adapter::{Document, Filter, FindOptions, StoreError, ID_FIELD};

use crate::coded::{CodedEntities, NAME_FIELD};
use crate::error::{RepoError, RepoResult};
use crate::repository::Repository;
use crate::uniqueness::{UniquenessScope, CODE_FIELD, PROJECTS};

const LANGUAGES_FIELD: &str = "languages";
const STATUS_FIELD: &str = "status";
const CONFIGS_FIELD: &str = "configs";
const JSON_FIELD: &str = "json";
const DESCRIPTION_FIELD: &str = "description";

/// Tenant-bound operations on projects.
#[derive(Debug, Clone)]
pub struct ProjectService {
    entities: CodedEntities,
}

impl ProjectService {
    pub fn new(repo: Repository, codes: Arc<UniquenessScope>) -> Self {
        Self {
            entities: CodedEntities::new(repo, codes, "project"),
        }
    }

    /// Name of the collection holding projects.
    pub fn collection() -> &'static str {
        PROJECTS
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

    /// Create a project. `id`, `code` and `name` are required; `languages`,
    /// `status`, `contentConfigs` and `description` get defaults.
    pub async fn create(&self, data: Document) -> RepoResult<Document> {
        let defaults = vec![
            (LANGUAGES_FIELD, json!([])),
            (STATUS_FIELD, json!(false)),
            ("contentConfigs", json!([])),
            (DESCRIPTION_FIELD, json!("")),
        ];
        let project = self.entities.create(data, defaults).await?;
        let id = project.get(ID_FIELD).and_then(Value::as_str).unwrap_or_default();
        let code = project.get(CODE_FIELD).and_then(Value::as_str).unwrap_or_default();
        info!(id, code, "Created project");
        Ok(project)
    }

    pub async fn update(&self, id: &str, data: Document) -> RepoResult<Document> {
        self.entities.update(id, data).await
    }

    pub async fn delete(&self, id: &str) -> RepoResult<()> {
        self.entities.delete(id).await
    }

    /// Set `status` and return the updated project.
    pub async fn toggle_status(&self, id: &str, status: bool) -> RepoResult<Document> {
        let mut data = Document::new();
        data.insert(STATUS_FIELD.to_string(), Value::Bool(status));
        self.entities.update(id, data).await
    }

    /// Store `config` for `language`, which must be one of the project's
    /// languages. Returns the stored config.
    pub async fn save_config(&self, id: &str, language: &str, config: Value) -> RepoResult<Value> {
        let project = self.get(id).await?;
        let supported = project
            .get(LANGUAGES_FIELD)
            .and_then(Value::as_array)
            .is_some_and(|langs| langs.iter().any(|l| l.as_str() == Some(language)));
        if !supported {
            return Err(RepoError::InvalidArgument(format!(
                "project `{id}` does not support language `{language}`"
            )));
        }

        let mut configs = configs_of(&project);
        configs.insert(language.to_string(), config.clone());
        let mut data = Document::new();
        data.insert(CONFIGS_FIELD.to_string(), Value::Object(configs));
        self.repository().update(id, data).await?;
        Ok(config)
    }

    /// The config stored for `language`, or `{}`.
    pub async fn get_config(&self, id: &str, language: &str) -> RepoResult<Value> {
        let project = self.get(id).await?;
        Ok(configs_of(&project)
            .remove(language)
            .filter(|v| !v.is_null())
            .unwrap_or_else(empty_object))
    }

    /// Replace the exported JSON of the project with `code`.
    pub async fn save_json(&self, code: &str, json: Value) -> RepoResult<Value> {
        let project = self.by_code(code).await?;
        let id = project_id(&project)?;
        let mut data = Document::new();
        data.insert(JSON_FIELD.to_string(), json);
        self.repository().update(&id, data).await?;

        let updated = self.get(&id).await?;
        Ok(updated
            .get(JSON_FIELD)
            .cloned()
            .filter(|v| !v.is_null())
            .unwrap_or_else(empty_object))
    }

    /// The exported JSON of the project with `code`.
    ///
    /// A stored non-empty `json` object wins; otherwise the document is
    /// assembled from the project's fields and configs.
    pub async fn project_json(&self, code: &str) -> RepoResult<Value> {
        let project = self.by_code(code).await?;
        if let Some(Value::Object(stored)) = project.get(JSON_FIELD) {
            if !stored.is_empty() {
                return Ok(Value::Object(stored.clone()));
            }
        }

        let field = |name: &str, default: Value| {
            project
                .get(name)
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or(default)
        };
        Ok(json!({
            "code": field(CODE_FIELD, Value::Null),
            "name": field(NAME_FIELD, Value::Null),
            "description": field(DESCRIPTION_FIELD, json!("")),
            "languages": field(LANGUAGES_FIELD, json!([])),
            "status": field(STATUS_FIELD, json!(false)),
            "configData": Value::Object(configs_of(&project)),
        }))
    }

    /// All language configs of the project with `code`.
    pub async fn configs_by_code(&self, code: &str) -> RepoResult<Value> {
        let project = self.by_code(code).await?;
        Ok(Value::Object(configs_of(&project)))
    }

    /// One language config (or all of them without a language).
    pub async fn config_by_code(&self, code: &str, language: Option<&str>) -> RepoResult<Value> {
        let project = self.by_code(code).await?;
        let mut configs = configs_of(&project);
        match language {
            None => Ok(Value::Object(configs)),
            Some(language) => configs
                .remove(language)
                .filter(|v| !v.is_null())
                .ok_or_else(|| {
                    RepoError::NotFound(format!(
                        "project `{code}` has no config for language `{language}`"
                    ))
                }),
        }
    }

    async fn by_code(&self, code: &str) -> RepoResult<Document> {
        self.repository()
            .find_one(&Filter::new().eq(CODE_FIELD, code))
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("project with code `{code}` does not exist")))
    }
}

fn configs_of(project: &Document) -> Map<String, Value> {
    match project.get(CONFIGS_FIELD) {
        Some(Value::Object(configs)) => configs.clone(),
        _ => Map::new(),
    }
}

fn project_id(project: &Document) -> RepoResult<String> {
    project
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            RepoError::Storage(StoreError::CorruptedData(
                "stored project has no string `id`".to_string(),
            ))
        })
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}
