// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Create/update/delete flow shared by entities whose `code` is unique within a
// `UniquenessScope`: projects, design projects, content configs and fields.

use std::sync::Arc;

use serde_json::Value;
use twinstore_adapter::{Document, ID_FIELD};
use uuid::Uuid;

use crate::error::{RepoError, RepoResult};
use crate::repository::{Repository, CREATED_AT_FIELD};
use crate::uniqueness::{EntityRef, UniquenessScope, CODE_FIELD};

pub(crate) const NAME_FIELD: &str = "name";

#[derive(Debug, Clone)]
pub(crate) struct CodedEntities {
    repo: Repository,
    codes: Arc<UniquenessScope>,
    label: &'static str,
    generate_ids: bool,
}

impl CodedEntities {
    pub(crate) fn new(repo: Repository, codes: Arc<UniquenessScope>, label: &'static str) -> Self {
        Self {
            repo,
            codes,
            label,
            generate_ids: false,
        }
    }

    /// Assign a fresh v4 UUID as `id` on create instead of requiring one.
    pub(crate) fn with_generated_ids(mut self) -> Self {
        self.generate_ids = true;
        self
    }

    pub(crate) fn repo(&self) -> &Repository {
        &self.repo
    }

    fn not_found(&self, id: &str) -> RepoError {
        RepoError::NotFound(format!("{} `{id}` does not exist", self.label))
    }

    /// Fetch `id` for the bound tenant or fail with `NotFound`.
    pub(crate) async fn get(&self, id: &str) -> RepoResult<Document> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| self.not_found(id))
    }

    /// Validate required fields, fill `defaults`, then check the code and
    /// insert inside the scope's critical section.
    pub(crate) async fn create(
        &self,
        mut data: Document,
        defaults: Vec<(&'static str, Value)>,
    ) -> RepoResult<Document> {
        if self.generate_ids {
            data.insert(ID_FIELD.to_string(), Value::String(Uuid::new_v4().to_string()));
        }

        let mut missing = Vec::new();
        for field in [ID_FIELD, CODE_FIELD, NAME_FIELD] {
            match data.get(field) {
                Some(Value::String(s)) if !s.trim().is_empty() => {}
                _ => missing.push(field),
            }
        }
        if !missing.is_empty() {
            return Err(RepoError::InvalidArgument(format!(
                "{} requires non-empty {}",
                self.label,
                missing.join(", ")
            )));
        }

        for (field, value) in defaults {
            if matches!(data.get(field), None | Some(Value::Null)) {
                data.insert(field.to_string(), value);
            }
        }

        let id = text(&data, ID_FIELD);
        let code = text(&data, CODE_FIELD);
        let repo = &self.repo;
        let codes = &self.codes;
        // Ids are unique per collection, whichever tenant holds them.
        let any_tenant = Repository::new(Arc::clone(repo.adapter()), repo.collection());
        codes
            .guarded(|| async move {
                codes.validate_format(&code)?;
                if any_tenant.exists(&id).await? {
                    return Err(RepoError::Conflict(format!(
                        "{} `{id}` already exists",
                        self.label
                    )));
                }
                codes
                    .ensure_available(repo.adapter().as_ref(), &code, None)
                    .await?;
                repo.create(data).await
            })
            .await
    }

    /// Merge `data` into `id`, re-checking the code when it changes, and
    /// return the updated document.
    pub(crate) async fn update(&self, id: &str, mut data: Document) -> RepoResult<Document> {
        data.remove(ID_FIELD);
        data.remove(CREATED_AT_FIELD);

        let new_code = match data.get(CODE_FIELD) {
            None => None,
            Some(Value::String(code)) => {
                self.codes.validate_format(code)?;
                Some(code.clone())
            }
            Some(other) => {
                return Err(RepoError::InvalidArgument(format!(
                    "{} code must be a string, got {other}",
                    self.label
                )))
            }
        };

        let existing = self.get(id).await?;
        let current_code = existing.get(CODE_FIELD).and_then(Value::as_str);

        let affected = match new_code {
            Some(code) if Some(code.as_str()) != current_code => {
                let me = EntityRef::new(self.repo.collection(), id);
                let repo = &self.repo;
                let codes = &self.codes;
                codes
                    .guarded(|| async move {
                        codes
                            .ensure_available(repo.adapter().as_ref(), &code, Some(&me))
                            .await?;
                        repo.update(id, data).await
                    })
                    .await?
            }
            _ => self.repo.update(id, data).await?,
        };
        if affected == 0 {
            return Err(self.not_found(id));
        }
        self.get(id).await
    }

    pub(crate) async fn delete(&self, id: &str) -> RepoResult<()> {
        match self.repo.delete(id).await? {
            0 => Err(self.not_found(id)),
            _ => Ok(()),
        }
    }
}

fn text(data: &Document, field: &str) -> String {
    data.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
