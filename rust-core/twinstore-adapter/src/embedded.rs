// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Embedded, file-per-collection document backend.
//
// Every collection is an append-only journal (`<data_dir>/<collection>.db`)
// loaded lazily on first access and cached until `close()`. File I/O is
// blocking, so each operation runs on tokio's blocking pool while holding the
// collection's mutex; a write returns only after its journal line is synced.
//
// # Design
//
// - `collections` maps collection name to a shared journal handle. Lookups
//   take the read lock; a miss upgrades to the write lock, re-checks, and
//   replays the file.
// - Documents receive a UUID `_id`. The logical `id` is an ordinary field, so
//   every query is a field-based scan over the in-memory view.
// - `close()` compacts and marks closed every loaded journal while holding
//   the cache's write lock, then drops the cache. An operation still holding
//   a closed journal retries against a reload. The next operation reloads
//   from disk, which is how persistence across restarts is exercised in
//   tests.
// - There is no cross-process coordination: one process owns a data
//   directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::adapter::DocumentAdapter;
use crate::document::{Document, Filter, FindOptions, INTERNAL_ID_FIELD};
use crate::error::{StoreError, StoreResult};
use crate::journal::Journal;
use crate::update::{RemoveOptions, Update, UpdateOptions};

type SharedJournal = Arc<Mutex<Journal>>;

/// A local document store keeping one journal file per collection.
///
/// # Example
///
/// ```rust,no_run
/// use twinstore_adapter::{DocumentAdapter, EmbeddedAdapter, Filter};
///
/// # tokio_test::block_on(async {
/// let store = EmbeddedAdapter::new("/tmp/twinstore-data");
/// let mut doc = serde_json::Map::new();
/// doc.insert("id".into(), "p1".into());
/// store.insert("projects", doc).await.unwrap();
/// let found = store.find_one("projects", &Filter::by_id("p1")).await.unwrap();
/// assert!(found.is_some());
/// # });
/// ```
pub struct EmbeddedAdapter {
    data_dir: PathBuf,
    collections: RwLock<HashMap<String, SharedJournal>>,
}

impl EmbeddedAdapter {
    /// Create an adapter rooted at `data_dir`. Nothing is touched on disk
    /// until the first operation or `connect()`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Names of the collections currently loaded in memory.
    pub async fn loaded_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.data_dir.join(format!("{collection}.db"))
    }

    /// Resolve (and lazily load) the journal for `collection`.
    async fn journal(&self, collection: &str) -> StoreResult<SharedJournal> {
        validate_collection_name(collection)?;

        if let Some(journal) = self.collections.read().await.get(collection) {
            return Ok(Arc::clone(journal));
        }

        let mut collections = self.collections.write().await;
        if let Some(journal) = collections.get(collection) {
            return Ok(Arc::clone(journal));
        }

        let path = self.collection_path(collection);
        let journal = tokio::task::spawn_blocking(move || Journal::open(path))
            .await
            .map_err(join_error)??;
        let journal = Arc::new(Mutex::new(journal));
        collections.insert(collection.to_string(), Arc::clone(&journal));
        Ok(journal)
    }

    /// Run a blocking operation against one collection's journal.
    ///
    /// An operation that resolved its journal before a concurrent `close()`
    /// finds it marked closed once it gets the lock, and runs again against
    /// a freshly loaded journal.
    async fn with_journal<T, F>(&self, collection: &str, op: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Journal) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut op = op;
        loop {
            let journal = self.journal(collection).await?;
            let held = Arc::clone(&journal);
            let outcome = tokio::task::spawn_blocking(move || -> Result<StoreResult<T>, F> {
                let mut guard = match journal.lock() {
                    Ok(guard) => guard,
                    Err(_) => {
                        return Ok(Err(StoreError::CorruptedData(
                            "collection lock poisoned".to_string(),
                        )))
                    }
                };
                if guard.is_closed() {
                    return Err(op);
                }
                Ok(op(&mut guard))
            })
            .await
            .map_err(join_error)?;

            match outcome {
                Ok(result) => return result,
                Err(returned) => {
                    debug!(collection, "Journal closed underneath operation; reloading");
                    let mut collections = self.collections.write().await;
                    if collections
                        .get(collection)
                        .is_some_and(|cached| Arc::ptr_eq(cached, &held))
                    {
                        collections.remove(collection);
                    }
                    op = returned;
                }
            }
        }
    }
}

impl std::fmt::Debug for EmbeddedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedAdapter")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

fn join_error(err: tokio::task::JoinError) -> StoreError {
    StoreError::Io(std::io::Error::other(format!("task join: {err}")))
}

/// Collection names become file names, so only a conservative character set
/// is accepted.
pub(crate) fn validate_collection_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidArgument(format!(
            "invalid collection name `{name}`"
        )))
    }
}

fn validate_new_document(doc: &Document) -> StoreResult<()> {
    if let Some(key) = doc.keys().find(|key| key.starts_with('$')) {
        return Err(StoreError::InvalidArgument(format!(
            "field names may not start with `$` (found `{key}`)"
        )));
    }
    match doc.get(INTERNAL_ID_FIELD) {
        None | Some(Value::String(_)) => Ok(()),
        Some(other) => Err(StoreError::InvalidArgument(format!(
            "`_id` must be a string, got {other}"
        ))),
    }
}

fn internal_id(doc: &Document) -> Option<&str> {
    doc.get(INTERNAL_ID_FIELD).and_then(Value::as_str)
}

#[async_trait]
impl DocumentAdapter for EmbeddedAdapter {
    async fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let filter = filter.clone();
        self.with_journal(collection, move |journal| {
            Ok(journal.documents().find(|doc| filter.matches(doc)).cloned())
        })
        .await
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let filter = filter.clone();
        let options = options.clone();
        let docs = self
            .with_journal(collection, move |journal| {
                let matched: Vec<Document> = journal
                    .documents()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect();
                Ok(options.apply(matched))
            })
            .await?;
        debug!(collection, returned = docs.len(), "find");
        Ok(docs)
    }

    async fn insert(&self, collection: &str, mut doc: Document) -> StoreResult<Document> {
        validate_new_document(&doc)?;
        if !doc.contains_key(INTERNAL_ID_FIELD) {
            doc.insert(
                INTERNAL_ID_FIELD.to_string(),
                Value::String(Uuid::new_v4().simple().to_string()),
            );
        }

        let collection_name = collection.to_string();
        self.with_journal(collection, move |journal| {
            let id = internal_id(&doc).unwrap_or_default().to_string();
            if journal.contains(&id) {
                return Err(StoreError::Conflict(format!(
                    "document with _id `{id}` already exists in `{collection_name}`"
                )));
            }
            journal.write_all(vec![doc.clone()])?;
            debug!(collection = %collection_name, internal_id = %id, "insert");
            Ok(doc)
        })
        .await
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        options: UpdateOptions,
    ) -> StoreResult<u64> {
        update.validate()?;
        let filter = filter.clone();
        let update = update.clone();

        let affected = self
            .with_journal(collection, move |journal| {
                let mut changed = Vec::new();
                for doc in journal.documents().filter(|doc| filter.matches(doc)) {
                    let mut next = doc.clone();
                    update.apply(&mut next)?;
                    changed.push(next);
                    if !options.multi {
                        break;
                    }
                }

                let matched = changed.len() as u64;
                if matched == 0 && options.upsert {
                    let mut seed = filter.seed_document();
                    update.apply(&mut seed)?;
                    if !seed.contains_key(INTERNAL_ID_FIELD) {
                        seed.insert(
                            INTERNAL_ID_FIELD.to_string(),
                            Value::String(Uuid::new_v4().simple().to_string()),
                        );
                    }
                    journal.write_all(vec![seed])?;
                    return Ok(1);
                }

                journal.write_all(changed)?;
                Ok(matched)
            })
            .await?;

        debug!(collection, affected, multi = options.multi, "update");
        Ok(affected)
    }

    async fn remove(
        &self,
        collection: &str,
        filter: &Filter,
        options: RemoveOptions,
    ) -> StoreResult<u64> {
        let filter = filter.clone();
        let removed = self
            .with_journal(collection, move |journal| {
                let mut ids = Vec::new();
                for doc in journal.documents().filter(|doc| filter.matches(doc)) {
                    if let Some(id) = internal_id(doc) {
                        ids.push(id.to_string());
                    }
                    if !options.multi {
                        break;
                    }
                }
                Ok(journal.delete_all(ids)? as u64)
            })
            .await?;

        debug!(collection, removed, multi = options.multi, "remove");
        Ok(removed)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let filter = filter.clone();
        self.with_journal(collection, move |journal| {
            Ok(journal.documents().filter(|doc| filter.matches(doc)).count() as u64)
        })
        .await
    }

    async fn connect(&self) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        info!(data_dir = %self.data_dir.display(), "Embedded store ready");
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        // Held until every journal is compacted, so nothing reloads a file
        // that is still being rewritten.
        let mut collections = self.collections.write().await;
        let closed = collections.len();

        for (name, journal) in collections.drain() {
            tokio::task::spawn_blocking(move || -> StoreResult<()> {
                let mut guard = journal
                    .lock()
                    .map_err(|_| StoreError::CorruptedData("collection lock poisoned".to_string()))?;
                guard.close()?;
                debug!(collection = %name, path = %guard.path().display(), "Closed collection");
                Ok(())
            })
            .await
            .map_err(join_error)??;
        }
        drop(collections);

        info!(data_dir = %self.data_dir.display(), collections = closed, "Embedded store closed");
        Ok(())
    }

    fn name(&self) -> &str {
        "embedded"
    }
}
