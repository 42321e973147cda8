// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Append-only collection journal for the embedded backend.
//
// Each collection lives in one file containing one JSON document per line.
// An update appends the new version of the document; a removal appends a
// tombstone. Opening a journal replays the file (last line per `_id` wins)
// and rewrites it in compacted form. Every append is synced before the
// call returns.
//
// ## On-disk format
//
// ```text
// {"_id":"3f2a...","id":"p1","code":"proj1","name":"Proj",...}
// {"_id":"3f2a...","id":"p1","code":"proj2","name":"Proj",...}
// {"$$deleted":true,"_id":"3f2a..."}
// ```

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::document::{Document, INTERNAL_ID_FIELD};
use crate::error::{StoreError, StoreResult};

/// Marker field of a tombstone line.
pub(crate) const DELETED_MARKER: &str = "$$deleted";

/// In-memory view of one collection plus its append handle.
pub(crate) struct Journal {
    path: PathBuf,
    file: File,
    docs: BTreeMap<String, Document>,
    closed: bool,
}

/// Outcome of replaying a journal file.
#[derive(Debug, Default)]
pub(crate) struct ReplayStats {
    pub(crate) lines: usize,
    pub(crate) skipped: usize,
}

impl Journal {
    /// Open (or create) the journal at `path`, replay it and compact it.
    pub(crate) fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let (docs, stats) = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            replay(&contents, &path)
        } else {
            (BTreeMap::new(), ReplayStats::default())
        };

        write_compacted(&path, &docs)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        info!(
            path = %path.display(),
            documents = docs.len(),
            lines = stats.lines,
            skipped = stats.skipped,
            "Loaded collection journal"
        );

        Ok(Self {
            path,
            file,
            docs,
            closed: false,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// A closed journal has been compacted for shutdown and must be reopened
    /// before further use.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    pub(crate) fn contains(&self, internal_id: &str) -> bool {
        self.docs.contains_key(internal_id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.docs.len()
    }

    /// Append new versions of `docs` in one synced write, then publish them.
    pub(crate) fn write_all(&mut self, docs: Vec<Document>) -> StoreResult<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let mut buffer = Vec::new();
        let mut keyed = Vec::with_capacity(docs.len());
        for doc in docs {
            let internal_id = internal_id_of(&doc)?;
            serde_json::to_writer(&mut buffer, &doc)?;
            buffer.push(b'\n');
            keyed.push((internal_id, doc));
        }
        self.append(&buffer)?;
        for (internal_id, doc) in keyed {
            self.docs.insert(internal_id, doc);
        }
        Ok(())
    }

    /// Append tombstones for `internal_ids` in one synced write, then drop them.
    pub(crate) fn delete_all(&mut self, internal_ids: Vec<String>) -> StoreResult<usize> {
        if internal_ids.is_empty() {
            return Ok(0);
        }
        let mut buffer = Vec::new();
        for internal_id in &internal_ids {
            let tombstone = serde_json::json!({ DELETED_MARKER: true, INTERNAL_ID_FIELD: internal_id });
            serde_json::to_writer(&mut buffer, &tombstone)?;
            buffer.push(b'\n');
        }
        self.append(&buffer)?;
        let removed = internal_ids
            .iter()
            .filter(|internal_id| self.docs.remove(internal_id.as_str()).is_some())
            .count();
        Ok(removed)
    }

    /// Rewrite the file with only the live documents.
    pub(crate) fn compact(&mut self) -> StoreResult<()> {
        write_compacted(&self.path, &self.docs)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        debug!(path = %self.path.display(), documents = self.docs.len(), "Compacted journal");
        Ok(())
    }

    /// Compact and mark the journal closed.
    pub(crate) fn close(&mut self) -> StoreResult<()> {
        self.compact()?;
        self.closed = true;
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> StoreResult<()> {
        self.file.write_all(bytes)?;
        self.file.sync_data()?;
        Ok(())
    }
}

fn internal_id_of(doc: &Document) -> StoreResult<String> {
    match doc.get(INTERNAL_ID_FIELD) {
        Some(Value::String(id)) => Ok(id.clone()),
        other => Err(StoreError::CorruptedData(format!(
            "document without a string `_id`: {other:?}"
        ))),
    }
}

/// Replay journal lines into the live document set.
///
/// Unparseable lines (typically a torn final write) are skipped with a
/// warning rather than failing the whole collection.
pub(crate) fn replay(contents: &str, path: &Path) -> (BTreeMap<String, Document>, ReplayStats) {
    let mut docs = BTreeMap::new();
    let mut stats = ReplayStats::default();

    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        stats.lines += 1;

        let doc = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(doc)) => doc,
            Ok(_) | Err(_) => {
                stats.skipped += 1;
                warn!(path = %path.display(), line = index + 1, "Skipping unreadable journal line");
                continue;
            }
        };

        let internal_id = match doc.get(INTERNAL_ID_FIELD) {
            Some(Value::String(id)) => id.clone(),
            _ => {
                stats.skipped += 1;
                warn!(path = %path.display(), line = index + 1, "Skipping journal line without _id");
                continue;
            }
        };

        if doc.get(DELETED_MARKER) == Some(&Value::Bool(true)) {
            docs.remove(&internal_id);
        } else {
            docs.insert(internal_id, doc);
        }
    }

    (docs, stats)
}

fn write_compacted(path: &Path, docs: &BTreeMap<String, Document>) -> StoreResult<()> {
    let tmp_path = path.with_extension("db~");
    {
        let mut tmp = File::create(&tmp_path)?;
        let mut buffer = Vec::new();
        for doc in docs.values() {
            serde_json::to_writer(&mut buffer, doc)?;
            buffer.push(b'\n');
        }
        tmp.write_all(&buffer)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_replay_last_write_wins_and_tombstones() {
        let contents = [
            r#"{"_id":"a","id":"p1","v":1}"#,
            r#"{"_id":"b","id":"p2","v":1}"#,
            r#"{"_id":"a","id":"p1","v":2}"#,
            r#"{"$$deleted":true,"_id":"b"}"#,
        ]
        .join("\n");
        let (docs, stats) = replay(&contents, Path::new("test.db"));
        assert_eq!(stats.lines, 4);
        assert_eq!(stats.skipped, 0);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs["a"]["v"], json!(2));
    }

    #[test]
    fn test_replay_skips_torn_lines() {
        let contents = "{\"_id\":\"a\",\"v\":1}\n{\"_id\":\"b\",\"v\"";
        let (docs, stats) = replay(contents, Path::new("test.db"));
        assert_eq!(docs.len(), 1);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_write_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("projects.db");

        {
            let mut journal = Journal::open(&path).unwrap();
            journal
                .write_all(vec![
                    doc(json!({"_id": "a", "id": "p1"})),
                    doc(json!({"_id": "b", "id": "p2"})),
                ])
                .unwrap();
            assert_eq!(journal.delete_all(vec!["b".to_string()]).unwrap(), 1);
            assert_eq!(journal.len(), 1);
        }

        let journal = Journal::open(&path).unwrap();
        assert_eq!(journal.len(), 1);
        assert!(journal.contains("a"));

        // Reopening compacts: one live line, no tombstones.
        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 1);
        assert!(!raw.contains(DELETED_MARKER));
    }

    #[test]
    fn test_updates_append_until_compaction() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.db");
        let mut journal = Journal::open(&path).unwrap();

        journal.write_all(vec![doc(json!({"_id": "a", "v": 1}))]).unwrap();
        journal.write_all(vec![doc(json!({"_id": "a", "v": 2}))]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);

        journal.compact().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);

        // The append handle survives compaction.
        journal.write_all(vec![doc(json!({"_id": "b", "v": 1}))]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_write_requires_internal_id() {
        let dir = tempdir().unwrap();
        let mut journal = Journal::open(dir.path().join("c.db")).unwrap();
        let err = journal.write_all(vec![doc(json!({"id": "p1"}))]).unwrap_err();
        assert!(matches!(err, StoreError::CorruptedData(_)));
        assert_eq!(journal.len(), 0);
    }
}
