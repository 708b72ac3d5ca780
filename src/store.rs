//! Document store implementations.
//!
//! `MemoryStore` keeps documents in a `DashMap` keyed by `_id`. `FileStore`
//! wraps a `MemoryStore` and rewrites a JSON snapshot after every mutation.

use crate::config::write_json_atomic;
use crate::models::{Document, DocumentStore, StoreError};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Keys a patch may never overwrite.
const IMMUTABLE_KEYS: &[&str] = &["_id", "type", "created"];

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn type_of(doc: &Document) -> Option<&str> {
    doc.get("type").and_then(Value::as_str)
}

fn created_of(doc: &Document) -> i64 {
    doc.get("created").and_then(Value::as_i64).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    docs: DashMap<String, Document>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_documents(docs: Vec<Document>) -> Result<Self, StoreError> {
        let store = Self::new();
        for doc in docs {
            let id = doc
                .get("_id")
                .and_then(Value::as_str)
                .ok_or_else(|| StoreError::Decode("document without `_id`".into()))?
                .to_string();
            store.docs.insert(id, doc);
        }
        Ok(store)
    }

    /// Every document, oldest first. Ties break on `_id` so output is stable.
    fn snapshot(&self) -> Vec<Document> {
        let mut docs: Vec<Document> = self.docs.iter().map(|e| e.value().clone()).collect();
        sort_documents(&mut docs);
        docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

fn sort_documents(docs: &mut [Document]) {
    docs.sort_by(|a, b| {
        created_of(a).cmp(&created_of(b)).then_with(|| {
            let a_id = a.get("_id").and_then(Value::as_str).unwrap_or_default();
            let b_id = b.get("_id").and_then(Value::as_str).unwrap_or_default();
            a_id.cmp(b_id)
        })
    });
}

impl DocumentStore for MemoryStore {
    fn create(&self, type_tag: &str, prefix: &str, mut body: Document) -> Result<Document, StoreError> {
        let id = format!("{prefix}_{}", uuid::Uuid::new_v4().simple());
        let now = now_ms();
        body.insert("_id".into(), Value::String(id.clone()));
        body.insert("type".into(), Value::String(type_tag.to_string()));
        body.insert("created".into(), Value::from(now));
        body.insert("modified".into(), Value::from(now));
        body.entry("parentId").or_insert_with(|| Value::String(String::new()));
        body.entry("isPrivate").or_insert(Value::Bool(false));

        self.docs.insert(id, body.clone());
        Ok(body)
    }

    fn get(&self, type_tag: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .docs
            .get(id)
            .filter(|doc| type_of(doc.value()) == Some(type_tag))
            .map(|doc| doc.value().clone()))
    }

    fn update(&self, type_tag: &str, id: &str, patch: Document) -> Result<Document, StoreError> {
        let not_found = || StoreError::NotFound {
            type_tag: type_tag.to_string(),
            id: id.to_string(),
        };
        let mut entry = self.docs.get_mut(id).ok_or_else(not_found)?;
        if type_of(entry.value()) != Some(type_tag) {
            return Err(not_found());
        }

        let doc = entry.value_mut();
        for (key, value) in patch {
            if IMMUTABLE_KEYS.contains(&key.as_str()) {
                continue;
            }
            doc.insert(key, value);
        }
        doc.insert("modified".into(), Value::from(now_ms()));
        Ok(doc.clone())
    }

    fn remove(&self, type_tag: &str, id: &str) -> Result<(), StoreError> {
        let removed = self
            .docs
            .remove_if(id, |_, doc| type_of(doc) == Some(type_tag));
        match removed {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                type_tag: type_tag.to_string(),
                id: id.to_string(),
            }),
        }
    }

    fn all(&self, type_tag: &str) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = self
            .docs
            .iter()
            .filter(|e| type_of(e.value()) == Some(type_tag))
            .map(|e| e.value().clone())
            .collect();
        sort_documents(&mut docs);
        Ok(docs)
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// A `MemoryStore` persisted as a JSON array of documents.
pub struct FileStore {
    inner: MemoryStore,
    path: PathBuf,
    /// Held across mutate + write so an older snapshot never lands last
    /// and a failed write can be undone before anyone sees it.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (or start) the store at `path`. A missing file is an empty store;
    /// an unreadable or corrupt file is an error rather than silent data loss.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let inner = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| StoreError::Persist(format!("{}: {e}", path.display())))?;
            let docs: Vec<Document> = serde_json::from_str(&content)
                .map_err(|e| StoreError::Persist(format!("{}: {e}", path.display())))?;
            MemoryStore::from_documents(docs)?
        } else {
            MemoryStore::new()
        };
        tracing::debug!("[store] Opened {} ({} documents)", path.display(), inner.len());
        Ok(Self {
            inner,
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current snapshot. Callers hold `write_lock`.
    fn persist(&self) -> Result<(), StoreError> {
        let snapshot = self.inner.snapshot();
        write_json_atomic(&self.path, &snapshot).map_err(|e| {
            tracing::error!("[store] {e}");
            StoreError::Persist(e)
        })
    }

    /// Put `id` back to `previous` after a failed write so memory matches disk.
    fn rollback(&self, id: &str, previous: Option<Document>) {
        match previous {
            Some(doc) => {
                self.inner.docs.insert(id.to_string(), doc);
            }
            None => {
                self.inner.docs.remove(id);
            }
        }
    }

    fn previous(&self, id: &str) -> Option<Document> {
        self.inner.docs.get(id).map(|doc| doc.value().clone())
    }
}

impl DocumentStore for FileStore {
    fn create(&self, type_tag: &str, prefix: &str, body: Document) -> Result<Document, StoreError> {
        let _guard = self.write_lock.lock();
        let doc = self.inner.create(type_tag, prefix, body)?;
        if let Err(e) = self.persist() {
            if let Some(id) = doc.get("_id").and_then(Value::as_str) {
                self.rollback(id, None);
            }
            return Err(e);
        }
        Ok(doc)
    }

    fn get(&self, type_tag: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(type_tag, id)
    }

    fn update(&self, type_tag: &str, id: &str, patch: Document) -> Result<Document, StoreError> {
        let _guard = self.write_lock.lock();
        let previous = self.previous(id);
        let doc = self.inner.update(type_tag, id, patch)?;
        if let Err(e) = self.persist() {
            self.rollback(id, previous);
            return Err(e);
        }
        Ok(doc)
    }

    fn remove(&self, type_tag: &str, id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let previous = self.previous(id);
        self.inner.remove(type_tag, id)?;
        if let Err(e) = self.persist() {
            self.rollback(id, previous);
            return Err(e);
        }
        Ok(())
    }

    fn all(&self, type_tag: &str) -> Result<Vec<Document>, StoreError> {
        self.inner.all(type_tag)
    }
}
