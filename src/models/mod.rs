//! Persisted record types and the per-type repository over a document store.
//!
//! Records travel to and from the store as JSON objects ([`Document`]); the
//! store assigns `_id`, stamps `type`, `created` and `modified`, and owns the
//! persisted bytes. Everything handed out by a [`Repository`] is a value
//! snapshot, never a live reference into the store.

pub mod settings;
pub mod websocket_request;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A record as the document store sees it.
pub type Document = Map<String, Value>;

/// Metadata common to every record. Supplied by the store, never by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseModel {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(rename = "parentId", default)]
    pub parent_id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub modified: i64,
    #[serde(rename = "isPrivate", default)]
    pub is_private: bool,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Creation attempted without the parent reference the type requires.
    MissingParent { type_tag: String, patch: String },
    NotFound { type_tag: String, id: String },
    /// A stored document does not match the record shape.
    Decode(String),
    /// The backing storage could not be read or written.
    Persist(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::MissingParent { type_tag, patch } => {
                write!(f, "New {type_tag} missing `parentId`: {patch}")
            }
            StoreError::NotFound { type_tag, id } => write!(f, "{type_tag} {id} not found"),
            StoreError::Decode(msg) => write!(f, "Invalid document: {msg}"),
            StoreError::Persist(msg) => write!(f, "Storage error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Store interface
// ---------------------------------------------------------------------------

/// Generic document store consumed by every repository.
///
/// All operations are scoped by type tag. `create` assigns identity and
/// timestamps; `update` is a shallow merge of `patch` into the stored document.
pub trait DocumentStore: Send + Sync {
    fn create(&self, type_tag: &str, prefix: &str, body: Document) -> Result<Document, StoreError>;
    fn get(&self, type_tag: &str, id: &str) -> Result<Option<Document>, StoreError>;
    fn update(&self, type_tag: &str, id: &str, patch: Document) -> Result<Document, StoreError>;
    fn remove(&self, type_tag: &str, id: &str) -> Result<(), StoreError>;
    fn all(&self, type_tag: &str) -> Result<Vec<Document>, StoreError>;
}

/// Declarative description of one record type.
pub trait Model: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Human-readable type name.
    const NAME: &'static str;
    /// Type tag stored in every document of this type.
    const TYPE: &'static str;
    /// Prefix of store-assigned identifiers.
    const PREFIX: &'static str;
    const CAN_DUPLICATE: bool;
    const CAN_SYNC: bool;
    /// Whether creation must carry a non-empty `parentId`.
    const REQUIRES_PARENT: bool;

    /// Default field values for a fresh record.
    type Fields: Serialize;
    /// Partial update; `None` fields are left untouched.
    type Patch: Serialize + Default;

    fn init() -> Self::Fields;

    fn base(&self) -> &BaseModel;

    /// Upgrade a document read from the store to the current shape.
    fn migrate(self) -> Self {
        self
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// CRUD accessors for one record type over an injected [`DocumentStore`].
pub struct Repository<M> {
    store: Arc<dyn DocumentStore>,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for Repository<M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _model: PhantomData,
        }
    }
}

impl<M: Model> Repository<M> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _model: PhantomData,
        }
    }

    pub fn init(&self) -> M::Fields {
        M::init()
    }

    /// Create a record from `patch` layered over [`Model::init`] defaults.
    pub fn create(&self, patch: &M::Patch) -> Result<M, StoreError> {
        let patch = to_document(patch)?;
        if M::REQUIRES_PARENT && !has_parent(&patch) {
            return Err(StoreError::MissingParent {
                type_tag: M::TYPE.to_string(),
                patch: Value::Object(patch).to_string(),
            });
        }

        let mut body = to_document(&M::init())?;
        body.extend(patch);

        let doc = self.store.create(M::TYPE, M::PREFIX, body)?;
        decode::<M>(doc)
    }

    pub fn update(&self, record: &M, patch: &M::Patch) -> Result<M, StoreError> {
        let patch = to_document(patch)?;
        let doc = self.store.update(M::TYPE, &record.base().id, patch)?;
        decode::<M>(doc)
    }

    pub fn remove(&self, record: &M) -> Result<(), StoreError> {
        self.store.remove(M::TYPE, &record.base().id)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<M>, StoreError> {
        self.store.get(M::TYPE, id)?.map(decode::<M>).transpose()
    }

    pub fn all(&self) -> Result<Vec<M>, StoreError> {
        self.store.all(M::TYPE)?.into_iter().map(decode::<M>).collect()
    }
}

fn has_parent(patch: &Document) -> bool {
    patch
        .get("parentId")
        .and_then(Value::as_str)
        .is_some_and(|p| !p.is_empty())
}

fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Decode(format!("expected an object, got {other}"))),
        Err(e) => Err(StoreError::Decode(e.to_string())),
    }
}

fn decode<M: Model>(doc: Document) -> Result<M, StoreError> {
    serde_json::from_value::<M>(Value::Object(doc))
        .map(M::migrate)
        .map_err(|e| StoreError::Decode(format!("{}: {e}", M::TYPE)))
}
