// src/store/mod.rs
//! Document store adapter
//!
//! This module defines the minimal capability set the repository layer needs
//! from a document database: single-document get/merge/delete, ordered
//! collection queries, and atomic multi-document batches. Implementations
//! must not leak their own query semantics upward.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

pub mod memory;
pub mod file;

pub use memory::MemoryStore;
pub use file::FileStore;

/// Error surfaced by a document store. The store performs no retries;
/// failures are propagated unmodified to the caller.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying I/O or backend failure
    Backend(String),
    /// Document content could not be (de)serialized
    Serialization(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(msg) => write!(f, "store backend error: {}", msg),
            StoreError::Serialization(msg) => write!(f, "store serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// A document returned from a collection query.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Ordering key for collection queries. Document-id ordering is the stable,
/// store-native key used for deterministic pagination.
#[derive(Debug, Clone)]
pub enum OrderKey {
    DocumentId,
    Field(String),
}

/// A single operation inside an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Merge { path: String, data: Value },
    Delete { path: String },
}

/// Minimal document database capability.
///
/// Merge semantics are field-scoped: fields absent from a patch are
/// preserved, and a JSON `null` field value removes the stored field (the
/// explicit field-removal sentinel). `run_batch` applies all operations
/// atomically from the caller's perspective.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a single document, or `None` if it does not exist.
    async fn get_document(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Merge partial data into the document at `path`, creating it if absent.
    async fn merge_document(&self, path: &str, patch: Value) -> Result<(), StoreError>;

    /// Delete a single document. Deleting an absent document is not an error.
    async fn delete_document(&self, path: &str) -> Result<(), StoreError>;

    /// Query a collection ordered ascending by `order`, returning at most
    /// `limit` documents when given.
    async fn query_ordered(
        &self,
        collection: &str,
        order: OrderKey,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Apply all operations atomically (all-or-nothing).
    async fn run_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Allocate a globally unique id in the store's namespace without
    /// creating a document. Callers must treat the id as single-use.
    fn allocate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Merge `patch` into `target` with field-scoped semantics: objects merge
/// recursively, `null` removes the field, anything else replaces.
pub(crate) fn merge_value(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match value {
                    Value::Null => {
                        existing.remove(&key);
                    }
                    Value::Object(_) if existing.get(&key).map_or(false, Value::is_object) => {
                        merge_value(existing.get_mut(&key).unwrap(), value);
                    }
                    other => {
                        existing.insert(key, other);
                    }
                }
            }
        }
        (slot, incoming) => *slot = incoming,
    }
}

/// Total order over JSON field values for query sorting. Missing fields sort
/// first; mixed types fall back to their serialized form.
pub(crate) fn compare_field_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_preserves_disjoint_fields() {
        let mut doc = json!({"metadata": {"originalMimeType": "audio/mpeg"}});
        merge_value(&mut doc, json!({"metadata": {"audioDuration": 42.0}}));
        assert_eq!(doc["metadata"]["originalMimeType"], "audio/mpeg");
        assert_eq!(doc["metadata"]["audioDuration"], 42.0);
    }

    #[test]
    fn merge_null_removes_field() {
        let mut doc = json!({"status": {"progress": "saving", "percent": 80.0}});
        merge_value(&mut doc, json!({"status": {"percent": null}}));
        assert!(doc["status"].get("percent").is_none());
        assert_eq!(doc["status"]["progress"], "saving");
    }

    #[test]
    fn merge_replaces_scalars_and_arrays() {
        let mut doc = json!({"metadata": {"languageCodes": ["nb-NO"]}});
        merge_value(&mut doc, json!({"metadata": {"languageCodes": ["en-US", "nb-NO"]}}));
        assert_eq!(doc["metadata"]["languageCodes"], json!(["en-US", "nb-NO"]));
    }

    #[test]
    fn field_value_ordering_puts_missing_first() {
        use std::cmp::Ordering;
        assert_eq!(compare_field_values(None, Some(&json!(1.0))), Ordering::Less);
        assert_eq!(
            compare_field_values(Some(&json!(1.5)), Some(&json!(2.0))),
            Ordering::Less
        );
    }
}
