// src/store/memory.rs
//! In-memory document store
//!
//! Keeps every document in a single ordered map keyed by full path. Batches
//! are applied under one lock, which makes them atomic by construction. Used
//! by the test suite and usable as an ephemeral backend.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{
    compare_field_values, merge_value, Document, DocumentStore, OrderKey, StoreError, WriteOp,
};

#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents, across all collections.
    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn collect_collection(
        docs: &BTreeMap<String, Value>,
        collection: &str,
    ) -> Vec<Document> {
        let prefix = format!("{}/", collection.trim_end_matches('/'));
        docs.range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            // direct children only, not nested sub-collection documents
            .filter(|(path, _)| !path[prefix.len()..].contains('/'))
            .map(|(path, data)| Document {
                id: path[prefix.len()..].to_string(),
                data: data.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_document(&self, path: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.docs.lock().unwrap().get(path).cloned())
    }

    async fn merge_document(&self, path: &str, patch: Value) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().unwrap();
        let entry = docs
            .entry(path.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        merge_value(entry, patch);
        Ok(())
    }

    async fn delete_document(&self, path: &str) -> Result<(), StoreError> {
        self.docs.lock().unwrap().remove(path);
        Ok(())
    }

    async fn query_ordered(
        &self,
        collection: &str,
        order: OrderKey,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        let docs = self.docs.lock().unwrap();
        let mut results = Self::collect_collection(&docs, collection);
        match order {
            // BTreeMap iteration already yields ascending document ids
            OrderKey::DocumentId => {}
            OrderKey::Field(field) => {
                results.sort_by(|a, b| {
                    compare_field_values(a.data.get(&field), b.data.get(&field))
                        .then_with(|| a.id.cmp(&b.id))
                });
            }
        }
        if let Some(limit) = limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn run_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        // One lock for the whole batch: no reader can observe a partial apply.
        let mut docs = self.docs.lock().unwrap();
        for op in ops {
            match op {
                WriteOp::Merge { path, data } => {
                    let entry = docs
                        .entry(path)
                        .or_insert_with(|| Value::Object(Default::default()));
                    merge_value(entry, data);
                }
                WriteOp::Delete { path } => {
                    docs.remove(&path);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn merge_creates_and_preserves() {
        let store = MemoryStore::new();
        store
            .merge_document("transcripts/a", json!({"userId": "u1"}))
            .await
            .unwrap();
        store
            .merge_document("transcripts/a", json!({"playbackGsUrl": "gs://x"}))
            .await
            .unwrap();
        let doc = store.get_document("transcripts/a").await.unwrap().unwrap();
        assert_eq!(doc["userId"], "u1");
        assert_eq!(doc["playbackGsUrl"], "gs://x");
    }

    #[tokio::test]
    async fn query_skips_nested_subcollections() {
        let store = MemoryStore::new();
        store
            .merge_document("transcripts/a", json!({"userId": "u1"}))
            .await
            .unwrap();
        store
            .merge_document("transcripts/a/paragraphs/p1", json!({"startTime": 1.0}))
            .await
            .unwrap();
        let docs = store
            .query_ordered("transcripts", OrderKey::DocumentId, None)
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "a");
    }

    #[tokio::test]
    async fn query_orders_by_field_ascending() {
        let store = MemoryStore::new();
        for (id, start) in [("p3", 9.5), ("p1", 0.0), ("p2", 4.2)] {
            store
                .merge_document(
                    &format!("transcripts/a/paragraphs/{}", id),
                    json!({"startTime": start}),
                )
                .await
                .unwrap();
        }
        let docs = store
            .query_ordered(
                "transcripts/a/paragraphs",
                OrderKey::Field("startTime".into()),
                None,
            )
            .await
            .unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn query_respects_limit_with_id_ordering() {
        let store = MemoryStore::new();
        for i in 0..25 {
            store
                .merge_document(
                    &format!("transcripts/a/paragraphs/p{:02}", i),
                    json!({"text": "x"}),
                )
                .await
                .unwrap();
        }
        let docs = store
            .query_ordered("transcripts/a/paragraphs", OrderKey::DocumentId, Some(10))
            .await
            .unwrap();
        assert_eq!(docs.len(), 10);
        assert_eq!(docs[0].id, "p00");
    }

    #[tokio::test]
    async fn batch_applies_all_operations() {
        let store = MemoryStore::new();
        store
            .run_batch(vec![
                WriteOp::Merge {
                    path: "transcripts/a/paragraphs/p1".into(),
                    data: json!({"text": "hello"}),
                },
                WriteOp::Merge {
                    path: "transcripts/a".into(),
                    data: json!({"status": {"percent": 50.0}}),
                },
            ])
            .await
            .unwrap();
        assert_eq!(store.len(), 2);
        let parent = store.get_document("transcripts/a").await.unwrap().unwrap();
        assert_eq!(parent["status"]["percent"], 50.0);
    }

    #[tokio::test]
    async fn delete_absent_document_is_ok() {
        let store = MemoryStore::new();
        store.delete_document("transcripts/missing").await.unwrap();
    }
}
