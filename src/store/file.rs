// src/store/file.rs
//! File-backed document store
//!
//! One JSON file per document under a data directory: the document at
//! `transcripts/{id}` lives in `data_dir/transcripts/{id}.json`, and a
//! sub-collection nests as a directory next to its parent document
//! (`data_dir/transcripts/{id}/paragraphs/{pid}.json`). All access goes
//! through one lock, so readers never observe a half-applied batch. A batch
//! is staged fully in memory before anything touches a live file, and a
//! failure while committing restores the pre-batch contents.

use async_trait::async_trait;
use log::error;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use super::{
    compare_field_values, merge_value, Document, DocumentStore, OrderKey, StoreError, WriteOp,
};

/// A fully resolved batch operation: the target file plus the complete new
/// content, or `None` for a delete.
struct StagedOp {
    file: PathBuf,
    content: Option<String>,
}

pub struct FileStore {
    data_dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            lock: Mutex::new(()),
        }
    }

    fn document_file(&self, path: &str) -> Result<PathBuf, StoreError> {
        if path.is_empty() || path.split('/').any(|seg| seg.is_empty() || seg.starts_with('.')) {
            return Err(StoreError::Backend(format!("invalid document path: {}", path)));
        }
        Ok(self.data_dir.join(format!("{}.json", path)))
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.data_dir.join(collection.trim_end_matches('/'))
    }

    async fn read_document(file: &Path) -> Result<Option<Value>, StoreError> {
        match fs::read_to_string(file).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn read_raw(file: &Path) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(file).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Write via a temp file and rename so the live file is never seen
    /// partially written.
    async fn write_document(file: &Path, content: &str) -> Result<(), StoreError> {
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = file.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, file).await?;
        Ok(())
    }

    async fn remove_document(file: &Path) -> Result<(), StoreError> {
        match fs::remove_file(file).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Resolve every operation to its final file content without touching a
    /// live file. Validates all paths and performs all merges up front, so
    /// any error here leaves the store untouched. A merge over a file staged
    /// earlier in the same batch sees the staged content.
    async fn stage(&self, ops: &[WriteOp]) -> Result<Vec<StagedOp>, StoreError> {
        let mut staged: Vec<StagedOp> = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                WriteOp::Merge { path, data } => {
                    let file = self.document_file(path)?;
                    let current = match staged.iter().rev().find(|s| s.file == file) {
                        Some(earlier) => match &earlier.content {
                            Some(content) => Some(serde_json::from_str(content)?),
                            None => None,
                        },
                        None => Self::read_document(&file).await?,
                    };
                    let mut doc = current.unwrap_or_else(|| Value::Object(Default::default()));
                    merge_value(&mut doc, data.clone());
                    staged.push(StagedOp {
                        file,
                        content: Some(serde_json::to_string_pretty(&doc)?),
                    });
                }
                WriteOp::Delete { path } => {
                    staged.push(StagedOp {
                        file: self.document_file(path)?,
                        content: None,
                    });
                }
            }
        }
        Ok(staged)
    }

    /// Apply a staged batch: all merges first, deletes last. Deleting an
    /// existing file is the least failure-prone step, so by the time deletes
    /// run every write has already landed.
    async fn commit(staged: &[StagedOp]) -> Result<(), StoreError> {
        for op in staged {
            if let Some(content) = &op.content {
                Self::write_document(&op.file, content).await?;
            }
        }
        for op in staged {
            if op.content.is_none() {
                Self::remove_document(&op.file).await?;
            }
        }
        Ok(())
    }

    /// Put the pre-batch contents back after a failed commit. Restore
    /// failures are logged and skipped; the originals of the remaining files
    /// are still worth restoring.
    async fn restore(originals: &[StagedOp]) {
        for original in originals {
            let outcome = match &original.content {
                Some(content) => Self::write_document(&original.file, content).await,
                None => Self::remove_document(&original.file).await,
            };
            if let Err(err) = outcome {
                error!(
                    "rollback failed for {}: {}",
                    original.file.display(),
                    err
                );
            }
        }
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get_document(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let file = self.document_file(path)?;
        let _guard = self.lock.lock().await;
        Self::read_document(&file).await
    }

    async fn merge_document(&self, path: &str, patch: Value) -> Result<(), StoreError> {
        self.run_batch(vec![WriteOp::Merge {
            path: path.to_string(),
            data: patch,
        }])
        .await
    }

    async fn delete_document(&self, path: &str) -> Result<(), StoreError> {
        self.run_batch(vec![WriteOp::Delete {
            path: path.to_string(),
        }])
        .await
    }

    async fn query_ordered(
        &self,
        collection: &str,
        order: OrderKey,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        let dir = self.collection_dir(collection);
        let _guard = self.lock.lock().await;
        let mut results = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(results),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let id = match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(stem) => stem.to_string(),
                None => continue,
            };
            if let Some(data) = Self::read_document(&path).await? {
                results.push(Document { id, data });
            }
        }
        match order {
            OrderKey::DocumentId => results.sort_by(|a, b| a.id.cmp(&b.id)),
            OrderKey::Field(field) => results.sort_by(|a, b| {
                compare_field_values(a.data.get(&field), b.data.get(&field))
                    .then_with(|| a.id.cmp(&b.id))
            }),
        }
        if let Some(limit) = limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn run_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let staged = self.stage(&ops).await?;

        let mut originals = Vec::with_capacity(staged.len());
        for op in &staged {
            originals.push(StagedOp {
                file: op.file.clone(),
                content: Self::read_raw(&op.file).await?,
            });
        }

        if let Err(err) = Self::commit(&staged).await {
            Self::restore(&originals).await;
            return Err(err);
        }
        Ok(())
    }
}
