// src/repository/transcripts.rs
//! Transcript repository
//!
//! Owns all transcript and paragraph persistence: progress-state writes, the
//! paragraph-accumulation protocol, and the bounded batch deletion of a
//! transcript together with its unbounded child collection. Every write is a
//! merge against the document store; the repository never retries, and any
//! store failure is propagated as `StoreError`.

use chrono::{Duration, Utc};
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::store::{DocumentStore, OrderKey, StoreError, WriteOp};

use super::types::{Paragraph, Progress, Transcript};

const COLLECTION: &str = "transcripts";
const DEFAULT_DELETE_BATCH_SIZE: usize = 100;

/// How far back the stalled-transcript finder looks.
const STALLED_WINDOW_DAYS: i64 = 2;

fn transcript_path(id: &str) -> String {
    format!("{}/{}", COLLECTION, id)
}

fn paragraphs_collection(id: &str) -> String {
    format!("{}/{}/paragraphs", COLLECTION, id)
}

fn paragraph_path(id: &str, paragraph_id: &str) -> String {
    format!("{}/{}/paragraphs/{}", COLLECTION, id, paragraph_id)
}

/// Remove `null` entries from a serialized value. The store treats `null` as
/// the field-removal sentinel, so a "no value" field must be stripped rather
/// than written.
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

pub struct TranscriptRepository {
    store: Arc<dyn DocumentStore>,
    delete_batch_size: usize,
}

impl TranscriptRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
        }
    }

    pub fn with_delete_batch_size(mut self, batch_size: usize) -> Self {
        self.delete_batch_size = batch_size.max(1);
        self
    }

    /// Allocate a transcript id without creating a document. The id is
    /// unique within the transcripts namespace; callers must treat it as
    /// single-use.
    pub fn build_new_id(&self) -> String {
        self.store.allocate_id()
    }

    /// Merge a partial record into `transcripts/{id}`, creating the document
    /// if absent. This is the sole low-level write primitive; every setter
    /// below is a convenience wrapper over it.
    pub async fn update_transcript(&self, id: &str, partial: Value) -> Result<(), StoreError> {
        debug!("merging transcript {}", id);
        self.store.merge_document(&transcript_path(id), partial).await
    }

    /// Set the progress state, stamping `lastUpdated`. Entering Analysing or
    /// Saving resets `percent` to 0. Entering Done removes the field; its
    /// absence is the completion signal.
    pub async fn set_progress(&self, id: &str, progress: Progress) -> Result<(), StoreError> {
        let mut status = json!({
            "progress": progress,
            "lastUpdated": Utc::now(),
        });
        match progress {
            Progress::Analysing | Progress::Saving => {
                status["percent"] = json!(0.0);
            }
            Progress::Done => {
                status["percent"] = Value::Null;
            }
            _ => {}
        }
        info!("transcript {} progress -> {:?}", id, progress);
        self.update_transcript(id, json!({ "status": status })).await
    }

    /// Set `status.percent` alone. Independent of `set_progress`; the two
    /// may be called in either order.
    pub async fn set_percent(&self, id: &str, percent: f64) -> Result<(), StoreError> {
        self.update_transcript(
            id,
            json!({ "status": { "percent": percent, "lastUpdated": Utc::now() } }),
        )
        .await
    }

    pub async fn set_duration(&self, id: &str, seconds: f64) -> Result<(), StoreError> {
        self.update_transcript(id, json!({ "metadata": { "audioDuration": seconds } }))
            .await
    }

    pub async fn set_flac_file_location(&self, id: &str, uri: &str) -> Result<(), StoreError> {
        self.update_transcript(id, json!({ "speechData": { "flacFileLocationUri": uri } }))
            .await
    }

    /// Store the external speech service's long-running operation handle.
    pub async fn set_speech_reference(&self, id: &str, reference: &str) -> Result<(), StoreError> {
        self.update_transcript(id, json!({ "speechData": { "reference": reference } }))
            .await
    }

    pub async fn set_playback_url(&self, id: &str, url: &str) -> Result<(), StoreError> {
        self.update_transcript(id, json!({ "playbackGsUrl": url })).await
    }

    /// Record a failure under `status.error` so progress UIs can surface it.
    /// The error is flattened to plain fields; no-value fields are stripped
    /// because the store cannot persist them.
    pub async fn record_error(
        &self,
        id: &str,
        error: &(dyn std::error::Error + Send + Sync + 'static),
    ) -> Result<(), StoreError> {
        warn!("transcript {} failed: {}", id, error);
        let serialized = strip_nulls(json!({
            "message": error.to_string(),
            "source": error.source().map(|source| source.to_string()),
            "recordedAt": Utc::now(),
        }));
        self.update_transcript(id, json!({ "status": { "error": serialized } }))
            .await
    }

    /// Atomically create a paragraph and update the parent's percent in one
    /// batch. A reader never observes a percent value inconsistent with the
    /// paragraphs actually stored.
    pub async fn add_paragraph(
        &self,
        id: &str,
        paragraph: &Paragraph,
        percent: f64,
    ) -> Result<String, StoreError> {
        let paragraph_id = self.store.allocate_id();
        let mut data = serde_json::to_value(paragraph)?;
        if let Value::Object(map) = &mut data {
            // the document id is the identity; no self-referential field
            map.remove("id");
        }
        self.store
            .run_batch(vec![
                WriteOp::Merge {
                    path: paragraph_path(id, &paragraph_id),
                    data,
                },
                WriteOp::Merge {
                    path: transcript_path(id),
                    data: json!({ "status": { "percent": percent, "lastUpdated": Utc::now() } }),
                },
            ])
            .await?;
        Ok(paragraph_id)
    }

    pub async fn get_transcript(&self, id: &str) -> Result<Option<Transcript>, StoreError> {
        let doc = self.store.get_document(&transcript_path(id)).await?;
        doc.map(|data| {
            let mut transcript: Transcript = serde_json::from_value(data)?;
            transcript.id.get_or_insert_with(|| id.to_string());
            Ok(transcript)
        })
        .transpose()
    }

    /// All paragraphs of a transcript in canonical reading order (ascending
    /// `startTime`).
    pub async fn get_paragraphs(&self, id: &str) -> Result<Vec<Paragraph>, StoreError> {
        let docs = self
            .store
            .query_ordered(
                &paragraphs_collection(id),
                OrderKey::Field("startTime".to_string()),
                None,
            )
            .await?;
        docs.into_iter()
            .map(|doc| {
                let mut paragraph: Paragraph = serde_json::from_value(doc.data)?;
                paragraph.id.get_or_insert(doc.id);
                Ok(paragraph)
            })
            .collect()
    }

    /// Current progress state. Returns the `NotFound` sentinel when the
    /// document or its status field is absent; never fails on absence.
    pub async fn get_progress(&self, id: &str) -> Result<Progress, StoreError> {
        Ok(self
            .get_transcript(id)
            .await?
            .map(|transcript| transcript.progress())
            .unwrap_or(Progress::NotFound))
    }

    /// Full scan of the transcripts collection. Cost grows with the whole
    /// namespace, so this is for administrative and batch use, not the
    /// request path.
    pub async fn get_transcripts(&self) -> Result<HashMap<String, Transcript>, StoreError> {
        let docs = self
            .store
            .query_ordered(COLLECTION, OrderKey::DocumentId, None)
            .await?;
        docs.into_iter()
            .map(|doc| {
                let mut transcript: Transcript = serde_json::from_value(doc.data)?;
                transcript.id.get_or_insert_with(|| doc.id.clone());
                Ok((doc.id, transcript))
            })
            .collect()
    }

    /// Transcripts touched within the last two days that are still in
    /// Transcribing or Saving. These are the candidates a recovery job
    /// should re-examine.
    pub async fn find_stalled_transcripts(
        &self,
    ) -> Result<HashMap<String, Transcript>, StoreError> {
        let cutoff = Utc::now() - Duration::days(STALLED_WINDOW_DAYS);
        let mut stalled = self.get_transcripts().await?;
        stalled.retain(|_, transcript| {
            let recent = transcript.last_updated().map_or(false, |at| at >= cutoff);
            recent
                && matches!(
                    transcript.progress(),
                    Progress::Transcribing | Progress::Saving
                )
        });
        Ok(stalled)
    }

    /// Delete a transcript and all of its paragraphs.
    ///
    /// The child collection is unbounded, so it is drained in batches of
    /// `delete_batch_size`, paginated by document id. Each batch is one
    /// atomic delete, and control is yielded back to the scheduler between
    /// batches, bounding stack growth regardless of collection size. The
    /// parent document goes last. Failure aborts with the underlying error;
    /// re-invoking is safe and simply finds fewer remaining documents.
    pub async fn delete_transcript(&self, id: &str) -> Result<(), StoreError> {
        let collection = paragraphs_collection(id);
        loop {
            let batch = self
                .store
                .query_ordered(&collection, OrderKey::DocumentId, Some(self.delete_batch_size))
                .await?;
            if batch.is_empty() {
                break;
            }
            debug!("deleting {} paragraphs of transcript {}", batch.len(), id);
            let ops = batch
                .into_iter()
                .map(|doc| WriteOp::Delete {
                    path: paragraph_path(id, &doc.id),
                })
                .collect();
            self.store.run_batch(ops).await?;
            tokio::task::yield_now().await;
        }
        self.store.delete_document(&transcript_path(id)).await?;
        info!("transcript {} deleted", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Document, MemoryStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn repo_with_store() -> (TranscriptRepository, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (TranscriptRepository::new(store.clone()), store)
    }

    fn paragraph(start_time: f64, text: &str) -> Paragraph {
        Paragraph {
            id: None,
            start_time,
            text: text.to_string(),
            confidence: Some(0.9),
            speaker_tag: None,
        }
    }

    /// Forwards everything to an inner store but fails batches on demand.
    struct FaultyStore {
        inner: MemoryStore,
        fail_batches: AtomicBool,
    }

    #[async_trait]
    impl DocumentStore for FaultyStore {
        async fn get_document(&self, path: &str) -> Result<Option<Value>, StoreError> {
            self.inner.get_document(path).await
        }

        async fn merge_document(&self, path: &str, patch: Value) -> Result<(), StoreError> {
            self.inner.merge_document(path, patch).await
        }

        async fn delete_document(&self, path: &str) -> Result<(), StoreError> {
            self.inner.delete_document(path).await
        }

        async fn query_ordered(
            &self,
            collection: &str,
            order: OrderKey,
            limit: Option<usize>,
        ) -> Result<Vec<Document>, StoreError> {
            self.inner.query_ordered(collection, order, limit).await
        }

        async fn run_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
            if self.fail_batches.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("injected batch failure".to_string()));
            }
            self.inner.run_batch(ops).await
        }
    }

    #[tokio::test]
    async fn merge_isolation_across_field_groups() {
        let (repo, _) = repo_with_store();
        let id = repo.build_new_id();
        repo.update_transcript(&id, json!({"metadata": {"originalMimeType": "audio/mpeg"}}))
            .await
            .unwrap();
        repo.set_duration(&id, 42.0).await.unwrap();

        let transcript = repo.get_transcript(&id).await.unwrap().unwrap();
        let metadata = transcript.metadata.unwrap();
        assert_eq!(metadata.original_mime_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(metadata.audio_duration, Some(42.0));
    }

    #[tokio::test]
    async fn done_removes_percent() {
        let (repo, _) = repo_with_store();
        let id = repo.build_new_id();
        repo.set_percent(&id, 85.0).await.unwrap();
        repo.set_progress(&id, Progress::Done).await.unwrap();

        let transcript = repo.get_transcript(&id).await.unwrap().unwrap();
        let status = transcript.status.unwrap();
        assert_eq!(status.progress, Some(Progress::Done));
        assert_eq!(status.percent, None);
        assert!(status.last_updated.is_some());
    }

    #[tokio::test]
    async fn analysing_and_saving_reset_percent() {
        let (repo, _) = repo_with_store();
        let id = repo.build_new_id();
        repo.set_percent(&id, 60.0).await.unwrap();
        repo.set_progress(&id, Progress::Analysing).await.unwrap();
        let status = repo.get_transcript(&id).await.unwrap().unwrap().status.unwrap();
        assert_eq!(status.percent, Some(0.0));

        repo.set_percent(&id, 30.0).await.unwrap();
        repo.set_progress(&id, Progress::Saving).await.unwrap();
        let status = repo.get_transcript(&id).await.unwrap().unwrap().status.unwrap();
        assert_eq!(status.percent, Some(0.0));
    }

    #[tokio::test]
    async fn progress_transitions_are_unrestricted() {
        // No ordering guard: the transition function is total.
        let (repo, _) = repo_with_store();
        let id = repo.build_new_id();
        repo.set_progress(&id, Progress::Done).await.unwrap();
        repo.set_progress(&id, Progress::Uploading).await.unwrap();
        assert_eq!(repo.get_progress(&id).await.unwrap(), Progress::Uploading);
    }

    #[tokio::test]
    async fn paragraphs_come_back_ordered_by_start_time() {
        let (repo, _) = repo_with_store();
        let id = repo.build_new_id();
        for (start, text) in [(7.5, "third"), (0.0, "first"), (3.2, "second")] {
            repo.add_paragraph(&id, &paragraph(start, text), 50.0)
                .await
                .unwrap();
        }
        let texts: Vec<_> = repo
            .get_paragraphs(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.text)
            .collect();
        assert_eq!(texts, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn add_paragraph_updates_percent_and_assigns_id() {
        let (repo, _) = repo_with_store();
        let id = repo.build_new_id();
        let paragraph_id = repo
            .add_paragraph(&id, &paragraph(1.0, "hello"), 25.0)
            .await
            .unwrap();

        let stored = repo.get_paragraphs(&id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id.as_deref(), Some(paragraph_id.as_str()));

        let status = repo.get_transcript(&id).await.unwrap().unwrap().status.unwrap();
        assert_eq!(status.percent, Some(25.0));
    }

    #[tokio::test]
    async fn failed_paragraph_batch_leaves_no_trace() {
        let store = Arc::new(FaultyStore {
            inner: MemoryStore::new(),
            fail_batches: AtomicBool::new(true),
        });
        let repo = TranscriptRepository::new(store.clone());
        let id = repo.build_new_id();
        repo.set_percent(&id, 10.0).await.unwrap();

        let result = repo.add_paragraph(&id, &paragraph(1.0, "lost"), 90.0).await;
        assert!(result.is_err());

        // neither the paragraph nor the percent update is visible
        assert!(repo.get_paragraphs(&id).await.unwrap().is_empty());
        let status = repo.get_transcript(&id).await.unwrap().unwrap().status.unwrap();
        assert_eq!(status.percent, Some(10.0));
    }

    #[tokio::test]
    async fn deletion_drains_all_batches_and_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let repo = TranscriptRepository::new(store.clone()).with_delete_batch_size(10);
        let id = repo.build_new_id();
        repo.update_transcript(&id, json!({"userId": "u1"})).await.unwrap();
        for i in 0..25 {
            repo.add_paragraph(&id, &paragraph(i as f64, "p"), i as f64)
                .await
                .unwrap();
        }

        repo.delete_transcript(&id).await.unwrap();
        assert!(repo.get_transcript(&id).await.unwrap().is_none());
        assert!(repo.get_paragraphs(&id).await.unwrap().is_empty());
        assert!(store.is_empty());

        // deleting again succeeds without error
        repo.delete_transcript(&id).await.unwrap();
    }

    #[tokio::test]
    async fn get_progress_returns_not_found_sentinel() {
        let (repo, _) = repo_with_store();
        assert_eq!(
            repo.get_progress("nonexistent-id").await.unwrap(),
            Progress::NotFound
        );

        // a document without a status field is also NotFound
        let id = repo.build_new_id();
        repo.update_transcript(&id, json!({"userId": "u1"})).await.unwrap();
        assert_eq!(repo.get_progress(&id).await.unwrap(), Progress::NotFound);
    }

    #[tokio::test]
    async fn owner_identity_is_present_on_reads() {
        let (repo, _) = repo_with_store();
        let id = repo.build_new_id();
        repo.update_transcript(&id, json!({"userId": "user-a"})).await.unwrap();

        let transcript = repo.get_transcript(&id).await.unwrap().unwrap();
        assert_eq!(transcript.user_id.as_deref(), Some("user-a"));
        assert_eq!(transcript.id.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn record_error_lands_under_status() {
        let (repo, _) = repo_with_store();
        let id = repo.build_new_id();
        let error = std::io::Error::new(std::io::ErrorKind::Other, "speech backend unreachable");
        repo.record_error(&id, &error).await.unwrap();

        let status = repo.get_transcript(&id).await.unwrap().unwrap().status.unwrap();
        let recorded = status.error.unwrap();
        assert_eq!(recorded["message"], "speech backend unreachable");
        // the no-value source was stripped, not persisted
        assert!(recorded.get("source").is_none());
    }

    #[tokio::test]
    async fn record_error_is_usable_from_spawned_tasks() {
        // handlers run on a multi-threaded runtime, so the future must be Send
        fn spawnable<F: std::future::Future + Send>(future: F) -> F {
            future
        }

        let (repo, _) = repo_with_store();
        let id = repo.build_new_id();
        let error = std::io::Error::new(std::io::ErrorKind::Other, "poll failed");
        spawnable(repo.record_error(&id, &error)).await.unwrap();

        let status = repo.get_transcript(&id).await.unwrap().unwrap().status.unwrap();
        assert!(status.error.is_some());
    }

    #[tokio::test]
    async fn stalled_finder_filters_by_recency_and_progress() {
        let (repo, _) = repo_with_store();
        let transcribing = repo.build_new_id();
        repo.set_progress(&transcribing, Progress::Transcribing).await.unwrap();

        let done = repo.build_new_id();
        repo.set_progress(&done, Progress::Done).await.unwrap();

        let stale = repo.build_new_id();
        let old = Utc::now() - Duration::days(5);
        repo.update_transcript(
            &stale,
            json!({"status": {"progress": "saving", "lastUpdated": old}}),
        )
        .await
        .unwrap();

        let stalled = repo.find_stalled_transcripts().await.unwrap();
        assert!(stalled.contains_key(&transcribing));
        assert!(!stalled.contains_key(&done));
        assert!(!stalled.contains_key(&stale));
        // defensive id backfill on returned records
        assert_eq!(
            stalled[&transcribing].id.as_deref(),
            Some(transcribing.as_str())
        );
    }
}
