// src/poller.rs
//! Speech operation polling and reconciliation
//!
//! The speech service is asynchronous, so progress only moves when something
//! polls the stored operation reference and writes the outcome back. This
//! module drives that reconciliation for a single transcript (the refresh
//! endpoint) and sweeps transcripts that look stalled (the recovery job).

use anyhow::{anyhow, Result};
use log::{error, info, warn};
use std::sync::Arc;

use crate::repository::{Paragraph, Progress, TranscriptRepository};
use crate::speech::{PollOutcome, SpeechClient};

#[derive(Debug, Default)]
struct RecoveryStats {
    examined: usize,
    reconciled: usize,
    errors: usize,
}

/// Poll the speech operation of one transcript and persist the outcome.
///
/// In-progress polls update `status.percent` only. A terminal result moves
/// the transcript to Analysing, accumulates paragraphs with a rising percent
/// (each insert is atomic with its percent update, so partial results are
/// consistently visible while work continues), then Saving and Done. A
/// service failure is recorded on the transcript, not silently dropped.
pub async fn reconcile_transcript(
    repo: &TranscriptRepository,
    speech: &dyn SpeechClient,
    id: &str,
) -> Result<Progress> {
    let transcript = repo
        .get_transcript(id)
        .await?
        .ok_or_else(|| anyhow!("transcript {} does not exist", id))?;

    let reference = transcript
        .speech_data
        .as_ref()
        .and_then(|data| data.reference.clone())
        .ok_or_else(|| anyhow!("transcript {} has no speech operation reference", id))?;

    match speech.poll(&reference).await {
        Ok(PollOutcome::InProgress { percent }) => {
            repo.set_percent(id, percent).await?;
            Ok(Progress::Transcribing)
        }
        Ok(PollOutcome::Complete { segments }) => {
            repo.set_progress(id, Progress::Analysing).await?;
            let total = segments.len().max(1) as f64;
            for (index, segment) in segments.into_iter().enumerate() {
                let paragraph = Paragraph {
                    id: None,
                    start_time: segment.start_time,
                    text: segment.text,
                    confidence: segment.confidence,
                    speaker_tag: segment.speaker_tag,
                };
                let percent = ((index + 1) as f64 / total) * 100.0;
                repo.add_paragraph(id, &paragraph, percent).await?;
            }
            repo.set_progress(id, Progress::Saving).await?;
            repo.set_progress(id, Progress::Done).await?;
            info!("transcript {} reconciled to completion", id);
            Ok(Progress::Done)
        }
        Err(err) => {
            repo.record_error(id, &err).await?;
            repo.set_progress(id, Progress::Error).await?;
            Err(err.into())
        }
    }
}

/// Sweep transcripts updated recently but still mid-flight and re-drive each
/// one from its operation reference. Individual failures are counted and
/// logged; the sweep itself keeps going.
pub async fn recover_stalled(
    repo: Arc<TranscriptRepository>,
    speech: Arc<dyn SpeechClient>,
) -> Result<()> {
    let stalled = repo.find_stalled_transcripts().await?;
    let mut stats = RecoveryStats {
        examined: stalled.len(),
        ..Default::default()
    };
    info!("recovery sweep examining {} transcripts", stats.examined);

    for id in stalled.keys() {
        match reconcile_transcript(&repo, speech.as_ref(), id).await {
            Ok(progress) => {
                stats.reconciled += 1;
                info!("recovered transcript {} -> {:?}", id, progress);
            }
            Err(err) => {
                stats.errors += 1;
                warn!("recovery of transcript {} failed: {}", id, err);
            }
        }
    }

    if stats.errors > 0 {
        error!(
            "recovery sweep finished: {} reconciled, {} failed",
            stats.reconciled, stats.errors
        );
    } else {
        info!("recovery sweep finished: {} reconciled", stats.reconciled);
    }
    Ok(())
}
