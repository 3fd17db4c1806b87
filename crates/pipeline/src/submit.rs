//! Accepting a new exam upload.
//!
//! The submitter does the minimum and returns: it records the upload,
//! parks the source PDF in scratch storage and enqueues the ingest job.
//! Splitting and everything after it happen in the job runner.

use examsplit_core::error::CoreError;
use examsplit_core::hashing::ingest_job_key;
use examsplit_core::types::DbId;
use examsplit_db::models::job::Job;
use examsplit_db::models::status::UploadStatus;
use examsplit_db::repositories::{ExamRepo, JobRepo, UploadRepo};
use examsplit_db::DbPool;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::jobs::{enqueue_ingest, IngestPayload};
use crate::scratch::ScratchDir;

const MAX_UPLOAD_KEY_LENGTH: usize = 64;

/// Acknowledgment returned to the uploader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub upload_id: DbId,
    pub upload_key: String,
    /// Ingest job id, when one is queued for the upload.
    pub job_id: Option<DbId>,
    /// The same `(exam, upload_key)` had been submitted before.
    pub duplicate: bool,
}

/// Upload keys name scratch directories, so they are restricted to
/// ASCII letters, digits, `-` and `_`.
pub fn validate_upload_key(key: &str) -> Result<(), CoreError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_UPLOAD_KEY_LENGTH
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if !valid {
        return Err(CoreError::Validation(format!(
            "Upload key {key:?} must be 1-{MAX_UPLOAD_KEY_LENGTH} characters of [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}

/// Accept an exam PDF for processing.
///
/// Idempotent over `(exam_id, upload_key)`: submitting the same pair again
/// returns the original upload with `duplicate` set and queues nothing.
pub async fn submit_upload(
    pool: &DbPool,
    config: &PipelineConfig,
    exam_id: DbId,
    upload_key: &str,
    source: Vec<u8>,
) -> Result<UploadReceipt, PipelineError> {
    validate_upload_key(upload_key)?;
    if source.is_empty() {
        return Err(CoreError::InvalidDocument("uploaded file is empty".into()).into());
    }

    ExamRepo::find_by_id(pool, exam_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "exam",
            id: exam_id,
        })?;

    let (upload, inserted) = UploadRepo::create_or_get(pool, exam_id, upload_key).await?;
    let job_key = ingest_job_key(exam_id, upload_key);

    if !inserted {
        let existing = JobRepo::find_by_idempotency_key(pool, &job_key).await?;
        let settled = UploadStatus::from_id(upload.status_id).is_some_and(UploadStatus::is_terminal);
        if existing.is_some() || settled {
            tracing::info!(exam_id, upload_id = upload.id, upload_key, "Duplicate upload ignored");
            return Ok(UploadReceipt {
                upload_id: upload.id,
                upload_key: upload_key.to_string(),
                job_id: existing.map(|job| job.id),
                duplicate: true,
            });
        }
        // Recorded by an earlier submit that never got to enqueue.
    }

    let scratch = ScratchDir::create(&config.scratch_root, upload_key).await?;
    let payload = IngestPayload {
        upload_id: upload.id,
        exam_id,
        scratch_dir: scratch.path().to_path_buf(),
    };

    let enqueued = park_and_enqueue(pool, &scratch, upload_key, &payload, source).await;

    match enqueued {
        Ok(Some(job)) => {
            tracing::info!(exam_id, upload_id = upload.id, job_id = job.id, upload_key, "Upload accepted");
            Ok(UploadReceipt {
                upload_id: upload.id,
                upload_key: upload_key.to_string(),
                job_id: Some(job.id),
                duplicate: !inserted,
            })
        }
        Ok(None) => {
            // A concurrent submit of the same upload won the race.
            release_quietly(scratch).await;
            let job = JobRepo::find_by_idempotency_key(pool, &job_key).await?;
            Ok(UploadReceipt {
                upload_id: upload.id,
                upload_key: upload_key.to_string(),
                job_id: job.map(|job| job.id),
                duplicate: true,
            })
        }
        Err(e) => {
            release_quietly(scratch).await;
            Err(e)
        }
    }
}

async fn park_and_enqueue(
    pool: &DbPool,
    scratch: &ScratchDir,
    upload_key: &str,
    payload: &IngestPayload,
    source: Vec<u8>,
) -> Result<Option<Job>, PipelineError> {
    tokio::fs::write(scratch.source_path(), source).await?;
    enqueue_ingest(pool, upload_key, payload).await
}

async fn release_quietly(scratch: ScratchDir) {
    let path = scratch.path().to_path_buf();
    if let Err(e) = scratch.release().await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to release scratch directory");
    }
}
