//! Typed job payloads over the durable `jobs` queue.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use examsplit_core::error::CoreError;
use examsplit_core::hashing::{dispatch_job_key, ingest_job_key};
use examsplit_core::types::DbId;
use examsplit_db::models::job::{Job, NewJob};
use examsplit_db::repositories::JobRepo;
use examsplit_db::DbPool;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// The two kinds of work the runner executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Stage 1: split, build and partition one upload.
    Ingest,
    /// Stage 2: hand one batch to the conversion fleet.
    Dispatch,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Dispatch => "dispatch",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingest" => Ok(Self::Ingest),
            "dispatch" => Ok(Self::Dispatch),
            other => Err(CoreError::Validation(format!("Unknown job type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestPayload {
    pub upload_id: DbId,
    pub exam_id: DbId,
    /// Scratch directory created by the submitter. Holds `source.pdf`.
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPayload {
    pub upload_id: DbId,
    /// Row id in `dispatch_batches`.
    pub batch_id: DbId,
    pub batch_index: u32,
    /// Answers in the batch, in booklet order.
    pub answer_ids: Vec<DbId>,
}

/// A claimed job with its payload decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPayload {
    Ingest(IngestPayload),
    Dispatch(DispatchPayload),
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Ingest(_) => JobKind::Ingest,
            Self::Dispatch(_) => JobKind::Dispatch,
        }
    }

    /// Decode the payload of a queued job according to its type.
    pub fn from_job(job: &Job) -> Result<Self, PipelineError> {
        let payload = job.payload.clone();
        Ok(match job.job_type.parse::<JobKind>()? {
            JobKind::Ingest => Self::Ingest(serde_json::from_value(payload)?),
            JobKind::Dispatch => Self::Dispatch(serde_json::from_value(payload)?),
        })
    }
}

/// Enqueue the Stage-1 job of an upload.
///
/// Returns `None` when the job for `(exam_id, upload_key)` already exists.
/// Ingest jobs get a single attempt; re-running one is an operator decision.
pub async fn enqueue_ingest(
    pool: &DbPool,
    upload_key: &str,
    payload: &IngestPayload,
) -> Result<Option<Job>, PipelineError> {
    let job = NewJob {
        job_type: JobKind::Ingest.as_str().to_string(),
        idempotency_key: ingest_job_key(payload.exam_id, upload_key),
        payload: serde_json::to_value(payload)?,
        max_attempts: 1,
    };
    Ok(JobRepo::enqueue(pool, &job).await?)
}

/// Enqueue the Stage-2 job of one batch.
///
/// Returns `None` when the batch was already enqueued with the same members.
pub async fn enqueue_dispatch(
    pool: &DbPool,
    payload: &DispatchPayload,
    max_attempts: u32,
) -> Result<Option<Job>, PipelineError> {
    let job = NewJob {
        job_type: JobKind::Dispatch.as_str().to_string(),
        idempotency_key: dispatch_job_key(
            payload.upload_id,
            payload.batch_index,
            &payload.answer_ids,
        ),
        payload: serde_json::to_value(payload)?,
        max_attempts: max_attempts.min(i32::MAX as u32) as i32,
    };
    Ok(JobRepo::enqueue(pool, &job).await?)
}
