//! Stage 2: hand one batch to the conversion fleet.
//!
//! Batch lifecycle: `pending → dispatched → acknowledged`, or
//! `dispatch_failed` once retries are exhausted. Each batch is its own job,
//! so a failing batch never holds up, cancels or retries another.

use std::time::Duration;

use examsplit_converter::DispatchRequest;
use examsplit_core::error::CoreError;
use examsplit_core::types::DbId;
use examsplit_db::models::job::Job;
use examsplit_db::models::status::DispatchStatus;
use examsplit_db::repositories::{AnswerRepo, DispatchBatchRepo, JobRepo};
use examsplit_events::{event_types, PipelineEvent};
use serde::Serialize;

use crate::backoff::delay_after_attempt;
use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::jobs::DispatchPayload;

/// Result of a successful dispatch job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Acknowledged { handle: String },
    /// The batch was acknowledged or failed by an earlier run.
    AlreadySettled,
    /// The batch gained members after this job was queued; a newer job
    /// carries the full list.
    Superseded,
}

/// What became of a failed dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    Retrying { delay: Duration },
    Failed,
}

/// Submit one batch and record the acknowledgment.
pub async fn run_dispatch(
    ctx: &PipelineContext,
    job_id: DbId,
    payload: &DispatchPayload,
) -> Result<DispatchOutcome, PipelineError> {
    let pool = &ctx.pool;

    let batch = DispatchBatchRepo::find_by_id(pool, payload.batch_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "dispatch_batch",
            id: payload.batch_id,
        })?;

    if payload.answer_ids.len() != batch.student_count as usize {
        tracing::info!(
            job_id,
            batch_id = batch.id,
            queued = payload.answer_ids.len(),
            members = batch.student_count,
            "Batch membership changed since this job was queued, skipping",
        );
        return Ok(DispatchOutcome::Superseded);
    }

    if matches!(
        DispatchStatus::from_id(batch.status_id),
        Some(DispatchStatus::Acknowledged | DispatchStatus::DispatchFailed)
    ) {
        tracing::info!(job_id, batch_id = batch.id, "Batch already settled, skipping");
        return Ok(DispatchOutcome::AlreadySettled);
    }

    let mut entries = Vec::with_capacity(payload.answer_ids.len());
    for &answer_id in &payload.answer_ids {
        let answer = AnswerRepo::find_by_id(pool, answer_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "answer",
                id: answer_id,
            })?;
        entries.push((answer.document_path, answer.image_prefix));
    }

    let request = DispatchRequest::new(
        ctx.credentials.clone(),
        entries,
        ctx.config.naming_law.version,
        ctx.instance_type.clone(),
    )?;

    if !DispatchBatchRepo::mark_dispatched(pool, batch.id).await? {
        return Ok(DispatchOutcome::AlreadySettled);
    }

    tracing::info!(
        job_id,
        upload_id = payload.upload_id,
        batch_id = batch.id,
        batch_index = payload.batch_index,
        documents = request.len(),
        "Submitting batch to converter",
    );

    let handle = ctx.fleet.submit(&request).await?;
    DispatchBatchRepo::mark_acknowledged(pool, batch.id, &handle).await?;

    tracing::info!(job_id, batch_id = batch.id, handle = %handle, "Batch acknowledged");
    ctx.publish(
        PipelineEvent::new(event_types::BATCH_ACKNOWLEDGED)
            .for_job(job_id)
            .for_upload(payload.upload_id)
            .for_batch(batch.id)
            .with_payload(serde_json::json!({ "handle": handle })),
    );

    Ok(DispatchOutcome::Acknowledged { handle })
}

/// Whether another attempt at the same batch could succeed.
fn is_retryable(error: &PipelineError) -> bool {
    match error {
        PipelineError::Dispatch(e) => e.is_retryable(),
        PipelineError::Database(_) | PipelineError::Io(_) => true,
        _ => false,
    }
}

/// Record a failed dispatch attempt on the batch and its job.
///
/// Retryable failures with attempts left go back on the queue after an
/// exponential backoff; everything else settles the batch as failed.
pub async fn record_failure(
    ctx: &PipelineContext,
    job: &Job,
    payload: &DispatchPayload,
    error: &PipelineError,
) -> Result<FailureDisposition, sqlx::Error> {
    let pool = &ctx.pool;
    let message = error.to_string();

    if is_retryable(error) && job.has_attempts_left() {
        let attempt = u32::try_from(job.attempts).unwrap_or(1);
        let delay = delay_after_attempt(attempt, &ctx.config.backoff);

        DispatchBatchRepo::mark_retryable(pool, payload.batch_id, &message).await?;
        JobRepo::schedule_retry(pool, job.id, delay.as_secs_f64(), &message).await?;

        tracing::warn!(
            job_id = job.id,
            batch_id = payload.batch_id,
            attempt = job.attempts,
            max_attempts = job.max_attempts,
            retry_in_secs = delay.as_secs(),
            error = %error,
            "Dispatch failed, will retry",
        );
        return Ok(FailureDisposition::Retrying { delay });
    }

    DispatchBatchRepo::mark_failed(pool, payload.batch_id, &message).await?;
    JobRepo::fail(pool, job.id, &message).await?;

    tracing::error!(
        job_id = job.id,
        batch_id = payload.batch_id,
        attempts = job.attempts,
        error = %error,
        "Dispatch failed permanently",
    );
    ctx.publish(
        PipelineEvent::new(event_types::BATCH_FAILED)
            .for_job(job.id)
            .for_upload(payload.upload_id)
            .for_batch(payload.batch_id)
            .with_payload(serde_json::json!({ "error": message, "attempts": job.attempts })),
    );

    Ok(FailureDisposition::Failed)
}

#[cfg(test)]
mod tests {
    use examsplit_converter::ConverterApiError;

    use super::*;

    #[test]
    fn converter_rejections_are_final() {
        let error = PipelineError::Dispatch(ConverterApiError::ApiError {
            status: 400,
            body: "bad payload".into(),
        });
        assert!(!is_retryable(&error));
    }

    #[test]
    fn converter_outages_are_retried() {
        let error = PipelineError::Dispatch(ConverterApiError::ApiError {
            status: 502,
            body: String::new(),
        });
        assert!(is_retryable(&error));
    }

    #[test]
    fn missing_records_are_final() {
        let error = PipelineError::Core(CoreError::NotFound {
            entity: "answer",
            id: 3,
        });
        assert!(!is_retryable(&error));
    }

    #[test]
    fn outcome_serializes_with_a_tag() {
        let json = serde_json::to_value(DispatchOutcome::Acknowledged {
            handle: "h-1".into(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "acknowledged");
        assert_eq!(json["handle"], "h-1");
    }
}
