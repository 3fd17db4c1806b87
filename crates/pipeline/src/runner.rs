//! Background job runner.
//!
//! Polls the `jobs` table every `poll_interval` and runs each claimed job
//! as its own Tokio task, at most `max_concurrent_jobs` at a time. Uses
//! `SELECT FOR UPDATE SKIP LOCKED` via [`JobRepo::claim_next`], so several
//! runners can share one queue.

use std::sync::Arc;

use examsplit_core::types::DbId;
use examsplit_db::models::job::Job;
use examsplit_db::repositories::JobRepo;
use examsplit_events::{event_types, PipelineEvent};
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::context::PipelineContext;
use crate::dispatch::{self, FailureDisposition};
use crate::error::PipelineError;
use crate::ingest;
use crate::jobs::JobPayload;

pub struct JobRunner {
    ctx: PipelineContext,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl JobRunner {
    pub fn new(ctx: PipelineContext) -> Self {
        let permits = Arc::new(Semaphore::new(ctx.config.max_concurrent_jobs));
        Self {
            ctx,
            permits,
            tracker: TaskTracker::new(),
        }
    }

    /// Run until `cancel` fires, then wait for in-flight jobs to finish.
    ///
    /// Jobs left running by a crashed runner are released first.
    pub async fn run(&self, cancel: CancellationToken) {
        self.recover_stale().await;

        let mut ticker = tokio::time::interval(self.ctx.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            poll_interval_ms = self.ctx.config.poll_interval.as_millis() as u64,
            max_concurrent_jobs = self.ctx.config.max_concurrent_jobs,
            "Job runner started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job runner shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.claim_available().await {
                        tracing::error!(error = %e, "Claim cycle failed");
                    }
                }
            }
        }

        self.drain().await;
        tracing::info!("Job runner stopped");
    }

    /// Stop accepting work and wait for every job already started.
    pub async fn drain(&self) {
        self.tracker.close();
        tracing::info!(in_flight = self.tracker.len(), "Waiting for in-flight jobs");
        self.tracker.wait().await;
    }

    async fn recover_stale(&self) {
        let timeout = self.ctx.config.stale_job_timeout.as_secs_f64();
        match JobRepo::release_stale(&self.ctx.pool, timeout).await {
            Ok(0) => {}
            Ok(released) => tracing::warn!(released, "Released stale running jobs"),
            Err(e) => tracing::error!(error = %e, "Failed to release stale jobs"),
        }
    }

    /// Claim jobs while permits are free. Returns how many were started.
    pub async fn claim_available(&self) -> Result<usize, sqlx::Error> {
        let mut started = 0;
        loop {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                break;
            };
            let Some(job) = JobRepo::claim_next(&self.ctx.pool).await? else {
                break;
            };

            tracing::info!(job_id = job.id, job_type = %job.job_type, attempt = job.attempts, "Job claimed");
            started += 1;

            let ctx = self.ctx.clone();
            self.tracker.spawn(async move {
                execute(&ctx, job).await;
                drop(permit);
            });
        }
        Ok(started)
    }
}

/// Run one claimed job to completion and settle it in the queue.
pub async fn execute(ctx: &PipelineContext, job: Job) {
    let job_id = job.id;

    let payload = match JobPayload::from_job(&job) {
        Ok(payload) => payload,
        Err(e) => {
            settle_failed(ctx, &job, None, &e).await;
            return;
        }
    };

    let upload_id = match &payload {
        JobPayload::Ingest(p) => p.upload_id,
        JobPayload::Dispatch(p) => p.upload_id,
    };
    ctx.publish(
        PipelineEvent::new(event_types::JOB_STARTED)
            .for_job(job_id)
            .for_upload(upload_id)
            .with_payload(serde_json::json!({
                "job_type": payload.kind().as_str(),
                "attempt": job.attempts,
            })),
    );

    let result = match &payload {
        JobPayload::Ingest(p) => ingest::run_ingest(ctx, job_id, p)
            .await
            .and_then(|summary| Ok(serde_json::to_value(summary)?)),
        JobPayload::Dispatch(p) => dispatch::run_dispatch(ctx, job_id, p)
            .await
            .and_then(|outcome| Ok(serde_json::to_value(outcome)?)),
    };

    match result {
        Ok(summary) => {
            if let Err(e) = JobRepo::complete(&ctx.pool, job_id).await {
                tracing::error!(job_id, error = %e, "Failed to mark job completed");
                return;
            }
            tracing::info!(job_id, job_type = %job.job_type, "Job completed");
            ctx.publish(
                PipelineEvent::new(event_types::JOB_COMPLETED)
                    .for_job(job_id)
                    .for_upload(upload_id)
                    .with_payload(summary),
            );
        }
        Err(e) => match &payload {
            JobPayload::Dispatch(p) => match dispatch::record_failure(ctx, &job, p, &e).await {
                Ok(FailureDisposition::Retrying { delay }) => ctx.publish(
                    PipelineEvent::new(event_types::JOB_RETRYING)
                        .for_job(job_id)
                        .for_upload(upload_id)
                        .for_batch(p.batch_id)
                        .with_payload(serde_json::json!({
                            "error": e.to_string(),
                            "attempt": job.attempts,
                            "retry_in_secs": delay.as_secs(),
                        })),
                ),
                Ok(FailureDisposition::Failed) => {
                    publish_failed(ctx, &job, Some(upload_id), &e);
                }
                Err(db) => {
                    tracing::error!(job_id, error = %db, "Failed to record dispatch failure");
                }
            },
            JobPayload::Ingest(_) => settle_failed(ctx, &job, Some(upload_id), &e).await,
        },
    }
}

async fn settle_failed(
    ctx: &PipelineContext,
    job: &Job,
    upload_id: Option<DbId>,
    error: &PipelineError,
) {
    tracing::error!(job_id = job.id, job_type = %job.job_type, error = %error, "Job failed");
    if let Err(e) = JobRepo::fail(&ctx.pool, job.id, &error.to_string()).await {
        tracing::error!(job_id = job.id, error = %e, "Failed to mark job failed");
    }
    publish_failed(ctx, job, upload_id, error);
}

fn publish_failed(ctx: &PipelineContext, job: &Job, upload_id: Option<DbId>, error: &PipelineError) {
    let mut event = PipelineEvent::new(event_types::JOB_FAILED)
        .for_job(job.id)
        .with_payload(serde_json::json!({
            "job_type": job.job_type,
            "attempt": job.attempts,
            "error": error.to_string(),
            "document_error": error.is_document_error(),
        }));
    if let Some(upload_id) = upload_id {
        event = event.for_upload(upload_id);
    }
    ctx.publish(event);
}
