//! Concurrency and shutdown behaviour of the background job runner.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, sample_pdf, seed_exam, Harness};
use examsplit_db::models::status::{DispatchStatus, JobStatus};
use examsplit_db::repositories::{DispatchBatchRepo, JobRepo};
use examsplit_pipeline::{submit_upload, JobRunner};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Submit `pages` pages and run the ingest, leaving its dispatch jobs queued.
async fn ingested(h: &Harness, pool: &PgPool, pages: u32) -> i64 {
    let exam_id = seed_exam(pool, 2).await;
    let receipt = submit_upload(pool, &h.ctx.config, exam_id, "scan-runner", sample_pdf(pages))
        .await
        .unwrap();
    let ingest = h.run_next().await.unwrap();
    assert_eq!(ingest.job_type, "ingest");
    receipt.upload_id
}

async fn dispatch_jobs_in(pool: &PgPool, status: JobStatus) -> usize {
    JobRepo::list_by_type(pool, "dispatch")
        .await
        .unwrap()
        .iter()
        .filter(|j| j.status_id == status.id())
        .count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn batches_are_submitted_concurrently(pool: PgPool) {
    let h = Harness::new(pool.clone(), &[("BATCH_SIZE", "1")]);
    let upload_id = ingested(&h, &pool, 12).await;
    // Each submission waits for the other two.
    h.fleet.require_concurrency(3);

    let runner = JobRunner::new(h.ctx.clone());
    assert_eq!(runner.claim_available().await.unwrap(), 3);
    tokio::time::timeout(Duration::from_secs(5), runner.drain())
        .await
        .expect("batches were submitted one at a time");

    assert_eq!(h.fleet.peak(), 3);
    let batches = DispatchBatchRepo::list_by_upload(&pool, upload_id).await.unwrap();
    assert_eq!(batches.len(), 3);
    assert!(batches
        .iter()
        .all(|b| b.status_id == DispatchStatus::Acknowledged.id()));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claims_stop_at_the_concurrency_limit(pool: PgPool) {
    let h = Harness::new(pool.clone(), &[("BATCH_SIZE", "1"), ("MAX_CONCURRENT_JOBS", "2")]);
    let upload_id = ingested(&h, &pool, 12).await;
    let gate = h.fleet.hold();

    let runner = JobRunner::new(h.ctx.clone());
    assert_eq!(runner.claim_available().await.unwrap(), 2);
    let fleet = h.fleet.clone();
    eventually("two submissions in flight", move || {
        let fleet = fleet.clone();
        async move { fleet.in_flight() == 2 }
    })
    .await;

    // No permit left: the third batch stays queued.
    assert_eq!(runner.claim_available().await.unwrap(), 0);
    assert_eq!(dispatch_jobs_in(&pool, JobStatus::Pending).await, 1);

    gate.add_permits(2);
    runner.drain().await;
    assert_eq!(dispatch_jobs_in(&pool, JobStatus::Completed).await, 2);

    gate.add_permits(1);
    assert_eq!(runner.claim_available().await.unwrap(), 1);
    runner.drain().await;

    assert_eq!(h.fleet.peak(), 2);
    assert_eq!(dispatch_jobs_in(&pool, JobStatus::Completed).await, 3);
    let batches = DispatchBatchRepo::list_by_upload(&pool, upload_id).await.unwrap();
    assert!(batches
        .iter()
        .all(|b| b.status_id == DispatchStatus::Acknowledged.id()));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cancellation_waits_for_in_flight_jobs(pool: PgPool) {
    let h = Harness::new(pool.clone(), &[("JOB_POLL_INTERVAL_MS", "10")]);
    let upload_id = ingested(&h, &pool, 8).await;
    let gate = h.fleet.hold();

    let runner = Arc::new(JobRunner::new(h.ctx.clone()));
    let cancel = CancellationToken::new();
    let running = {
        let runner = runner.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { runner.run(cancel).await })
    };

    let fleet = h.fleet.clone();
    eventually("the dispatch to start", move || {
        let fleet = fleet.clone();
        async move { fleet.in_flight() == 1 }
    })
    .await;

    cancel.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!running.is_finished(), "runner stopped with a job in flight");

    gate.add_permits(1);
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("runner did not stop")
        .unwrap();

    let batches = DispatchBatchRepo::list_by_upload(&pool, upload_id).await.unwrap();
    assert_eq!(batches[0].status_id, DispatchStatus::Acknowledged.id());
    assert_eq!(dispatch_jobs_in(&pool, JobStatus::Completed).await, 1);
}
