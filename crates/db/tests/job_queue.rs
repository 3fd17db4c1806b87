//! Integration tests for the durable job queue.

use sqlx::PgPool;
use examsplit_db::models::job::NewJob;
use examsplit_db::models::status::JobStatus;
use examsplit_db::repositories::{JobEventRepo, JobRepo};

fn new_job(key: &str) -> NewJob {
    NewJob {
        job_type: "dispatch".to_string(),
        idempotency_key: key.to_string(),
        payload: serde_json::json!({ "upload_id": 1, "batch_index": 0 }),
        max_attempts: 3,
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn enqueue_is_idempotent(pool: PgPool) {
    let first = JobRepo::enqueue(&pool, &new_job("k-1")).await.unwrap();
    assert!(first.is_some());

    let second = JobRepo::enqueue(&pool, &new_job("k-1")).await.unwrap();
    assert!(second.is_none());

    let all = JobRepo::list_by_type(&pool, "dispatch").await.unwrap();
    assert_eq!(all.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_next_takes_each_job_once(pool: PgPool) {
    JobRepo::enqueue(&pool, &new_job("k-2")).await.unwrap();

    let claimed = JobRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(claimed.status_id, JobStatus::Running.id());
    assert_eq!(claimed.attempts, 1);
    assert!(claimed.claimed_at.is_some());

    assert!(JobRepo::claim_next(&pool).await.unwrap().is_none());

    JobRepo::complete(&pool, claimed.id).await.unwrap();
    let done = JobRepo::find_by_id(&pool, claimed.id).await.unwrap().unwrap();
    assert_eq!(done.status_id, JobStatus::Completed.id());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn retry_is_not_claimable_before_run_after(pool: PgPool) {
    JobRepo::enqueue(&pool, &new_job("k-3")).await.unwrap();
    let claimed = JobRepo::claim_next(&pool).await.unwrap().unwrap();

    JobRepo::schedule_retry(&pool, claimed.id, 3600.0, "converter unavailable")
        .await
        .unwrap();
    assert!(JobRepo::claim_next(&pool).await.unwrap().is_none());

    JobRepo::schedule_retry(&pool, claimed.id, 0.0, "converter unavailable")
        .await
        .unwrap();
    let again = JobRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(again.id, claimed.id);
    assert_eq!(again.attempts, 2);
    assert!(again.has_attempts_left());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stale_running_jobs_are_released(pool: PgPool) {
    JobRepo::enqueue(&pool, &new_job("k-4")).await.unwrap();
    let claimed = JobRepo::claim_next(&pool).await.unwrap().unwrap();

    sqlx::query("UPDATE jobs SET claimed_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(claimed.id)
        .execute(&pool)
        .await
        .unwrap();

    let released = JobRepo::release_stale(&pool, 600.0).await.unwrap();
    assert_eq!(released, 1);

    let job = JobRepo::find_by_idempotency_key(&pool, "k-4").await.unwrap().unwrap();
    assert_eq!(job.status_id, JobStatus::Pending.id());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn job_events_survive_job_deletion(pool: PgPool) {
    let job = JobRepo::enqueue(&pool, &new_job("k-5")).await.unwrap().unwrap();
    JobEventRepo::insert(
        &pool,
        Some(job.id),
        "dispatch.acknowledged",
        Some(1),
        None,
        &serde_json::json!({ "handle": "h" }),
    )
    .await
    .unwrap();

    assert_eq!(JobEventRepo::list_by_job(&pool, job.id).await.unwrap().len(), 1);

    sqlx::query("DELETE FROM jobs WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();

    let events = JobEventRepo::list_by_upload(&pool, 1).await.unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].job_id.is_none());
}
