//! Repository for the `jobs` table.
//!
//! Uses the `JobStatus` enum from `models::status` for all status
//! transitions. Every job carries a unique idempotency key, so enqueueing
//! the same logical job twice is a no-op.

use examsplit_core::types::DbId;
use sqlx::PgPool;

use crate::models::job::{Job, NewJob};
use crate::models::status::JobStatus;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, job_type, status_id, idempotency_key, payload, \
    attempts, max_attempts, run_after, error_message, \
    claimed_at, started_at, completed_at, created_at, updated_at";

/// Provides queue operations for background jobs.
pub struct JobRepo;

impl JobRepo {
    /// Enqueue a job unless one with the same idempotency key exists.
    ///
    /// Returns `None` when the key was already taken.
    pub async fn enqueue(pool: &PgPool, input: &NewJob) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (job_type, status_id, idempotency_key, payload, max_attempts) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (idempotency_key) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(&input.job_type)
            .bind(JobStatus::Pending.id())
            .bind(&input.idempotency_key)
            .bind(&input.payload)
            .bind(input.max_attempts)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim the next runnable job.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` to prevent double-claiming
    /// when several runners poll the same queue. Claiming counts as an
    /// attempt.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $1, claimed_at = NOW(), started_at = NOW(), \
                 attempts = attempts + 1 \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status_id IN ($2, $3) AND run_after <= NOW() \
                 ORDER BY run_after ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Running.id())
            .bind(JobStatus::Pending.id())
            .bind(JobStatus::Retrying.id())
            .fetch_optional(pool)
            .await
    }

    /// Mark a job as completed.
    pub async fn complete(pool: &PgPool, job_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs SET status_id = $2, completed_at = NOW(), error_message = NULL \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(JobStatus::Completed.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a job as permanently failed.
    pub async fn fail(pool: &PgPool, job_id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs SET status_id = $2, error_message = $3, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(JobStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Put a failed attempt back on the queue after `delay_secs`.
    pub async fn schedule_retry(
        pool: &PgPool,
        job_id: DbId,
        delay_secs: f64,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs \
             SET status_id = $2, error_message = $3, \
                 run_after = NOW() + make_interval(secs => $4), \
                 claimed_at = NULL, started_at = NULL \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(JobStatus::Retrying.id())
        .bind(error)
        .bind(delay_secs)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Release jobs left running by a runner that died.
    ///
    /// Any job claimed more than `timeout_secs` ago and still running goes
    /// back to pending. Returns the number of jobs released.
    pub async fn release_stale(pool: &PgPool, timeout_secs: f64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $1, claimed_at = NULL, started_at = NULL \
             WHERE status_id = $2 \
               AND claimed_at < NOW() - make_interval(secs => $3)",
        )
        .bind(JobStatus::Pending.id())
        .bind(JobStatus::Running.id())
        .bind(timeout_secs)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a job by its idempotency key.
    pub async fn find_by_idempotency_key(
        pool: &PgPool,
        key: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE idempotency_key = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// List jobs of one type in creation order.
    pub async fn list_by_type(pool: &PgPool, job_type: &str) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE job_type = $1 ORDER BY id");
        sqlx::query_as::<_, Job>(&query)
            .bind(job_type)
            .fetch_all(pool)
            .await
    }
}
