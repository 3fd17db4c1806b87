//! Repository for the `job_events` table.

use examsplit_core::types::DbId;
use sqlx::PgPool;

use crate::models::job_event::JobEvent;

/// Column list for `job_events` queries.
const COLUMNS: &str =
    "id, job_id, event_type, upload_id, batch_id, payload, created_at, updated_at";

/// Provides append and read access to job events.
pub struct JobEventRepo;

impl JobEventRepo {
    /// Append one event. Returns the new row ID.
    pub async fn insert(
        pool: &PgPool,
        job_id: Option<DbId>,
        event_type: &str,
        upload_id: Option<DbId>,
        batch_id: Option<DbId>,
        payload: &serde_json::Value,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "INSERT INTO job_events (job_id, event_type, upload_id, batch_id, payload) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(job_id)
        .bind(event_type)
        .bind(upload_id)
        .bind(batch_id)
        .bind(payload)
        .fetch_one(pool)
        .await
    }

    /// List the events of one upload in the order they were recorded.
    pub async fn list_by_upload(
        pool: &PgPool,
        upload_id: DbId,
    ) -> Result<Vec<JobEvent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_events WHERE upload_id = $1 ORDER BY id");
        sqlx::query_as::<_, JobEvent>(&query)
            .bind(upload_id)
            .fetch_all(pool)
            .await
    }

    /// List the events of one job in the order they were recorded.
    pub async fn list_by_job(pool: &PgPool, job_id: DbId) -> Result<Vec<JobEvent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_events WHERE job_id = $1 ORDER BY id");
        sqlx::query_as::<_, JobEvent>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }
}
