//! Repository for the `dispatch_batches` table.

use examsplit_core::types::DbId;
use sqlx::PgPool;

use crate::models::dispatch_batch::DispatchBatchRecord;
use crate::models::status::DispatchStatus;

/// Column list for `dispatch_batches` queries.
const COLUMNS: &str = "\
    id, upload_id, batch_index, status_id, student_count, remote_handle, \
    attempts, error_message, dispatched_at, acknowledged_at, created_at, updated_at";

/// Provides lifecycle operations for dispatch batches.
pub struct DispatchBatchRepo;

impl DispatchBatchRepo {
    /// Record a batch, or return the existing row for
    /// `(upload_id, batch_index)`.
    pub async fn create_or_get(
        pool: &PgPool,
        upload_id: DbId,
        batch_index: i32,
        student_count: i32,
    ) -> Result<DispatchBatchRecord, sqlx::Error> {
        let insert = format!(
            "INSERT INTO dispatch_batches (upload_id, batch_index, status_id, student_count) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (upload_id, batch_index) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, DispatchBatchRecord>(&insert)
            .bind(upload_id)
            .bind(batch_index)
            .bind(DispatchStatus::Pending.id())
            .bind(student_count)
            .fetch_optional(pool)
            .await?;

        match inserted {
            Some(batch) => Ok(batch),
            None => {
                let select = format!(
                    "SELECT {COLUMNS} FROM dispatch_batches \
                     WHERE upload_id = $1 AND batch_index = $2"
                );
                sqlx::query_as::<_, DispatchBatchRecord>(&select)
                    .bind(upload_id)
                    .bind(batch_index)
                    .fetch_one(pool)
                    .await
            }
        }
    }

    /// Find a batch by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<DispatchBatchRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM dispatch_batches WHERE id = $1");
        sqlx::query_as::<_, DispatchBatchRecord>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List the batches of an upload in batch order.
    pub async fn list_by_upload(
        pool: &PgPool,
        upload_id: DbId,
    ) -> Result<Vec<DispatchBatchRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM dispatch_batches WHERE upload_id = $1 ORDER BY batch_index"
        );
        sqlx::query_as::<_, DispatchBatchRecord>(&query)
            .bind(upload_id)
            .fetch_all(pool)
            .await
    }

    /// Raise the member count of a batch and put it back to pending.
    ///
    /// Only grows: returns `false` when the batch already counts
    /// `student_count` members or more.
    pub async fn grow(pool: &PgPool, id: DbId, student_count: i32) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE dispatch_batches \
             SET student_count = $2, status_id = $3, error_message = NULL, \
                 remote_handle = NULL, acknowledged_at = NULL \
             WHERE id = $1 AND student_count < $2",
        )
        .bind(id)
        .bind(student_count)
        .bind(DispatchStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record that a submission attempt is in flight.
    ///
    /// Pending batches move, and so do batches left `Dispatched` by a
    /// crashed attempt: the converter writes to deterministic locators, so
    /// submitting the same batch twice produces the same images. An
    /// acknowledged or failed batch never moves. Returns `false` then.
    pub async fn mark_dispatched(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE dispatch_batches \
             SET status_id = $2, attempts = attempts + 1, dispatched_at = NOW() \
             WHERE id = $1 AND status_id IN ($3, $2)",
        )
        .bind(id)
        .bind(DispatchStatus::Dispatched.id())
        .bind(DispatchStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the converter's acknowledgment.
    pub async fn mark_acknowledged(
        pool: &PgPool,
        id: DbId,
        remote_handle: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE dispatch_batches \
             SET status_id = $2, remote_handle = $3, acknowledged_at = NOW(), error_message = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(DispatchStatus::Acknowledged.id())
        .bind(remote_handle)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Return a batch to pending after a failed attempt that will be retried.
    pub async fn mark_retryable(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE dispatch_batches SET status_id = $2, error_message = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(DispatchStatus::Pending.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a batch as permanently failed.
    pub async fn mark_failed(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE dispatch_batches SET status_id = $2, error_message = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(DispatchStatus::DispatchFailed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }
}
