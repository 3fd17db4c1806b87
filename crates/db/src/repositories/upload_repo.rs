//! Repository for the `uploads` table.
//!
//! Status transitions follow the ingest lifecycle in
//! [`UploadStatus`]; terminal rows are never moved again.

use examsplit_core::types::DbId;
use sqlx::PgPool;

use crate::models::status::UploadStatus;
use crate::models::upload::{Upload, UploadLayout};

/// Column list for `uploads` queries.
const COLUMNS: &str = "\
    id, exam_id, upload_key, status_id, \
    source_page_count, student_count, dropped_pages, \
    error_message, completed_at, created_at, updated_at";

/// Provides CRUD operations and lifecycle transitions for uploads.
pub struct UploadRepo;

impl UploadRepo {
    /// Record an upload, or return the existing row for the same
    /// `(exam_id, upload_key)`.
    ///
    /// The boolean is `true` when a new row was inserted.
    pub async fn create_or_get(
        pool: &PgPool,
        exam_id: DbId,
        upload_key: &str,
    ) -> Result<(Upload, bool), sqlx::Error> {
        let insert = format!(
            "INSERT INTO uploads (exam_id, upload_key, status_id) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (exam_id, upload_key) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, Upload>(&insert)
            .bind(exam_id)
            .bind(upload_key)
            .bind(UploadStatus::Pending.id())
            .fetch_optional(pool)
            .await?;

        if let Some(upload) = inserted {
            return Ok((upload, true));
        }

        let select = format!(
            "SELECT {COLUMNS} FROM uploads WHERE exam_id = $1 AND upload_key = $2"
        );
        let existing = sqlx::query_as::<_, Upload>(&select)
            .bind(exam_id)
            .bind(upload_key)
            .fetch_one(pool)
            .await?;
        Ok((existing, false))
    }

    /// Find an upload by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Upload>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM uploads WHERE id = $1");
        sqlx::query_as::<_, Upload>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Move a non-terminal upload to `status`.
    ///
    /// Returns `false` when the upload is already done or failed.
    pub async fn set_status(
        pool: &PgPool,
        id: DbId,
        status: UploadStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE uploads SET status_id = $2 \
             WHERE id = $1 AND status_id NOT IN ($3, $4)",
        )
        .bind(id)
        .bind(status.id())
        .bind(UploadStatus::Done.id())
        .bind(UploadStatus::Failed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store how the source document divided into booklets.
    pub async fn record_layout(
        pool: &PgPool,
        id: DbId,
        layout: &UploadLayout,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE uploads \
             SET source_page_count = $2, student_count = $3, dropped_pages = $4 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(layout.source_page_count)
        .bind(layout.student_count)
        .bind(layout.dropped_pages)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark the upload as done.
    pub async fn complete(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE uploads SET status_id = $2, completed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(UploadStatus::Done.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark the upload as failed with a reason.
    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE uploads \
             SET status_id = $2, error_message = $3, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(UploadStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }
}
