//! Upload models: one row per accepted exam PDF.

use examsplit_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `uploads` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Upload {
    pub id: DbId,
    pub exam_id: DbId,
    pub upload_key: String,
    pub status_id: StatusId,
    pub source_page_count: Option<i32>,
    pub student_count: Option<i32>,
    pub dropped_pages: Option<i32>,
    pub error_message: Option<String>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Split results recorded once the source document has been divided.
#[derive(Debug, Clone, Copy)]
pub struct UploadLayout {
    pub source_page_count: i32,
    pub student_count: i32,
    pub dropped_pages: i32,
}
