//! Dispatch batch models: one row per group of booklets sent to the
//! converter fleet.

use examsplit_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `dispatch_batches` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DispatchBatchRecord {
    pub id: DbId,
    pub upload_id: DbId,
    pub batch_index: i32,
    pub status_id: StatusId,
    pub student_count: i32,
    /// Acknowledgment handle returned by the converter dispatcher.
    pub remote_handle: Option<String>,
    pub attempts: i32,
    pub error_message: Option<String>,
    pub dispatched_at: Option<Timestamp>,
    pub acknowledged_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
