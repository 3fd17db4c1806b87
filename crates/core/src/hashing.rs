//! SHA-256 digests used for job idempotency keys.

use sha2::{Digest, Sha256};

use crate::types::DbId;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Idempotency key for the ingest job of one upload.
///
/// Re-delivering the same `(exam, upload)` pair always yields the same key,
/// so the queue refuses to enqueue it twice.
pub fn ingest_job_key(exam_id: DbId, upload_key: &str) -> String {
    sha256_hex(format!("ingest:{exam_id}:{upload_key}").as_bytes())
}

/// Idempotency key for the dispatch job of one batch with the given members.
///
/// The member list is part of the key: re-enqueueing an unchanged batch is
/// a no-op, while a batch that gained answers gets a fresh job.
pub fn dispatch_job_key(upload_id: DbId, batch_index: u32, answer_ids: &[DbId]) -> String {
    let members = answer_ids
        .iter()
        .map(DbId::to_string)
        .collect::<Vec<_>>()
        .join(",");
    sha256_hex(format!("dispatch:{upload_id}:{batch_index}:{members}").as_bytes())
}
