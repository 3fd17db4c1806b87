use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// The uploaded exam could not be parsed, or holds no complete booklet.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Trailing pages short of a full booklet under the `reject` policy.
    #[error("{dropped} trailing page(s) do not form a complete booklet of {pages_per_student} pages")]
    Truncated { dropped: u32, pages_per_student: u32 },

    #[error("Internal error: {0}")]
    Internal(String),
}
