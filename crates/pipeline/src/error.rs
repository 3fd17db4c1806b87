use examsplit_converter::ConverterApiError;
use examsplit_core::error::CoreError;

use crate::store::StoreError;

/// Errors raised while running pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] ConverterApiError),

    #[error("Scratch I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// Whether the error concerns the uploaded document as a whole.
    ///
    /// Such errors end Stage 1 for the upload; nothing is worth retrying.
    pub fn is_document_error(&self) -> bool {
        matches!(
            self,
            Self::Core(CoreError::InvalidDocument(_)) | Self::Core(CoreError::Truncated { .. })
        )
    }
}
