//! Seam between the dispatch stage and the remote fleet.

use async_trait::async_trait;

use crate::api::{ConverterApi, ConverterApiError};
use crate::payload::DispatchRequest;

/// Anything that can accept a batch for conversion and acknowledge it.
#[async_trait]
pub trait WorkerFleet: Send + Sync {
    /// Submit a batch. Returns the acknowledgment handle.
    async fn submit(&self, request: &DispatchRequest) -> Result<String, ConverterApiError>;
}

#[async_trait]
impl WorkerFleet for ConverterApi {
    async fn submit(&self, request: &DispatchRequest) -> Result<String, ConverterApiError> {
        let ack = ConverterApi::submit(self, request).await?;
        tracing::debug!(handle = %ack.handle, documents = request.len(), "Batch acknowledged");
        Ok(ack.handle)
    }
}
