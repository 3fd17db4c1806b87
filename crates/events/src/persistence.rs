//! Durable event persistence service.
//!
//! [`EventPersistence`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and writes every received [`PipelineEvent`] to `job_events`. It exits when
//! the bus is dropped.

use examsplit_core::types::DbId;
use examsplit_db::repositories::JobEventRepo;
use examsplit_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::PipelineEvent;

/// Background service that persists pipeline events.
pub struct EventPersistence;

impl EventPersistence {
    /// Run the persistence loop until the channel closes.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<PipelineEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = Self::persist(&pool, &event).await {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            job_id = ?event.job_id,
                            "Failed to persist job event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event persistence lagged, events were lost");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }

    /// Write a single event.
    pub async fn persist(pool: &DbPool, event: &PipelineEvent) -> Result<DbId, sqlx::Error> {
        JobEventRepo::insert(
            pool,
            event.job_id,
            &event.event_type,
            event.upload_id,
            event.batch_id,
            &event.payload,
        )
        .await
    }
}
