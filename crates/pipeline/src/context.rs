use std::sync::Arc;

use examsplit_converter::{CredentialBundle, WorkerFleet};
use examsplit_db::DbPool;
use examsplit_events::{EventBus, PipelineEvent};

use crate::config::PipelineConfig;
use crate::store::DocumentStore;

/// Shared dependencies of every pipeline stage.
#[derive(Clone)]
pub struct PipelineContext {
    pub pool: DbPool,
    pub config: Arc<PipelineConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub fleet: Arc<dyn WorkerFleet>,
    pub events: Arc<EventBus>,
    /// Forwarded verbatim in every dispatch payload.
    pub credentials: CredentialBundle,
    pub instance_type: String,
}

impl PipelineContext {
    pub fn publish(&self, event: PipelineEvent) {
        self.events.publish(event);
    }
}
