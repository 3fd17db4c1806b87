//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` between the job runner and the
//! stages it executes.

use chrono::{DateTime, Utc};
use examsplit_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event names emitted by the pipeline.
pub mod event_types {
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_FAILED: &str = "job.failed";
    pub const JOB_RETRYING: &str = "job.retrying";
    pub const UPLOAD_TRUNCATED: &str = "upload.truncated";
    pub const ANSWER_BUILD_FAILED: &str = "answer.build_failed";
    pub const BATCH_ACKNOWLEDGED: &str = "batch.acknowledged";
    pub const BATCH_FAILED: &str = "batch.failed";
}

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// Something that happened while processing a job.
///
/// Constructed via [`PipelineEvent::new`] and enriched with
/// [`for_job`](PipelineEvent::for_job), [`for_upload`](PipelineEvent::for_upload),
/// [`for_batch`](PipelineEvent::for_batch) and
/// [`with_payload`](PipelineEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Dot-separated event name, e.g. `"job.failed"`.
    pub event_type: String,
    pub job_id: Option<DbId>,
    pub upload_id: Option<DbId>,
    /// Database id of the dispatch batch, when the event concerns one.
    pub batch_id: Option<DbId>,
    /// Event-specific data such as a failure reason.
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            job_id: None,
            upload_id: None,
            batch_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn for_job(mut self, job_id: DbId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn for_upload(mut self, upload_id: DbId) -> Self {
        self.upload_id = Some(upload_id);
        self
    }

    pub fn for_batch(mut self, batch_id: DbId) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use examsplit_events::bus::{event_types, EventBus, PipelineEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(PipelineEvent::new(event_types::JOB_STARTED).for_job(1));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// Slow receivers observe `RecvError::Lagged` once the buffer is full.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Dropped silently when nobody is subscribed.
    pub fn publish(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
