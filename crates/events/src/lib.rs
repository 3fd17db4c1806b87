//! Pipeline observability events.
//!
//! - [`EventBus`] is an in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PipelineEvent`] is the envelope for job start, success, failure and
//!   retry notifications.
//! - [`EventPersistence`] writes every event to the `job_events` table.

pub mod bus;
pub mod persistence;

pub use bus::{event_types, EventBus, PipelineEvent};
pub use persistence::EventPersistence;
