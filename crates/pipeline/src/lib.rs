//! The exam booklet pipeline.
//!
//! Stage 1 (`ingest` job) splits an uploaded exam into student booklets,
//! persists one answer per booklet and enqueues one `dispatch` job per
//! batch. Stage 2 (`dispatch` job) hands each batch to the conversion
//! fleet and records the acknowledgment.
//!
//! [`JobRunner`] drives both stages from the durable `jobs` queue;
//! [`submit_upload`] is the entry point that accepts a new exam PDF.

pub mod backoff;
pub mod builder;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod runner;
pub mod scratch;
pub mod splitter;
pub mod store;
pub mod submit;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::PipelineError;
pub use runner::JobRunner;
pub use submit::{submit_upload, UploadReceipt};
