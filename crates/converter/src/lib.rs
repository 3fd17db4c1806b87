//! Client for the remote image-conversion fleet.
//!
//! The fleet turns booklet PDFs into page images. This crate only submits
//! work and returns the dispatcher's acknowledgment handle; conversion
//! completes out of band.

pub mod api;
pub mod config;
pub mod fleet;
pub mod payload;

pub use api::{ConverterApi, ConverterApiError, SubmitResponse};
pub use config::ConverterConfig;
pub use fleet::WorkerFleet;
pub use payload::{CredentialBundle, DispatchRequest};
