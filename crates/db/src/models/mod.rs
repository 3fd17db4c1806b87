//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A create DTO for inserts

pub mod answer;
pub mod dispatch_batch;
pub mod exam;
pub mod job;
pub mod job_event;
pub mod status;
pub mod upload;
