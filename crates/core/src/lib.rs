//! Pure domain logic for exam booklet ingestion.
//!
//! Nothing in this crate touches the database, the network or the file
//! system. Everything here is deterministic except prefix generation,
//! which draws from the thread-local CSPRNG.

pub mod env;
pub mod error;
pub mod hashing;
pub mod naming;
pub mod pages;
pub mod partition;
pub mod types;
