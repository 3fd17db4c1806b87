//! Batch partitioning of student booklets for dispatch.
//!
//! Batches bound the payload of one dispatch call and the load on one
//! remote worker. Membership carries no other meaning.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::naming;

/// Default number of students per dispatch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// One student in a batch together with its naming prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry<T> {
    pub student: T,
    pub prefix: String,
}

/// A bounded group of students dispatched together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchBatch<T> {
    /// Zero-based position of the batch within the upload.
    pub index: u32,
    pub entries: Vec<BatchEntry<T>>,
}

impl<T> DispatchBatch<T> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Number of batches needed for `students` at `batch_size` per batch.
pub fn batch_count(students: usize, batch_size: usize) -> usize {
    students.div_ceil(batch_size)
}

/// Validate the configured batch size.
pub fn validate_batch_size(batch_size: usize) -> Result<(), CoreError> {
    if batch_size == 0 {
        return Err(CoreError::Validation(
            "Batch size must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Group `students` into order-preserving batches of at most `batch_size`,
/// drawing one prefix per student from `next_prefix`.
///
/// Prefixes are unique across the whole partition: a repeated draw is
/// discarded and redrawn.
pub fn partition_with<T, F>(
    students: Vec<T>,
    batch_size: usize,
    mut next_prefix: F,
) -> Result<Vec<DispatchBatch<T>>, CoreError>
where
    F: FnMut() -> String,
{
    validate_batch_size(batch_size)?;

    let mut seen = HashSet::with_capacity(students.len());
    let mut batches: Vec<DispatchBatch<T>> = Vec::with_capacity(batch_count(students.len(), batch_size));

    for (position, student) in students.into_iter().enumerate() {
        if position % batch_size == 0 {
            batches.push(DispatchBatch {
                index: batches.len() as u32,
                entries: Vec::with_capacity(batch_size),
            });
        }

        let prefix = loop {
            let candidate = next_prefix();
            if seen.insert(candidate.clone()) {
                break candidate;
            }
        };

        if let Some(batch) = batches.last_mut() {
            batch.entries.push(BatchEntry { student, prefix });
        }
    }

    Ok(batches)
}

/// Partition with random prefixes of `prefix_length` characters.
pub fn partition<T>(
    students: Vec<T>,
    batch_size: usize,
    prefix_length: usize,
) -> Result<Vec<DispatchBatch<T>>, CoreError> {
    naming::validate_prefix_length(prefix_length)?;
    partition_with(students, batch_size, || naming::generate_prefix(prefix_length))
}
