//! Batched MERGE execution over a caller supplied connection or transaction.

mod output;
mod writer;

use std::error::Error as StdError;
use std::time::Duration;

pub use output::{correlate, AppliedOutput, MergeAction, OutputCorrelationError, OutputMap, OutputRow};
pub use writer::{BulkRequest, BulkResult, BulkWriter};

use crate::batcher::RecordTooWideError;
use crate::metadata::{EntityError, UnsupportedShapeError};
use crate::query::FilterError;

#[derive(thiserror::Error, Debug)]
pub enum BulkError {
    #[error("{0}")]
    Shape(#[from] UnsupportedShapeError),

    #[error("{0}")]
    RecordTooWide(#[from] RecordTooWideError),

    #[error("Output of batch {batch} could not be correlated: {source}")]
    OutputCorrelation { batch: usize, source: OutputCorrelationError },

    /// The backend error is kept as is, see [`BulkError::execution_error`].
    #[error("Statement of batch {batch} failed: {source}")]
    Execution { batch: usize, source: Box<dyn StdError + Send + Sync> },

    #[error("Could not apply output values to record {record_index}: {source}")]
    Entity { record_index: usize, source: EntityError },

    #[error(
        "Filter has no conditions, build it with Filter::match_all() to state that no extra predicate is intended"
    )]
    AmbiguousFilter,

    #[error("The executor does not support bulk MERGE, use the single-row path instead")]
    MergeUnsupported,

    #[error("Operation cancelled after {completed_batches} completed batches")]
    Cancelled { completed_batches: usize },

    #[error("Statement of batch {batch} did not finish within {limit:?}")]
    Timeout { batch: usize, limit: Duration },
}

impl BulkError {
    /// The backend error of a failed statement, if it is of type `E`.
    pub fn execution_error<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            BulkError::Execution { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl From<FilterError> for BulkError {
    fn from(error: FilterError) -> Self {
        match error {
            FilterError::Ambiguous => BulkError::AmbiguousFilter,
            FilterError::Shape(error) => BulkError::Shape(error),
        }
    }
}
