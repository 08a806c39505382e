//! Transactional sink seam.

use std::error::Error as StdError;

use thiserror::Error;

use crate::Batch;

/// A batch that could not be committed.
///
/// Sinks must roll back on failure so that none of the batch's rows are
/// visible afterwards.
#[derive(Debug, Error)]
#[error("failed to commit {rows} rows to {table}: {source}")]
pub struct SinkError {
    /// Destination table.
    pub table: String,
    /// Size of the rejected batch.
    pub rows: usize,
    /// Underlying failure.
    #[source]
    pub source: Box<dyn StdError + Send + Sync>,
}

impl SinkError {
    /// Wrap a backend failure for `batch`.
    pub fn new(batch: &Batch<'_>, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            table: batch.table.name.to_owned(),
            rows: batch.len(),
            source: source.into(),
        }
    }
}

/// Persists batches atomically.
pub trait Sink {
    /// Commit every row of `batch` in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the transaction did not commit.
    fn insert_batch(&mut self, batch: &Batch<'_>) -> Result<(), SinkError>;
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn insert_batch(&mut self, batch: &Batch<'_>) -> Result<(), SinkError> {
        (**self).insert_batch(batch)
    }
}
