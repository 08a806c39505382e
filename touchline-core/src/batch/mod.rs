//! Buffered rows and the commit-then-advance flush protocol.
//!
//! A [`BatchBuffer`] collects the rows of one scope together with the
//! checkpoint that follows the last unit whose rows it holds. Flushing
//! commits the rows as a single sink transaction and only then persists the
//! checkpoint, so the stored position never runs ahead of committed data.

use std::num::NonZeroUsize;

use thiserror::Error;

use crate::enumerate::Scope;
use crate::{Batch, Checkpoint, CheckpointError, CheckpointStore, Row, Sink, SinkError, TableSpec};

/// Result of a successful flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Rows committed by this flush.
    pub rows: usize,
    /// Checkpoint persisted by this flush, if progress was pending.
    pub checkpoint: Option<Checkpoint>,
}

/// Failures raised by [`BatchBuffer::flush`].
#[derive(Debug, Error)]
pub enum FlushError {
    /// The sink rejected the batch; rows and progress are retained.
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// Rows were committed but the checkpoint could not be saved.
    ///
    /// The committed rows have left the buffer. The pending checkpoint is
    /// retained so a later flush can persist it.
    #[error("committed {committed} rows but could not save the checkpoint: {source}")]
    Checkpoint {
        /// Rows committed before the failure.
        committed: usize,
        /// Underlying store failure.
        #[source]
        source: CheckpointError,
    },
}

/// In-memory rows awaiting commit for one scope.
#[derive(Debug)]
pub struct BatchBuffer<'p> {
    scope: Scope,
    table: &'p TableSpec,
    threshold: NonZeroUsize,
    rows: Vec<Row>,
    pending: Option<Checkpoint>,
}

impl<'p> BatchBuffer<'p> {
    /// Empty buffer for `scope` writing to `table`.
    #[must_use]
    pub fn new(scope: Scope, table: &'p TableSpec, threshold: NonZeroUsize) -> Self {
        Self {
            scope,
            table,
            threshold,
            rows: Vec::with_capacity(threshold.get()),
            pending: None,
        }
    }

    /// Scope whose rows this buffer collects.
    #[must_use]
    pub const fn scope(&self) -> Scope {
        self.scope
    }

    /// Buffer a row.
    pub fn append(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Record that every unit up to `next` has been fully buffered.
    pub const fn mark_processed(&mut self, next: Checkpoint) {
        self.pending = Some(next);
    }

    /// Rows currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Checkpoint that the next successful flush will persist.
    #[must_use]
    pub const fn pending(&self) -> Option<Checkpoint> {
        self.pending
    }

    /// Whether the buffer has reached its size threshold.
    #[must_use]
    pub fn is_due(&self) -> bool {
        self.rows.len() >= self.threshold.get()
    }

    /// Commit buffered rows, then persist the pending checkpoint.
    ///
    /// An empty buffer skips the sink but still persists pending progress,
    /// so runs of skipped units move the checkpoint forward.
    ///
    /// # Errors
    ///
    /// Returns [`FlushError::Sink`] when the commit fails; nothing changes
    /// in that case. Returns [`FlushError::Checkpoint`] when the commit
    /// succeeded but the checkpoint could not be saved.
    pub fn flush<S, K>(&mut self, sink: &mut S, store: &mut K) -> Result<FlushOutcome, FlushError>
    where
        S: Sink + ?Sized,
        K: CheckpointStore + ?Sized,
    {
        let committed = self.rows.len();
        if committed > 0 {
            sink.insert_batch(&Batch {
                table: self.table,
                rows: &self.rows,
            })?;
            self.rows.clear();
        }

        let Some(checkpoint) = self.pending else {
            return Ok(FlushOutcome {
                rows: committed,
                checkpoint: None,
            });
        };
        store
            .save(&checkpoint)
            .map_err(|source| FlushError::Checkpoint { committed, source })?;
        self.pending = None;
        Ok(FlushOutcome {
            rows: committed,
            checkpoint: Some(checkpoint),
        })
    }
}
