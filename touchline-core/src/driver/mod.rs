//! Orchestration of a dataset run.
//!
//! The [`PipelineDriver`] loads the checkpoint, walks the plan with a
//! [`DimensionEnumerator`], fetches each unit under the rate limiters,
//! transforms responses into rows, and flushes a [`BatchBuffer`] whenever it
//! fills up or its scope ends. A unit that fails at the provider is logged
//! and skipped; a sink failure stops the run without advancing the
//! checkpoint.

mod directory;
mod summary;

use std::fmt;
use std::num::NonZeroUsize;
use std::time::SystemTime;

use log::{debug, info, warn};
use thiserror::Error;

use crate::batch::{BatchBuffer, FlushError};
use crate::enumerate::{DimensionEnumerator, WorkUnit};
use crate::{
    CheckpointError, CheckpointStore, FetchError, PipelinePlan, PlanError, Provider, ProviderIssue,
    RateLimiters, RawPayloadTransform, Row, Sink, SinkError, Transform,
};

use directory::{ListingSkip, ProviderDirectory};
pub use summary::{RunSummary, StageTally};

/// Rows buffered before a flush is forced.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(1_000) {
    Some(size) => size,
    None => NonZeroUsize::MIN,
};

/// Why a unit or listing produced no rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The provider answered but reported errors.
    Provider(Vec<ProviderIssue>),
    /// The fetch failed after the provider adapter's retries.
    Transport(FetchError),
    /// A per-entity unit had no identifier to fetch with.
    MissingEntityId,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider(issues) => {
                f.write_str("provider reported errors: ")?;
                for (position, issue) in issues.iter().enumerate() {
                    if position > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{issue}")?;
                }
                Ok(())
            }
            Self::Transport(error) => write!(f, "{error}"),
            Self::MissingEntityId => f.write_str("entity has no identifier"),
        }
    }
}

/// Fatal run failures.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The stored checkpoint does not address a position in the plan.
    #[error("checkpoint does not fit the pipeline plan: {0}")]
    Plan(#[from] PlanError),
    /// Loading or saving the checkpoint failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    /// A batch could not be committed.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl From<FlushError> for DriverError {
    fn from(error: FlushError) -> Self {
        match error {
            FlushError::Sink(source) => Self::Sink(source),
            FlushError::Checkpoint { source, .. } => Self::Checkpoint(source),
        }
    }
}

/// Runs one dataset plan to completion.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use touchline_core::PipelineDriver;
/// use touchline_core::test_support::{
///     MemoryCheckpointStore, MemorySink, ScriptedProvider, teams_listing, teams_plan,
/// };
///
/// let plan = teams_plan(&[39], &[2024]);
/// let provider = ScriptedProvider::default()
///     .respond("/teams?league=39&season=2024", teams_listing(&[33]))
///     .respond(
///         "/teams/statistics?league=39&season=2024&team=33",
///         json!({"errors": [], "response": {"form": "WWW"}}),
///     );
/// let mut driver = PipelineDriver::new(
///     &plan,
///     provider,
///     MemorySink::default(),
///     MemoryCheckpointStore::default(),
/// );
/// let summary = driver.run().expect("run succeeds");
/// assert_eq!(summary.rows_committed(), 2);
/// ```
#[derive(Debug)]
pub struct PipelineDriver<'p, P, S, K, T = RawPayloadTransform> {
    plan: &'p PipelinePlan,
    provider: P,
    sink: S,
    store: K,
    transform: T,
    limits: RateLimiters,
    batch_size: NonZeroUsize,
}

impl<'p, P, S, K> PipelineDriver<'p, P, S, K> {
    /// Driver with no rate limits, raw payload rows and the default batch size.
    #[must_use]
    pub fn new(plan: &'p PipelinePlan, provider: P, sink: S, store: K) -> Self {
        Self {
            plan,
            provider,
            sink,
            store,
            transform: RawPayloadTransform::default(),
            limits: RateLimiters::unlimited(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl<'p, P, S, K, T> PipelineDriver<'p, P, S, K, T> {
    /// Guard provider calls with `limits`.
    #[must_use]
    pub fn with_limits(mut self, limits: RateLimiters) -> Self {
        self.limits = limits;
        self
    }

    /// Flush once `batch_size` rows are buffered.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: NonZeroUsize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Replace the transform.
    #[must_use]
    pub fn with_transform<U>(self, transform: U) -> PipelineDriver<'p, P, S, K, U> {
        PipelineDriver {
            plan: self.plan,
            provider: self.provider,
            sink: self.sink,
            store: self.store,
            transform,
            limits: self.limits,
            batch_size: self.batch_size,
        }
    }

    /// Provider in use.
    #[must_use]
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Sink in use.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Checkpoint store in use.
    #[must_use]
    pub const fn store(&self) -> &K {
        &self.store
    }
}

impl<'p, P, S, K, T> PipelineDriver<'p, P, S, K, T>
where
    P: Provider,
    S: Sink,
    K: CheckpointStore,
    T: Transform,
{
    /// Process every remaining unit of the plan.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the checkpoint cannot be loaded or does
    /// not fit the plan, when a batch fails to commit, or when a committed
    /// batch's checkpoint cannot be saved. Provider failures are never fatal.
    pub fn run(&mut self) -> Result<RunSummary, DriverError> {
        let Self {
            plan,
            provider,
            sink,
            store,
            transform,
            limits,
            batch_size,
        } = self;
        let plan: &'p PipelinePlan = *plan;
        let batch_size = *batch_size;

        let start = store.load_or(plan.origin())?;
        let mut enumerator = DimensionEnumerator::new(plan, &start)?;
        let mut summary = RunSummary::new(plan, start);
        if enumerator.is_finished() {
            info!("{} already complete at {start}", plan.name());
            return Ok(summary);
        }
        info!("running {} from {start}", plan.name());

        let mut directory = ProviderDirectory::new(&*provider, &*limits);
        let mut buffer: Option<BatchBuffer<'p>> = None;

        while let Some(unit) = enumerator.next_unit(&mut directory) {
            record_listing_skips(plan, &mut summary, directory.take_skips());

            let spec = unit.spec;
            let mut current = match buffer.take() {
                Some(open) if open.scope() == unit.scope => open,
                previous => {
                    if let Some(mut closed) = previous {
                        commit(&mut closed, sink, store, &mut summary)?;
                    }
                    BatchBuffer::new(unit.scope, &spec.table, batch_size)
                }
            };

            match fetch_rows(&unit, &*provider, &*limits, &*transform) {
                Ok(rows) => rows.into_iter().for_each(|row| current.append(row)),
                Err(reason) => {
                    warn!(
                        "skipping {} for competition {}, season {}, entity {} (index {}): {reason}",
                        spec.stage,
                        unit.competition,
                        unit.season,
                        unit.entity
                            .id
                            .map_or_else(|| "unknown".to_owned(), |id| id.to_string()),
                        unit.entity_index
                    );
                    if let Some(tally) = summary.tally_mut(spec.stage) {
                        tally.skipped += 1;
                    }
                }
            }
            current.mark_processed(unit.next_checkpoint());
            if let Some(tally) = summary.tally_mut(spec.stage) {
                tally.units += 1;
            }

            if current.is_due() || enumerator.scope_exhausted() {
                commit(&mut current, sink, store, &mut summary)?;
            }
            buffer = Some(current);
        }

        record_listing_skips(plan, &mut summary, directory.take_skips());
        if let Some(mut last) = buffer {
            commit(&mut last, sink, store, &mut summary)?;
        }

        info!(
            "{} finished at {}: {} rows committed, {} skipped",
            plan.name(),
            summary.ended_at(),
            summary.rows_committed(),
            summary.skipped()
        );
        Ok(summary)
    }
}

fn fetch_rows<P, T>(
    unit: &WorkUnit<'_>,
    provider: &P,
    limits: &RateLimiters,
    transform: &T,
) -> Result<Vec<Row>, SkipReason>
where
    P: Provider + ?Sized,
    T: Transform + ?Sized,
{
    if let Some(item) = unit.entity.item.as_ref() {
        return Ok(transform
            .item_row(unit, item, SystemTime::now())
            .into_iter()
            .collect());
    }

    let request = unit
        .entity
        .id
        .and_then(|id| unit.spec.entity_request(unit.competition, unit.season, id))
        .ok_or(SkipReason::MissingEntityId)?;
    limits.acquire();
    let document = provider
        .fetch(&request, limits)
        .map_err(SkipReason::Transport)?;
    let issues = document.errors();
    if !issues.is_empty() {
        return Err(SkipReason::Provider(issues));
    }
    Ok(transform.response_rows(unit, &document, SystemTime::now()))
}

fn commit<S, K>(
    buffer: &mut BatchBuffer<'_>,
    sink: &mut S,
    store: &mut K,
    summary: &mut RunSummary,
) -> Result<(), DriverError>
where
    S: Sink + ?Sized,
    K: CheckpointStore + ?Sized,
{
    let stage = buffer.scope().stage;
    let outcome = buffer.flush(sink, store)?;
    if let Some(tally) = summary.tally_mut(stage) {
        tally.rows_committed += outcome.rows;
    }
    if let Some(checkpoint) = outcome.checkpoint {
        debug!("committed {} {stage} rows; checkpoint at {checkpoint}", outcome.rows);
        summary.set_ended_at(checkpoint);
    }
    Ok(())
}

fn record_listing_skips(plan: &PipelinePlan, summary: &mut RunSummary, skips: Vec<ListingSkip>) {
    for skip in skips {
        let competition = plan.competitions().get(skip.scope.competition_index);
        let season = plan.seasons().get(skip.scope.season_index);
        warn!(
            "skipping {} listing {} for competition {}, season {}: {}",
            skip.scope.stage,
            skip.request,
            competition.map_or_else(|| "?".to_owned(), ToString::to_string),
            season.map_or_else(|| "?".to_owned(), ToString::to_string),
            skip.reason
        );
        if let Some(tally) = summary.tally_mut(skip.scope.stage) {
            tally.skipped += 1;
        }
    }
}

#[cfg(test)]
mod tests;
