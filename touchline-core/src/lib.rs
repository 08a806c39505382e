//! Core types for the Touchline ingestion pipeline.
//!
//! The crate holds everything that is independent of a concrete provider
//! or warehouse: the token-bucket [`RateLimiter`], the resumable
//! [`Checkpoint`] and its [`CheckpointStore`] seam, the
//! [`DimensionEnumerator`] that walks competitions, seasons, stages and
//! entities in odometer order, the [`BatchBuffer`] flush protocol, and the
//! [`PipelineDriver`] that ties them together.
//!
//! Adapters for HTTP providers, SQLite sinks and on-disk checkpoints live
//! in `touchline-data`.
#![forbid(unsafe_code)]

pub mod batch;
pub mod checkpoint;
pub mod document;
pub mod driver;
pub mod enumerate;
pub mod plan;
pub mod provider;
pub mod rate_limit;
pub mod row;
pub mod sink;
pub mod stage;
pub mod transform;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use batch::{BatchBuffer, FlushError, FlushOutcome};
pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
pub use document::{Document, Paging, ProviderIssue};
pub use driver::{DriverError, PipelineDriver, RunSummary, SkipReason, StageTally};
pub use enumerate::{DimensionEnumerator, Entity, EntityDirectory, Scope, WorkUnit};
pub use plan::{
    CompetitionId, EntitySource, PipelinePlan, PlanError, RowShape, Season, StageSpec, TableSpec,
};
pub use provider::{FetchError, FetchRequest, Provider};
pub use rate_limit::{Clock, RateLimit, RateLimitError, RateLimiter, RateLimiters, SystemClock};
pub use row::{Batch, Row, RowKeys};
pub use sink::{Sink, SinkError};
pub use stage::{ResourceKind, Stage};
pub use transform::{RawPayloadTransform, Transform};
