//! Facade crate for the Touchline ingestion pipeline.
//!
//! This crate re-exports the core pipeline types and, behind the `data`
//! feature, the API-Football datasets and the HTTP, SQLite and checkpoint
//! file adapters.

#![forbid(unsafe_code)]

pub use touchline_core::{
    BatchBuffer, Checkpoint, CheckpointError, CheckpointStore, Clock, CompetitionId,
    DimensionEnumerator, Document, DriverError, FetchError, FetchRequest, PipelineDriver,
    PipelinePlan, PlanError, Provider, RateLimit, RateLimitError, RateLimiter, RateLimiters,
    RunSummary, Season, Sink, SinkError, Stage, StageSpec, SystemClock, TableSpec, Transform,
};

#[cfg(feature = "data")]
pub use touchline_data::{
    Dataset, FileCheckpointStore, HttpProvider, HttpProviderConfig, RetryPolicy, SqliteSink,
    SqliteSinkError,
};
