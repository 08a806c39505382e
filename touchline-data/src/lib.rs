//! Concrete adapters for the Touchline pipeline.
//!
//! This crate supplies what `touchline-core` deliberately leaves abstract:
//! the API-Football [`Dataset`] definitions, an [`HttpProvider`] speaking to
//! the live service, a [`SqliteSink`] warehouse and a [`FileCheckpointStore`]
//! that persists the resume position atomically.
#![forbid(unsafe_code)]

pub mod checkpoint;
pub mod datasets;
pub mod http;
pub mod sink;

pub use checkpoint::{CHECKPOINT_VERSION, FileCheckpointStore};
pub use datasets::{Dataset, UnknownDataset};
pub use http::{
    API_KEY_HEADER, DEFAULT_BASE_URL, DEFAULT_USER_AGENT, HttpProvider, HttpProviderConfig,
    ProviderBuildError, RetryPolicy,
};
pub use sink::{SqliteSink, SqliteSinkError};
