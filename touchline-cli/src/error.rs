//! Error types emitted by the Touchline CLI.

use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;
use touchline_core::{CheckpointError, DriverError, PlanError, RateLimitError};
use touchline_data::{ProviderBuildError, SqliteSinkError, UnknownDataset};

/// Errors emitted by the Touchline CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// An option is present but unusable.
    #[error("invalid {field} {value:?}: {reason}")]
    InvalidArgument {
        field: &'static str,
        value: String,
        reason: String,
    },
    /// The dataset name is not one Touchline knows.
    #[error(transparent)]
    UnknownDataset(#[from] UnknownDataset),
    /// A rate limit option describes an impossible limit.
    #[error("invalid {field}: {source}")]
    InvalidRateLimit {
        field: &'static str,
        #[source]
        source: RateLimitError,
    },
    /// The competitions, seasons and dataset do not form a plan.
    #[error("invalid pipeline plan: {0}")]
    Plan(#[from] PlanError),
    /// Constructing the HTTP provider failed.
    #[error("failed to build provider for {base_url:?}: {source}")]
    BuildProvider {
        base_url: String,
        #[source]
        source: ProviderBuildError,
    },
    /// Opening the SQLite warehouse failed.
    #[error("failed to open warehouse at {path:?}: {source}")]
    OpenWarehouse {
        path: Utf8PathBuf,
        #[source]
        source: SqliteSinkError,
    },
    /// Reading committed row counts failed.
    #[error("failed to inspect warehouse at {path:?}: {source}")]
    InspectWarehouse {
        path: Utf8PathBuf,
        #[source]
        source: SqliteSinkError,
    },
    /// Reading the stored checkpoint failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    /// The pipeline stopped on a fatal error.
    #[error("pipeline stopped: {0}")]
    Pipeline(#[from] DriverError),
    /// Writing the report to stdout failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
