//! `run` command: ingest one dataset to completion.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use touchline_core::{
    CompetitionId, PipelineDriver, RateLimit, RateLimitError, RateLimiter, RateLimiters, RunSummary,
    Season, SystemClock,
};
use touchline_data::{
    DEFAULT_BASE_URL, DEFAULT_USER_AGENT, Dataset, FileCheckpointStore, HttpProvider,
    HttpProviderConfig, RetryPolicy, SqliteSink,
};

use crate::{
    ARG_API_KEY, ARG_BATCH_SIZE, ARG_BURST_CALLS, ARG_BURST_PERIOD, ARG_CHECKPOINT,
    ARG_COMPETITIONS, ARG_DAILY_CALLS, ARG_DATABASE, ARG_DATASET, ARG_ENDPOINT,
    ARG_RETRY_ATTEMPTS, ARG_SEASONS, ARG_TIMEOUT, ARG_USER_AGENT, CliError, ENV_API_KEY,
    ENV_COMPETITIONS, ENV_DATASET, ENV_SEASONS, default_checkpoint_path,
};

/// Default SQLite warehouse location.
pub(crate) const DEFAULT_DATABASE: &str = "touchline.sqlite";
/// Default calls allowed per burst window.
pub(crate) const DEFAULT_BURST_CALLS: u32 = 100;
/// Default burst window in seconds.
pub(crate) const DEFAULT_BURST_PERIOD_SECS: u64 = 10;
/// Default calls allowed per day.
pub(crate) const DEFAULT_DAILY_CALLS: u32 = 5_000;
const DAY: Duration = Duration::from_secs(86_400);
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BATCH_SIZE: usize = 1_000;

/// CLI arguments for the `run` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Fetch every competition, season and stage of a dataset from \
                 API-Football and append the raw payloads to SQLite. The run \
                 resumes from the checkpoint file and stops with a non-zero \
                 exit code when a batch cannot be committed.",
    about = "Ingest one dataset"
)]
#[ortho_config(prefix = "TOUCHLINE")]
pub(crate) struct RunArgs {
    /// Dataset to ingest (`football` or `fixtures`).
    #[arg(long = ARG_DATASET, value_name = "name")]
    #[serde(default)]
    pub(crate) dataset: Option<String>,
    /// Comma-separated competition (league) identifiers.
    #[arg(long = ARG_COMPETITIONS, value_name = "ids")]
    #[serde(default)]
    pub(crate) competitions: Option<String>,
    /// Comma-separated season years.
    #[arg(long = ARG_SEASONS, value_name = "years")]
    #[serde(default)]
    pub(crate) seasons: Option<String>,
    /// SQLite warehouse path.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Checkpoint file path (defaults to `checkpoints/<dataset>.json`).
    #[arg(long = ARG_CHECKPOINT, value_name = "path")]
    #[serde(default)]
    pub(crate) checkpoint: Option<Utf8PathBuf>,
    /// Rows buffered before a commit.
    #[arg(long = ARG_BATCH_SIZE, value_name = "rows")]
    #[serde(default)]
    pub(crate) batch_size: Option<usize>,
    /// API-Football key.
    #[arg(long = ARG_API_KEY, value_name = "key")]
    #[serde(default)]
    pub(crate) api_key: Option<String>,
    /// Base URL of the API.
    #[arg(long = ARG_ENDPOINT, value_name = "url")]
    #[serde(default)]
    pub(crate) endpoint: Option<String>,
    /// User agent sent with every request.
    #[arg(long = ARG_USER_AGENT, value_name = "agent")]
    #[serde(default)]
    pub(crate) user_agent: Option<String>,
    /// Request timeout in seconds.
    #[arg(long = ARG_TIMEOUT, value_name = "secs")]
    #[serde(default)]
    pub(crate) timeout_secs: Option<u64>,
    /// Attempts per request, the first one included.
    #[arg(long = ARG_RETRY_ATTEMPTS, value_name = "count")]
    #[serde(default)]
    pub(crate) retry_attempts: Option<u32>,
    /// Calls allowed per burst window.
    #[arg(long = ARG_BURST_CALLS, value_name = "count")]
    #[serde(default)]
    pub(crate) burst_calls: Option<u32>,
    /// Burst window length in seconds.
    #[arg(long = ARG_BURST_PERIOD, value_name = "secs")]
    #[serde(default)]
    pub(crate) burst_period_secs: Option<u64>,
    /// Calls allowed per day.
    #[arg(long = ARG_DAILY_CALLS, value_name = "count")]
    #[serde(default)]
    pub(crate) daily_calls: Option<u32>,
}

impl RunArgs {
    pub(crate) fn into_config(self) -> Result<RunConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        RunConfig::try_from(merged)
    }
}

/// Resolved `run` command configuration.
#[derive(Debug, Clone)]
pub(crate) struct RunConfig {
    pub(crate) dataset: Dataset,
    pub(crate) competitions: Vec<CompetitionId>,
    pub(crate) seasons: Vec<Season>,
    pub(crate) database: Utf8PathBuf,
    pub(crate) checkpoint: Utf8PathBuf,
    pub(crate) batch_size: NonZeroUsize,
    pub(crate) provider: HttpProviderConfig,
    pub(crate) burst: RateLimit,
    pub(crate) daily: RateLimit,
}

impl TryFrom<RunArgs> for RunConfig {
    type Error = CliError;

    fn try_from(args: RunArgs) -> Result<Self, Self::Error> {
        let dataset: Dataset = args
            .dataset
            .ok_or(CliError::MissingArgument {
                field: ARG_DATASET,
                env: ENV_DATASET,
            })?
            .parse()?;
        let competitions = parse_list(
            args.competitions.as_deref(),
            ARG_COMPETITIONS,
            ENV_COMPETITIONS,
        )?
        .into_iter()
        .map(CompetitionId)
        .collect();
        let seasons = parse_list(args.seasons.as_deref(), ARG_SEASONS, ENV_SEASONS)?
            .into_iter()
            .map(Season)
            .collect();
        let api_key = args
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(CliError::MissingArgument {
                field: ARG_API_KEY,
                env: ENV_API_KEY,
            })?;

        let batch_size = args.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        let batch_size = NonZeroUsize::new(batch_size).ok_or_else(|| CliError::InvalidArgument {
            field: ARG_BATCH_SIZE,
            value: batch_size.to_string(),
            reason: "must be at least 1".to_owned(),
        })?;
        let timeout_secs = args.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(CliError::InvalidArgument {
                field: ARG_TIMEOUT,
                value: timeout_secs.to_string(),
                reason: "must be at least 1 second".to_owned(),
            });
        }

        let burst = RateLimit::new(
            args.burst_calls.unwrap_or(DEFAULT_BURST_CALLS),
            Duration::from_secs(args.burst_period_secs.unwrap_or(DEFAULT_BURST_PERIOD_SECS)),
        )
        .map_err(|source| CliError::InvalidRateLimit {
            field: match source {
                RateLimitError::ZeroPeriod => ARG_BURST_PERIOD,
                RateLimitError::ZeroCapacity => ARG_BURST_CALLS,
            },
            source,
        })?;
        let daily = RateLimit::new(args.daily_calls.unwrap_or(DEFAULT_DAILY_CALLS), DAY).map_err(
            |source| CliError::InvalidRateLimit {
                field: ARG_DAILY_CALLS,
                source,
            },
        )?;

        let retry = RetryPolicy::default();
        let provider = HttpProviderConfig::new(api_key)
            .with_base_url(args.endpoint.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()))
            .with_user_agent(
                args.user_agent
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
            )
            .with_timeout(Duration::from_secs(timeout_secs))
            .with_retry(RetryPolicy::new(
                args.retry_attempts.unwrap_or(retry.attempts()),
                retry.delay(1),
                retry.max_backoff(),
            ));

        Ok(Self {
            database: args
                .database
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATABASE)),
            checkpoint: args
                .checkpoint
                .unwrap_or_else(|| default_checkpoint_path(dataset)),
            dataset,
            competitions,
            seasons,
            batch_size,
            provider,
            burst,
            daily,
        })
    }
}

impl RunConfig {
    /// Burst tier first, then the daily quota.
    pub(crate) fn limiters(&self) -> RateLimiters {
        let clock = Arc::new(SystemClock::default());
        RateLimiters::unlimited()
            .with_tier(RateLimiter::new("burst", self.burst, clock.clone()))
            .with_tier(RateLimiter::new("daily", self.daily, clock))
    }
}

/// Run the configured dataset to completion.
pub(crate) fn execute(config: &RunConfig) -> Result<RunSummary, CliError> {
    let plan = config
        .dataset
        .plan(config.competitions.clone(), config.seasons.clone())?;
    let provider = HttpProvider::with_config(config.provider.clone()).map_err(|source| {
        CliError::BuildProvider {
            base_url: config.provider.base_url.clone(),
            source,
        }
    })?;
    let sink = SqliteSink::open(&config.database).map_err(|source| CliError::OpenWarehouse {
        path: config.database.clone(),
        source,
    })?;
    let store = FileCheckpointStore::new(config.checkpoint.clone(), config.dataset.name());

    info!(
        "ingesting {} into {} (checkpoint {})",
        config.dataset, config.database, config.checkpoint
    );
    let summary = PipelineDriver::new(&plan, provider, sink, store)
        .with_limits(config.limiters())
        .with_batch_size(config.batch_size)
        .run()?;
    Ok(summary)
}

/// Parse a comma-separated list of integers.
pub(crate) fn parse_list<T>(
    raw: Option<&str>,
    field: &'static str,
    env: &'static str,
) -> Result<Vec<T>, CliError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = raw.ok_or(CliError::MissingArgument { field, env })?;
    let values = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse().map_err(|err: T::Err| CliError::InvalidArgument {
                field,
                value: part.to_owned(),
                reason: err.to_string(),
            })
        })
        .collect::<Result<Vec<T>, _>>()?;
    if values.is_empty() {
        return Err(CliError::InvalidArgument {
            field,
            value: raw.to_owned(),
            reason: "expected at least one value".to_owned(),
        });
    }
    Ok(values)
}
