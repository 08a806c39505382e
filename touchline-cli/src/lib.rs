//! Command-line interface for Touchline's API-Football ingestion.
#![forbid(unsafe_code)]

mod error;
mod run;
mod status;

use std::io::Write;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use touchline_data::Dataset;

pub use error::CliError;
use run::{RunArgs, RunConfig};
use status::{StatusArgs, StatusConfig};

const ARG_DATASET: &str = "dataset";
const ARG_COMPETITIONS: &str = "competitions";
const ARG_SEASONS: &str = "seasons";
const ARG_DATABASE: &str = "database";
const ARG_CHECKPOINT: &str = "checkpoint";
const ARG_BATCH_SIZE: &str = "batch-size";
const ARG_API_KEY: &str = "api-key";
const ARG_ENDPOINT: &str = "endpoint";
const ARG_USER_AGENT: &str = "user-agent";
const ARG_TIMEOUT: &str = "timeout-secs";
const ARG_RETRY_ATTEMPTS: &str = "retry-attempts";
const ARG_BURST_CALLS: &str = "burst-calls";
const ARG_BURST_PERIOD: &str = "burst-period-secs";
const ARG_DAILY_CALLS: &str = "daily-calls";
const ENV_DATASET: &str = "TOUCHLINE_CMDS_RUN_DATASET";
const ENV_COMPETITIONS: &str = "TOUCHLINE_CMDS_RUN_COMPETITIONS";
const ENV_SEASONS: &str = "TOUCHLINE_CMDS_RUN_SEASONS";
const ENV_API_KEY: &str = "TOUCHLINE_CMDS_RUN_API_KEY";
const ENV_STATUS_DATASET: &str = "TOUCHLINE_CMDS_STATUS_DATASET";

/// Run the Touchline CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Run(args) => {
            let config = resolve_run_config(args)?;
            let summary = run::execute(&config)?;
            write_stdout(&format!("{summary}\n"))
        }
        Command::Status(args) => {
            let config = resolve_status_config(args)?;
            write_stdout(&status::report(&config)?)
        }
    }
}

fn resolve_run_config(args: RunArgs) -> Result<RunConfig, CliError> {
    args.into_config()
}

fn resolve_status_config(args: StatusArgs) -> Result<StatusConfig, CliError> {
    args.into_config()
}

fn write_stdout(text: &str) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(CliError::WriteOutput)
}

/// Checkpoint location used when none is configured.
fn default_checkpoint_path(dataset: Dataset) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("checkpoints/{dataset}.json"))
}

#[derive(Debug, Parser)]
#[command(
    name = "touchline",
    about = "Rate-limited, resumable ingestion of API-Football data",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest one dataset, resuming from its checkpoint.
    Run(RunArgs),
    /// Show the stored checkpoint of a dataset.
    Status(StatusArgs),
}

#[cfg(test)]
mod tests;
