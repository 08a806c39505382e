//! `status` command: report the stored checkpoint without touching the network.

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use touchline_core::{Checkpoint, CheckpointStore};
use touchline_data::{Dataset, FileCheckpointStore, SqliteSink};

use crate::{
    ARG_CHECKPOINT, ARG_DATABASE, ARG_DATASET, CliError, ENV_STATUS_DATASET, default_checkpoint_path,
};

/// CLI arguments for the `status` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "Show where the next run of a dataset will resume")]
#[ortho_config(prefix = "TOUCHLINE")]
pub(crate) struct StatusArgs {
    /// Dataset to inspect (`football` or `fixtures`).
    #[arg(long = ARG_DATASET, value_name = "name")]
    #[serde(default)]
    pub(crate) dataset: Option<String>,
    /// Checkpoint file path (defaults to `checkpoints/<dataset>.json`).
    #[arg(long = ARG_CHECKPOINT, value_name = "path")]
    #[serde(default)]
    pub(crate) checkpoint: Option<Utf8PathBuf>,
    /// SQLite warehouse to report committed row counts from.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
}

impl StatusArgs {
    pub(crate) fn into_config(self) -> Result<StatusConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        StatusConfig::try_from(merged)
    }
}

/// Resolved `status` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusConfig {
    pub(crate) dataset: Dataset,
    pub(crate) checkpoint: Utf8PathBuf,
    pub(crate) database: Option<Utf8PathBuf>,
}

impl TryFrom<StatusArgs> for StatusConfig {
    type Error = CliError;

    fn try_from(args: StatusArgs) -> Result<Self, Self::Error> {
        let dataset: Dataset = args
            .dataset
            .ok_or(CliError::MissingArgument {
                field: ARG_DATASET,
                env: ENV_STATUS_DATASET,
            })?
            .parse()?;
        Ok(Self {
            checkpoint: args
                .checkpoint
                .unwrap_or_else(|| default_checkpoint_path(dataset)),
            database: args.database,
            dataset,
        })
    }
}

/// Render the status report for `config`.
///
/// A missing warehouse file is reported rather than created.
pub(crate) fn report(config: &StatusConfig) -> Result<String, CliError> {
    let store = FileCheckpointStore::new(config.checkpoint.clone(), config.dataset.name());
    let mut lines = vec![format!("dataset: {}", config.dataset)];
    lines.push(match store.load()? {
        Some(checkpoint) => format!("checkpoint: {checkpoint}"),
        None => config.dataset.stages().first().map_or_else(
            || "checkpoint: none".to_owned(),
            |spec| {
                let origin = Checkpoint::origin(spec.stage);
                format!("checkpoint: none (next run starts at {origin})")
            },
        ),
    });
    if let Some(database) = config.database.as_ref() {
        lines.extend(warehouse_lines(config.dataset, database)?);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}

fn warehouse_lines(dataset: Dataset, database: &Utf8Path) -> Result<Vec<String>, CliError> {
    if !database.is_file() {
        return Ok(vec![format!("warehouse: {database} does not exist yet")]);
    }
    let sink = SqliteSink::open(database).map_err(|source| CliError::OpenWarehouse {
        path: database.to_path_buf(),
        source,
    })?;
    dataset
        .tables()
        .map(|table| {
            let rows = sink
                .row_count(table)
                .map_err(|source| CliError::InspectWarehouse {
                    path: database.to_path_buf(),
                    source,
                })?;
            Ok(format!("{:<24} {rows}", table.name))
        })
        .collect()
}
