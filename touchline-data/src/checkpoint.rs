//! JSON checkpoint files.
//!
//! The file holds a small versioned envelope:
//!
//! ```json
//! {"version": 1, "dataset": "football", "checkpoint": {"competitionIndex": 0, ...}}
//! ```
//!
//! Saves go through [`touchline_fs::write_atomic`], so a crash leaves either
//! the previous or the new checkpoint on disk.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use touchline_core::{Checkpoint, CheckpointError, CheckpointStore};

/// Envelope version written by this build.
pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Serialize)]
struct Envelope<'a> {
    version: u32,
    dataset: &'a str,
    checkpoint: &'a Checkpoint,
}

#[derive(Deserialize)]
struct StoredEnvelope {
    version: u32,
    dataset: String,
    checkpoint: Value,
}

/// Checkpoint store backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: Utf8PathBuf,
    dataset: String,
}

impl FileCheckpointStore {
    /// Store checkpoints for `dataset` at `path`.
    ///
    /// Nothing is touched until the first load or save.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, dataset: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            dataset: dataset.into(),
        }
    }

    /// Location of the checkpoint file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Dataset the stored checkpoint must belong to.
    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    fn location(&self) -> String {
        self.path.to_string()
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let Some(contents) =
            touchline_fs::read_if_exists(&self.path).map_err(|source| CheckpointError::Read {
                location: self.location(),
                source,
            })?
        else {
            return Ok(None);
        };

        let stored: StoredEnvelope =
            serde_json::from_str(&contents).map_err(|source| CheckpointError::Corrupt {
                location: self.location(),
                source,
            })?;
        if stored.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                location: self.location(),
                found: stored.version,
            });
        }
        if stored.dataset != self.dataset {
            return Err(CheckpointError::DatasetMismatch {
                location: self.location(),
                expected: self.dataset.clone(),
                found: stored.dataset,
            });
        }
        serde_json::from_value(stored.checkpoint)
            .map(Some)
            .map_err(|source| CheckpointError::Corrupt {
                location: self.location(),
                source,
            })
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let envelope = Envelope {
            version: CHECKPOINT_VERSION,
            dataset: &self.dataset,
            checkpoint,
        };
        let mut encoded =
            serde_json::to_vec_pretty(&envelope).map_err(|source| CheckpointError::Encode {
                location: self.location(),
                source,
            })?;
        encoded.push(b'\n');
        touchline_fs::write_atomic(&self.path, &encoded).map_err(|source| {
            CheckpointError::Write {
                location: self.location(),
                source,
            }
        })
    }
}
