//! Resumable enumeration position and the persistence seam behind it.
//!
//! A [`Checkpoint`] holds only coordinates into the enumeration, never
//! fetched data. The driver saves it after every committed batch, so the
//! persisted value is always at or behind what the sink actually holds.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Stage;

/// Position of the next work unit to process.
///
/// Fields are serialised in `camelCase` to match the persisted cursor layout.
///
/// # Examples
///
/// ```
/// use touchline_core::{Checkpoint, Stage};
///
/// let cp = Checkpoint::origin(Stage::LeagueInfo);
/// assert_eq!(cp.competition_index, 0);
/// assert_eq!(cp.entity_index, 0);
/// assert_eq!(cp.to_string(), "competition 0, season 0, stage league_info, entity 0");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Index into the configured competitions.
    pub competition_index: usize,
    /// Index into the configured seasons.
    pub season_index: usize,
    /// Stage being processed.
    pub stage: Stage,
    /// Index of the next entity within the stage.
    pub entity_index: usize,
    /// Listing page on which the last processed entity was found.
    ///
    /// Diagnostic only; resumption is driven by `entity_index`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl Checkpoint {
    /// The start of the enumeration for a plan whose first stage is `stage`.
    #[must_use]
    pub const fn origin(stage: Stage) -> Self {
        Self {
            competition_index: 0,
            season_index: 0,
            stage,
            entity_index: 0,
            page: None,
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "competition {}, season {}, stage {}, entity {}",
            self.competition_index, self.season_index, self.stage, self.entity_index
        )?;
        if let Some(page) = self.page {
            write!(f, ", page {page}")?;
        }
        Ok(())
    }
}

/// Failures raised while reading or writing checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The stored checkpoint could not be read.
    #[error("failed to read checkpoint at {location}: {source}")]
    Read {
        /// Where the checkpoint lives.
        location: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The stored checkpoint exists but does not decode.
    #[error("checkpoint at {location} is corrupt: {source}")]
    Corrupt {
        /// Where the checkpoint lives.
        location: String,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// The stored checkpoint uses a format this build does not understand.
    #[error("checkpoint at {location} has unsupported version {found}")]
    UnsupportedVersion {
        /// Where the checkpoint lives.
        location: String,
        /// Version recorded in the file.
        found: u32,
    },
    /// The stored checkpoint belongs to a different dataset.
    #[error("checkpoint at {location} belongs to dataset {found}, expected {expected}")]
    DatasetMismatch {
        /// Where the checkpoint lives.
        location: String,
        /// Dataset the caller is running.
        expected: String,
        /// Dataset recorded in the file.
        found: String,
    },
    /// The checkpoint could not be encoded.
    #[error("failed to encode checkpoint for {location}: {source}")]
    Encode {
        /// Where the checkpoint was headed.
        location: String,
        /// Encoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// The checkpoint could not be written durably.
    #[error("failed to write checkpoint at {location}: {source}")]
    Write {
        /// Where the checkpoint lives.
        location: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The stored position does not fit the plan being run.
    #[error("checkpoint {checkpoint} does not fit the pipeline plan: {reason}")]
    Incompatible {
        /// The offending checkpoint.
        checkpoint: Checkpoint,
        /// Why it was rejected.
        reason: String,
    },
}

/// Durable storage for a single checkpoint.
///
/// Implementations must make [`CheckpointStore::save`] atomic: after a crash
/// at any instant, [`CheckpointStore::load`] returns either the previous or
/// the new value, never a partial one.
pub trait CheckpointStore {
    /// Return the last saved checkpoint, or `None` when nothing was saved.
    ///
    /// # Errors
    ///
    /// Fails explicitly when stored state exists but cannot be trusted.
    fn load(&self) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Replace the stored checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] when the value could not be persisted.
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// Return the saved checkpoint or `origin` when none exists.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`CheckpointStore::load`].
    fn load_or(&self, origin: Checkpoint) -> Result<Checkpoint, CheckpointError> {
        Ok(self.load()?.unwrap_or(origin))
    }
}

impl<T: CheckpointStore + ?Sized> CheckpointStore for &mut T {
    fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        (**self).load()
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        (**self).save(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn persisted_layout_uses_camel_case() {
        let cp = Checkpoint {
            competition_index: 1,
            season_index: 2,
            stage: Stage::TeamTransfers,
            entity_index: 5,
            page: Some(2),
        };
        let value = serde_json::to_value(cp).expect("encode checkpoint");
        assert_eq!(
            value,
            json!({
                "competitionIndex": 1,
                "seasonIndex": 2,
                "stage": "team_transfers",
                "entityIndex": 5,
                "page": 2
            })
        );
    }

    #[rstest]
    fn page_is_optional_when_decoding() {
        let cp: Checkpoint = serde_json::from_value(json!({
            "competitionIndex": 0,
            "seasonIndex": 0,
            "stage": "teams",
            "entityIndex": 2
        }))
        .expect("decode checkpoint");
        assert_eq!(cp.page, None);
        assert_eq!(cp.entity_index, 2);
    }

    #[rstest]
    fn load_or_falls_back_to_origin() {
        let store = crate::test_support::MemoryCheckpointStore::default();
        let origin = Checkpoint::origin(Stage::Fixtures);
        assert_eq!(store.load_or(origin).expect("load"), origin);
    }
}
