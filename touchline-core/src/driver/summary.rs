//! Per-stage accounting reported at the end of a run.

use std::fmt;

use crate::{Checkpoint, PipelinePlan, Stage};

/// Counters for one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTally {
    /// Work units processed, including skipped ones.
    pub units: usize,
    /// Rows committed to the sink.
    pub rows_committed: usize,
    /// Units or listings skipped because of provider or transport errors.
    pub skipped: usize,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    dataset: String,
    started_from: Checkpoint,
    ended_at: Checkpoint,
    stages: Vec<(Stage, StageTally)>,
}

impl RunSummary {
    pub(crate) fn new(plan: &PipelinePlan, started_from: Checkpoint) -> Self {
        Self {
            dataset: plan.name().to_owned(),
            started_from,
            ended_at: started_from,
            stages: plan
                .stages()
                .iter()
                .map(|spec| (spec.stage, StageTally::default()))
                .collect(),
        }
    }

    pub(crate) fn tally_mut(&mut self, stage: Stage) -> Option<&mut StageTally> {
        self.stages
            .iter_mut()
            .find(|(candidate, _)| *candidate == stage)
            .map(|(_, tally)| tally)
    }

    pub(crate) const fn set_ended_at(&mut self, checkpoint: Checkpoint) {
        self.ended_at = checkpoint;
    }

    /// Dataset the run processed.
    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Checkpoint the run resumed from.
    #[must_use]
    pub const fn started_from(&self) -> Checkpoint {
        self.started_from
    }

    /// Last checkpoint persisted by the run.
    #[must_use]
    pub const fn ended_at(&self) -> Checkpoint {
        self.ended_at
    }

    /// Counters for `stage`, if the plan contains it.
    #[must_use]
    pub fn stage(&self, stage: Stage) -> Option<StageTally> {
        self.stages
            .iter()
            .find(|(candidate, _)| *candidate == stage)
            .map(|(_, tally)| *tally)
    }

    /// Counters for every stage in plan order.
    #[must_use]
    pub fn stages(&self) -> &[(Stage, StageTally)] {
        &self.stages
    }

    /// Rows committed across all stages.
    #[must_use]
    pub fn rows_committed(&self) -> usize {
        self.stages.iter().map(|(_, tally)| tally.rows_committed).sum()
    }

    /// Skips across all stages.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.stages.iter().map(|(_, tally)| tally.skipped).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: resumed at {}, stopped at {}",
            self.dataset, self.started_from, self.ended_at
        )?;
        for (stage, tally) in &self.stages {
            writeln!(
                f,
                "  {stage:<20} units={:<6} rows={:<8} skipped={}",
                tally.units, tally.rows_committed, tally.skipped
            )?;
        }
        write!(
            f,
            "  total rows={} skipped={}",
            self.rows_committed(),
            self.skipped()
        )
    }
}
