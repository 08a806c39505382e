//! Static description of what a dataset run enumerates.
//!
//! A [`PipelinePlan`] fixes the outer dimensions (competitions and seasons)
//! and the ordered list of stages applied to each pair. Each [`StageSpec`]
//! says where its entities come from, which table receives its rows and how
//! responses are turned into rows.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::FetchRequest;
use crate::{Checkpoint, ResourceKind, Stage};

/// Provider identifier of a competition (league or cup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompetitionId(pub u32);

impl fmt::Display for CompetitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Starting year of a season, as the provider keys it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Season(pub u16);

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a stage's entities come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitySource {
    /// Entities are the items of a (possibly paginated) listing for the
    /// competition and season. Each item becomes one work unit and its row
    /// is built from the listing itself.
    Listing {
        /// Listing resource.
        resource: ResourceKind,
        /// Query parameter carrying the competition identifier.
        competition_param: &'static str,
        /// Path to each item's identifier.
        id_path: &'static [&'static str],
    },
    /// Entities are discovered by an earlier listing stage and each one is
    /// fetched individually.
    PerEntity {
        /// Resource fetched for every entity.
        resource: ResourceKind,
        /// Listing stage that discovers the entities.
        discovered_by: Stage,
        /// Query parameter carrying the entity identifier.
        id_param: &'static str,
        /// Whether the competition and season are sent as well.
        scope_params: bool,
    },
}

/// Destination table of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name.
    pub name: &'static str,
    /// Column holding the entity identifier, if the table keys on one.
    pub entity_column: Option<&'static str>,
}

/// How a fetched response maps onto rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowShape {
    /// One row per item in `response`.
    PerItem,
    /// One row holding the whole `response` payload.
    WholeResponse,
}

/// One stage of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    /// Stage identifier.
    pub stage: Stage,
    /// Entity discovery strategy.
    pub source: EntitySource,
    /// Destination table.
    pub table: TableSpec,
    /// Response-to-row mapping.
    pub shape: RowShape,
}

impl StageSpec {
    /// Request for one page of this stage's listing.
    ///
    /// Returns `None` for per-entity stages. The `page` parameter is only
    /// sent for pages after the first.
    #[must_use]
    pub fn listing_request(
        &self,
        competition: CompetitionId,
        season: Season,
        page: u32,
    ) -> Option<FetchRequest> {
        let EntitySource::Listing {
            resource,
            competition_param,
            ..
        } = self.source
        else {
            return None;
        };
        let mut request = FetchRequest::new(resource)
            .with_param(competition_param, competition.to_string())
            .with_param("season", season.to_string());
        if page > 1 {
            request = request.with_param("page", page.to_string());
        }
        Some(request)
    }

    /// Request fetching a single discovered entity.
    ///
    /// Returns `None` for listing stages.
    #[must_use]
    pub fn entity_request(
        &self,
        competition: CompetitionId,
        season: Season,
        entity: i64,
    ) -> Option<FetchRequest> {
        let EntitySource::PerEntity {
            resource,
            id_param,
            scope_params,
            ..
        } = self.source
        else {
            return None;
        };
        let mut request = FetchRequest::new(resource);
        if scope_params {
            request = request
                .with_param("league", competition.to_string())
                .with_param("season", season.to_string());
        }
        Some(request.with_param(id_param, entity.to_string()))
    }

    /// Identifier path for listing stages.
    #[must_use]
    pub const fn id_path(&self) -> Option<&'static [&'static str]> {
        match self.source {
            EntitySource::Listing { id_path, .. } => Some(id_path),
            EntitySource::PerEntity { .. } => None,
        }
    }
}

/// Validation failures for plans and the checkpoints run against them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A dimension has no values.
    #[error("pipeline plan {plan} has no {dimension}")]
    EmptyDimension {
        /// Plan name.
        plan: String,
        /// Which dimension is empty.
        dimension: &'static str,
    },
    /// A stage appears more than once.
    #[error("pipeline plan {plan} lists stage {stage} more than once")]
    DuplicateStage {
        /// Plan name.
        plan: String,
        /// Repeated stage.
        stage: Stage,
    },
    /// A per-entity stage depends on a stage that is not an earlier listing.
    #[error("stage {stage} expects entities from {discovered_by}, which is not an earlier listing stage")]
    UndiscoveredEntities {
        /// Dependent stage.
        stage: Stage,
        /// Stage it depends on.
        discovered_by: Stage,
    },
    /// A checkpoint names a stage the plan does not contain.
    #[error("pipeline plan {plan} has no stage {stage}")]
    UnknownStage {
        /// Plan name.
        plan: String,
        /// Missing stage.
        stage: Stage,
    },
    /// A checkpoint index lies outside the plan's dimensions.
    #[error("{dimension} index {index} is out of range for {len} configured values")]
    OutOfRange {
        /// Which dimension overflowed.
        dimension: &'static str,
        /// Offending index.
        index: usize,
        /// Number of configured values.
        len: usize,
    },
}

/// Outer dimensions and stage list for one dataset.
///
/// # Examples
///
/// ```
/// use touchline_core::{
///     CompetitionId, EntitySource, PipelinePlan, ResourceKind, RowShape, Season, Stage,
///     StageSpec, TableSpec,
/// };
///
/// let teams = StageSpec {
///     stage: Stage::Teams,
///     source: EntitySource::Listing {
///         resource: ResourceKind::Teams,
///         competition_param: "league",
///         id_path: &["team", "id"],
///     },
///     table: TableSpec { name: "raw_teams_info", entity_column: Some("team_id") },
///     shape: RowShape::PerItem,
/// };
/// let plan = PipelinePlan::new("football", vec![CompetitionId(39)], vec![Season(2024)], vec![teams])
///     .expect("valid plan");
/// assert_eq!(plan.origin().stage, Stage::Teams);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    name: String,
    competitions: Vec<CompetitionId>,
    seasons: Vec<Season>,
    stages: Vec<StageSpec>,
}

impl PipelinePlan {
    /// Validate and build a plan.
    ///
    /// # Errors
    ///
    /// Rejects empty dimensions, repeated stages and per-entity stages whose
    /// discovering stage is not an earlier listing.
    pub fn new(
        name: impl Into<String>,
        competitions: Vec<CompetitionId>,
        seasons: Vec<Season>,
        stages: Vec<StageSpec>,
    ) -> Result<Self, PlanError> {
        let name = name.into();
        let empty = |dimension| PlanError::EmptyDimension {
            plan: name.clone(),
            dimension,
        };
        if competitions.is_empty() {
            return Err(empty("competitions"));
        }
        if seasons.is_empty() {
            return Err(empty("seasons"));
        }
        if stages.is_empty() {
            return Err(empty("stages"));
        }

        let mut listings = HashSet::new();
        let mut seen = HashSet::new();
        for spec in &stages {
            if !seen.insert(spec.stage) {
                return Err(PlanError::DuplicateStage {
                    plan: name,
                    stage: spec.stage,
                });
            }
            match spec.source {
                EntitySource::Listing { .. } => {
                    listings.insert(spec.stage);
                }
                EntitySource::PerEntity { discovered_by, .. } => {
                    if !listings.contains(&discovered_by) {
                        return Err(PlanError::UndiscoveredEntities {
                            stage: spec.stage,
                            discovered_by,
                        });
                    }
                }
            }
        }

        Ok(Self {
            name,
            competitions,
            seasons,
            stages,
        })
    }

    /// Dataset name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured competitions in enumeration order.
    #[must_use]
    pub fn competitions(&self) -> &[CompetitionId] {
        &self.competitions
    }

    /// Configured seasons in enumeration order.
    #[must_use]
    pub fn seasons(&self) -> &[Season] {
        &self.seasons
    }

    /// Stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Checkpoint at the very start of this plan.
    #[must_use]
    pub fn origin(&self) -> Checkpoint {
        // `new` rejects empty stage lists.
        let first = self
            .stages
            .first()
            .map_or(Stage::LeagueInfo, |spec| spec.stage);
        Checkpoint::origin(first)
    }

    /// Position of `stage` in the stage list.
    #[must_use]
    pub fn stage_position(&self, stage: Stage) -> Option<usize> {
        self.stages.iter().position(|spec| spec.stage == stage)
    }

    /// Specification of `stage`.
    #[must_use]
    pub fn stage_spec(&self, stage: Stage) -> Option<&StageSpec> {
        self.stages.iter().find(|spec| spec.stage == stage)
    }

    /// Check that `checkpoint` addresses a position inside this plan.
    ///
    /// A competition index equal to the number of competitions is accepted
    /// as the terminal position.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::UnknownStage`] or [`PlanError::OutOfRange`].
    pub fn validate_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), PlanError> {
        if self.stage_position(checkpoint.stage).is_none() {
            return Err(PlanError::UnknownStage {
                plan: self.name.clone(),
                stage: checkpoint.stage,
            });
        }
        if checkpoint.competition_index > self.competitions.len() {
            return Err(PlanError::OutOfRange {
                dimension: "competition",
                index: checkpoint.competition_index,
                len: self.competitions.len(),
            });
        }
        if checkpoint.season_index >= self.seasons.len() {
            return Err(PlanError::OutOfRange {
                dimension: "season",
                index: checkpoint.season_index,
                len: self.seasons.len(),
            });
        }
        Ok(())
    }
}
