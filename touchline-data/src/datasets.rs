//! The API-Football datasets Touchline knows how to ingest.
//!
//! Each dataset is a fixed, ordered list of stages. Listing stages discover
//! the entities (teams or fixtures) that the per-entity stages after them
//! fetch one by one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use touchline_core::{
    CompetitionId, EntitySource, PipelinePlan, PlanError, ResourceKind, RowShape, Season, Stage,
    StageSpec, TableSpec,
};

/// A named, ordered group of stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// League metadata, teams and per-team transfers, statistics and squads.
    Football,
    /// Fixtures and per-fixture events, line-ups, statistics and players.
    Fixtures,
}

/// Raised when a dataset name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown dataset {name:?}; expected one of: football, fixtures")]
pub struct UnknownDataset {
    /// The rejected name.
    pub name: String,
}

const LEAGUE_INFO: StageSpec = StageSpec {
    stage: Stage::LeagueInfo,
    source: EntitySource::Listing {
        resource: ResourceKind::Leagues,
        competition_param: "id",
        id_path: &["league", "id"],
    },
    table: TableSpec {
        name: "raw_league",
        entity_column: None,
    },
    shape: RowShape::PerItem,
};

const TEAMS: StageSpec = StageSpec {
    stage: Stage::Teams,
    source: EntitySource::Listing {
        resource: ResourceKind::Teams,
        competition_param: "league",
        id_path: &["team", "id"],
    },
    table: TableSpec {
        name: "raw_teams_info",
        entity_column: Some("team_id"),
    },
    shape: RowShape::PerItem,
};

const fn per_team(
    stage: Stage,
    resource: ResourceKind,
    table: &'static str,
    scope_params: bool,
) -> StageSpec {
    StageSpec {
        stage,
        source: EntitySource::PerEntity {
            resource,
            discovered_by: Stage::Teams,
            id_param: "team",
            scope_params,
        },
        table: TableSpec {
            name: table,
            entity_column: Some("team_id"),
        },
        shape: RowShape::WholeResponse,
    }
}

const FIXTURES: StageSpec = StageSpec {
    stage: Stage::Fixtures,
    source: EntitySource::Listing {
        resource: ResourceKind::Fixtures,
        competition_param: "league",
        id_path: &["fixture", "id"],
    },
    table: TableSpec {
        name: "raw_fixture_info",
        entity_column: Some("fixture_id"),
    },
    shape: RowShape::PerItem,
};

const fn per_fixture(stage: Stage, resource: ResourceKind, table: &'static str) -> StageSpec {
    StageSpec {
        stage,
        source: EntitySource::PerEntity {
            resource,
            discovered_by: Stage::Fixtures,
            id_param: "fixture",
            scope_params: false,
        },
        table: TableSpec {
            name: table,
            entity_column: Some("fixture_id"),
        },
        shape: RowShape::WholeResponse,
    }
}

const FOOTBALL_STAGES: [StageSpec; 5] = [
    LEAGUE_INFO,
    TEAMS,
    per_team(
        Stage::TeamTransfers,
        ResourceKind::Transfers,
        "raw_teams_transfer",
        false,
    ),
    per_team(
        Stage::TeamStatistics,
        ResourceKind::TeamStatistics,
        "raw_teams_statistics",
        true,
    ),
    per_team(
        Stage::TeamSquads,
        ResourceKind::Squads,
        "raw_teams_squad",
        false,
    ),
];

const FIXTURE_STAGES: [StageSpec; 7] = [
    FIXTURES,
    per_fixture(
        Stage::FixtureEvents,
        ResourceKind::FixtureEvents,
        "raw_fixture_events",
    ),
    per_fixture(
        Stage::FixtureLineups,
        ResourceKind::FixtureLineups,
        "raw_fixture_lineups",
    ),
    per_fixture(
        Stage::FixtureStatistics,
        ResourceKind::FixtureStatistics,
        "raw_fixture_statistics",
    ),
    per_fixture(
        Stage::FixturePredictions,
        ResourceKind::Predictions,
        "raw_fixture_predictions",
    ),
    per_fixture(Stage::FixtureOdds, ResourceKind::Odds, "raw_fixture_odds"),
    per_fixture(
        Stage::FixturePlayers,
        ResourceKind::FixturePlayers,
        "raw_fixture_players",
    ),
];

impl Dataset {
    /// Every dataset, in documentation order.
    pub const ALL: [Self; 2] = [Self::Football, Self::Fixtures];

    /// Name used on the command line and inside checkpoint files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Football => "football",
            Self::Fixtures => "fixtures",
        }
    }

    /// Ordered stage definitions.
    #[must_use]
    pub const fn stages(self) -> &'static [StageSpec] {
        match self {
            Self::Football => &FOOTBALL_STAGES,
            Self::Fixtures => &FIXTURE_STAGES,
        }
    }

    /// Destination tables, in stage order.
    pub fn tables(self) -> impl Iterator<Item = &'static TableSpec> {
        self.stages().iter().map(|spec| &spec.table)
    }

    /// Build the plan for the given competitions and seasons.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::EmptyDimension`] when either list is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use touchline_core::{CompetitionId, Season, Stage};
    /// use touchline_data::Dataset;
    ///
    /// let plan = Dataset::Football
    ///     .plan(vec![CompetitionId(39)], vec![Season(2023), Season(2024)])
    ///     .expect("valid plan");
    /// assert_eq!(plan.origin().stage, Stage::LeagueInfo);
    /// ```
    pub fn plan(
        self,
        competitions: Vec<CompetitionId>,
        seasons: Vec<Season>,
    ) -> Result<PipelinePlan, PlanError> {
        PipelinePlan::new(self.name(), competitions, seasons, self.stages().to_vec())
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dataset {
    type Err = UnknownDataset;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|dataset| dataset.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| UnknownDataset {
                name: name.to_owned(),
            })
    }
}
