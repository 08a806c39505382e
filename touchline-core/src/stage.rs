//! Stage and resource identifiers shared by plans, checkpoints and providers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named step of a dataset pipeline.
///
/// Stages are persisted inside checkpoints using their `snake_case` names,
/// so renaming a variant is a breaking change for existing cursor files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Competition metadata for each season.
    LeagueInfo,
    /// Teams participating in a competition season.
    Teams,
    /// Transfer history for each discovered team.
    TeamTransfers,
    /// Season statistics for each discovered team.
    TeamStatistics,
    /// Current squad listing for each discovered team.
    TeamSquads,
    /// Fixtures played in a competition season.
    Fixtures,
    /// Match events for each discovered fixture.
    FixtureEvents,
    /// Starting line-ups for each discovered fixture.
    FixtureLineups,
    /// Team statistics for each discovered fixture.
    FixtureStatistics,
    /// Match prediction for each discovered fixture.
    FixturePredictions,
    /// Pre-match odds for each discovered fixture.
    FixtureOdds,
    /// Player statistics for each discovered fixture.
    FixturePlayers,
}

impl Stage {
    /// Return the persisted `snake_case` name.
    ///
    /// # Examples
    ///
    /// ```
    /// use touchline_core::Stage;
    ///
    /// assert_eq!(Stage::TeamTransfers.as_str(), "team_transfers");
    /// ```
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LeagueInfo => "league_info",
            Self::Teams => "teams",
            Self::TeamTransfers => "team_transfers",
            Self::TeamStatistics => "team_statistics",
            Self::TeamSquads => "team_squads",
            Self::Fixtures => "fixtures",
            Self::FixtureEvents => "fixture_events",
            Self::FixtureLineups => "fixture_lineups",
            Self::FixtureStatistics => "fixture_statistics",
            Self::FixturePredictions => "fixture_predictions",
            Self::FixtureOdds => "fixture_odds",
            Self::FixturePlayers => "fixture_players",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Provider resource addressed by a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `/leagues`
    Leagues,
    /// `/teams`
    Teams,
    /// `/transfers`
    Transfers,
    /// `/teams/statistics`
    TeamStatistics,
    /// `/players/squads`
    Squads,
    /// `/fixtures`
    Fixtures,
    /// `/fixtures/events`
    FixtureEvents,
    /// `/fixtures/lineups`
    FixtureLineups,
    /// `/fixtures/statistics`
    FixtureStatistics,
    /// `/predictions`
    Predictions,
    /// `/odds`
    Odds,
    /// `/fixtures/players`
    FixturePlayers,
}

impl ResourceKind {
    /// Path of the resource relative to the provider's base URL.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Leagues => "/leagues",
            Self::Teams => "/teams",
            Self::Transfers => "/transfers",
            Self::TeamStatistics => "/teams/statistics",
            Self::Squads => "/players/squads",
            Self::Fixtures => "/fixtures",
            Self::FixtureEvents => "/fixtures/events",
            Self::FixtureLineups => "/fixtures/lineups",
            Self::FixtureStatistics => "/fixtures/statistics",
            Self::Predictions => "/predictions",
            Self::Odds => "/odds",
            Self::FixturePlayers => "/fixtures/players",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Stage::LeagueInfo, "\"league_info\"")]
    #[case(Stage::FixtureStatistics, "\"fixture_statistics\"")]
    #[case(Stage::FixtureOdds, "\"fixture_odds\"")]
    fn stage_serialises_as_snake_case(#[case] stage: Stage, #[case] json: &str) {
        let encoded = serde_json::to_string(&stage).expect("encode stage");
        assert_eq!(encoded, json);
        assert_eq!(encoded.trim_matches('"'), stage.as_str());
    }

    #[rstest]
    #[case(ResourceKind::Predictions, "/predictions")]
    #[case(ResourceKind::Odds, "/odds")]
    #[case(ResourceKind::FixturePlayers, "/fixtures/players")]
    fn resources_display_their_path(#[case] resource: ResourceKind, #[case] path: &str) {
        assert_eq!(resource.to_string(), path);
    }

    #[rstest]
    fn unknown_stage_names_are_rejected() {
        let err = serde_json::from_str::<Stage>("\"team_info\"");
        assert!(err.is_err());
    }
}
