//! Tests for the driver's commit, skip and resume behaviour.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use rstest::rstest;
use serde_json::json;

use super::*;
use crate::test_support::{
    ManualClock, MemoryCheckpointStore, MemorySink, ScriptedProvider, teams_listing, teams_plan,
    teams_spec,
};
use crate::{
    Checkpoint, Clock, CompetitionId, RateLimit, RateLimiter, RowKeys, Season, Stage,
};

const TEAMS: &str = "/teams?league=39&season=2024";

fn single_stage_plan() -> PipelinePlan {
    PipelinePlan::new(
        "football",
        vec![CompetitionId(39)],
        vec![Season(2024)],
        vec![teams_spec()],
    )
    .unwrap_or_else(|err| panic!("invalid plan: {err}"))
}

fn stats_request(team: i64) -> String {
    format!("/teams/statistics?league=39&season=2024&team={team}")
}

fn provider_for(ids: &[i64]) -> ScriptedProvider {
    ids.iter().fold(
        ScriptedProvider::default().respond(TEAMS, teams_listing(ids)),
        |provider, id| {
            provider.respond(
                &stats_request(*id),
                json!({"errors": [], "response": {"team": {"id": id}}}),
            )
        },
    )
}

fn size(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or_else(|| panic!("batch size must be positive"))
}

fn at(stage: Stage, entity_index: usize) -> Checkpoint {
    Checkpoint {
        entity_index,
        ..Checkpoint::origin(stage)
    }
}

fn committed_keys(sink: &MemorySink) -> Vec<(String, RowKeys)> {
    sink.rows()
        .iter()
        .map(|(table, row)| (table.clone(), *row.keys()))
        .collect()
}

#[rstest]
fn listing_stage_commits_one_row_per_entity() {
    let plan = single_stage_plan();
    let provider = provider_for(&[33, 34]);
    let mut sink = MemorySink::default();
    let mut store = MemoryCheckpointStore::default();

    let summary = PipelineDriver::new(&plan, &provider, &mut sink, &mut store)
        .run()
        .unwrap_or_else(|err| panic!("run failed: {err}"));

    assert_eq!(sink.rows_in("raw_teams_info").len(), 2);
    assert_eq!(store.current(), Some(at(Stage::Teams, 2)));
    assert_eq!(summary.ended_at(), at(Stage::Teams, 2));
    assert_eq!(
        summary.stage(Stage::Teams),
        Some(StageTally {
            units: 2,
            rows_committed: 2,
            skipped: 0
        })
    );

    let rerun = PipelineDriver::new(&plan, &provider, &mut sink, &mut store)
        .run()
        .unwrap_or_else(|err| panic!("rerun failed: {err}"));
    assert_eq!(rerun.stage(Stage::Teams).map(|tally| tally.units), Some(0));
    assert_eq!(sink.rows().len(), 2);
    assert_eq!(store.current(), Some(at(Stage::Teams, 2)));
}

#[rstest]
fn resume_after_listing_moves_straight_to_next_stage() {
    let plan = teams_plan(&[39], &[2024]);
    let provider = provider_for(&[33, 34]);
    let mut sink = MemorySink::default();
    let mut store = MemoryCheckpointStore::with_checkpoint(at(Stage::Teams, 2));

    let summary = PipelineDriver::new(&plan, &provider, &mut sink, &mut store)
        .run()
        .unwrap_or_else(|err| panic!("run failed: {err}"));

    assert!(sink.rows_in("raw_teams_info").is_empty());
    assert_eq!(sink.rows_in("raw_teams_statistics").len(), 2);
    assert_eq!(summary.stage(Stage::Teams).map(|tally| tally.units), Some(0));
    assert_eq!(
        provider.calls(),
        vec![TEAMS.to_owned(), stats_request(33), stats_request(34)]
    );
    assert_eq!(store.current(), Some(at(Stage::TeamStatistics, 2)));
}

#[rstest]
#[case(2, vec![at(Stage::Teams, 2), at(Stage::Teams, 3)])]
#[case(3, vec![at(Stage::Teams, 3)])]
#[case(4, vec![at(Stage::Teams, 3)])]
fn flushes_at_threshold_and_scope_end(#[case] batch: usize, #[case] saves: Vec<Checkpoint>) {
    let plan = single_stage_plan();
    let provider = provider_for(&[1, 2, 3]);
    let mut sink = MemorySink::default();
    let mut store = MemoryCheckpointStore::default();

    PipelineDriver::new(&plan, &provider, &mut sink, &mut store)
        .with_batch_size(size(batch))
        .run()
        .unwrap_or_else(|err| panic!("run failed: {err}"));

    assert_eq!(sink.commits(), saves.len());
    assert_eq!(store.saves(), saves.as_slice());
}

#[rstest]
fn sink_failure_keeps_checkpoint_and_resume_reprocesses_only_unflushed_units() {
    let plan = single_stage_plan();
    let provider = provider_for(&[1, 2, 3, 4]);
    let mut sink = MemorySink::failing_after(1);
    let mut store = MemoryCheckpointStore::default();

    let err = PipelineDriver::new(&plan, &provider, &mut sink, &mut store)
        .with_batch_size(size(2))
        .run()
        .err()
        .unwrap_or_else(|| panic!("second flush must fail"));
    assert!(matches!(err, DriverError::Sink(_)));
    assert_eq!(store.current(), Some(at(Stage::Teams, 2)));
    assert_eq!(sink.rows().len(), 2);

    sink.recover();
    let summary = PipelineDriver::new(&plan, &provider, &mut sink, &mut store)
        .with_batch_size(size(2))
        .run()
        .unwrap_or_else(|err| panic!("resume failed: {err}"));

    assert_eq!(summary.started_from(), at(Stage::Teams, 2));
    assert_eq!(summary.stage(Stage::Teams).map(|tally| tally.units), Some(2));
    let ids: Vec<Option<i64>> = sink.rows().iter().map(|(_, row)| row.keys().entity).collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3), Some(4)]);
}

#[rstest]
fn provider_errors_skip_the_unit_and_advance() {
    let plan = teams_plan(&[39], &[2024]);
    let provider = ScriptedProvider::default()
        .respond(TEAMS, teams_listing(&[33, 34]))
        .respond(
            &stats_request(33),
            json!({"errors": {"requests": "daily limit reached"}, "response": []}),
        )
        .respond(
            &stats_request(34),
            json!({"errors": [], "response": {"team": {"id": 34}}}),
        );
    let mut sink = MemorySink::default();
    let mut store = MemoryCheckpointStore::default();

    let summary = PipelineDriver::new(&plan, &provider, &mut sink, &mut store)
        .run()
        .unwrap_or_else(|err| panic!("run failed: {err}"));

    assert_eq!(
        summary.stage(Stage::TeamStatistics),
        Some(StageTally {
            units: 2,
            rows_committed: 1,
            skipped: 1
        })
    );
    assert_eq!(store.current(), Some(at(Stage::TeamStatistics, 2)));
}

#[rstest]
fn transport_failures_are_skipped_and_progress_still_saved() {
    let plan = teams_plan(&[39], &[2024]);
    let timeout = FetchError::Timeout {
        url: stats_request(33),
        timeout_secs: 30,
    };
    let provider = ScriptedProvider::default()
        .respond(TEAMS, teams_listing(&[33]))
        .fail(&stats_request(33), timeout);
    let mut sink = MemorySink::default();
    let mut store = MemoryCheckpointStore::default();

    let summary = PipelineDriver::new(&plan, &provider, &mut sink, &mut store)
        .run()
        .unwrap_or_else(|err| panic!("run failed: {err}"));

    assert_eq!(summary.skipped(), 1);
    assert!(sink.rows_in("raw_teams_statistics").is_empty());
    assert_eq!(store.current(), Some(at(Stage::TeamStatistics, 1)));
}

#[rstest]
fn failed_listing_is_counted_once_and_empties_dependent_stages() {
    let plan = teams_plan(&[39], &[2024]);
    let provider = ScriptedProvider::default().respond(
        TEAMS,
        json!({"errors": {"token": "invalid key"}, "response": []}),
    );
    let mut sink = MemorySink::default();
    let mut store = MemoryCheckpointStore::default();

    let summary = PipelineDriver::new(&plan, &provider, &mut sink, &mut store)
        .run()
        .unwrap_or_else(|err| panic!("run failed: {err}"));

    assert_eq!(summary.stage(Stage::Teams).map(|tally| tally.skipped), Some(1));
    assert_eq!(summary.rows_committed(), 0);
    assert_eq!(provider.calls(), vec![TEAMS.to_owned()]);
    assert_eq!(store.current(), None);
}

#[rstest]
fn paginated_listing_records_the_page() {
    let plan = single_stage_plan();
    let provider = ScriptedProvider::default()
        .respond(
            TEAMS,
            json!({
                "errors": [],
                "paging": {"current": 1, "total": 2},
                "response": [{"team": {"id": 1}}, {"team": {"id": 2}}]
            }),
        )
        .respond(
            &format!("{TEAMS}&page=2"),
            json!({
                "errors": [],
                "paging": {"current": 2, "total": 2},
                "response": [{"team": {"id": 3}}, {"team": {"name": "no id"}}]
            }),
        );
    let mut sink = MemorySink::default();
    let mut store = MemoryCheckpointStore::default();

    PipelineDriver::new(&plan, &provider, &mut sink, &mut store)
        .run()
        .unwrap_or_else(|err| panic!("run failed: {err}"));

    assert_eq!(sink.rows().len(), 3);
    assert_eq!(
        store.current(),
        Some(Checkpoint {
            page: Some(2),
            ..at(Stage::Teams, 3)
        })
    );
}

#[rstest]
fn every_fetch_waits_for_the_limiter() {
    let plan = teams_plan(&[39], &[2024]);
    let provider = provider_for(&[33, 34]);
    let clock = Arc::new(ManualClock::default());
    let limit = RateLimit::new(2, Duration::from_secs(10))
        .unwrap_or_else(|err| panic!("invalid limit: {err}"));
    let limits = RateLimiters::unlimited().with_tier(RateLimiter::new(
        "burst",
        limit,
        Arc::clone(&clock) as Arc<dyn Clock>,
    ));
    let mut sink = MemorySink::default();
    let mut store = MemoryCheckpointStore::default();

    PipelineDriver::new(&plan, &provider, &mut sink, &mut store)
        .with_limits(limits)
        .run()
        .unwrap_or_else(|err| panic!("run failed: {err}"));

    // One listing call and two statistics calls against two tokens.
    assert_eq!(provider.calls().len(), 3);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
}

#[rstest]
fn rejects_checkpoint_from_another_plan() {
    let plan = single_stage_plan();
    let provider = provider_for(&[1]);
    let mut sink = MemorySink::default();
    let mut store = MemoryCheckpointStore::with_checkpoint(at(Stage::Fixtures, 0));

    let err = PipelineDriver::new(&plan, &provider, &mut sink, &mut store)
        .run()
        .err()
        .unwrap_or_else(|| panic!("foreign checkpoint must be rejected"));
    assert!(matches!(err, DriverError::Plan(PlanError::UnknownStage { .. })));
    assert!(provider.calls().is_empty());
}

#[rstest]
fn summary_lists_stages_in_plan_order() {
    let plan = teams_plan(&[39], &[2024]);
    let provider = provider_for(&[33]);
    let summary = PipelineDriver::new(
        &plan,
        &provider,
        MemorySink::default(),
        MemoryCheckpointStore::default(),
    )
    .run()
    .unwrap_or_else(|err| panic!("run failed: {err}"));

    let stages: Vec<Stage> = summary.stages().iter().map(|(stage, _)| *stage).collect();
    assert_eq!(stages, vec![Stage::Teams, Stage::TeamStatistics]);
    let rendered = summary.to_string();
    assert!(rendered.contains("team_statistics"));
    assert!(rendered.contains("total rows=2 skipped=0"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A run interrupted by a failing commit and then resumed commits the
    /// same rows as an uninterrupted run, each exactly once.
    #[test]
    fn interrupted_runs_commit_the_same_rows(
        teams in 1_usize..6,
        batch in 1_usize..4,
        failing_commit in 0_usize..6,
    ) {
        let ids: Vec<i64> = (1..=teams).map(|id| id as i64).collect();
        let plan = teams_plan(&[39], &[2024]);
        let provider = provider_for(&ids);

        let mut reference = MemorySink::default();
        PipelineDriver::new(&plan, &provider, &mut reference, MemoryCheckpointStore::default())
            .with_batch_size(size(batch))
            .run()
            .unwrap_or_else(|err| panic!("reference run failed: {err}"));

        let mut sink = MemorySink::failing_after(failing_commit);
        let mut store = MemoryCheckpointStore::default();
        let first = PipelineDriver::new(&plan, &provider, &mut sink, &mut store)
            .with_batch_size(size(batch))
            .run();
        if first.is_err() {
            sink.recover();
            PipelineDriver::new(&plan, &provider, &mut sink, &mut store)
                .with_batch_size(size(batch))
                .run()
                .unwrap_or_else(|err| panic!("resumed run failed: {err}"));
        }

        prop_assert_eq!(committed_keys(&sink), committed_keys(&reference));
    }
}
