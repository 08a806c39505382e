//! Behavioural coverage for resuming a run after a failed commit.

use std::cell::RefCell;
use std::num::NonZeroUsize;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use touchline_core::test_support::{
    MemoryCheckpointStore, MemorySink, ScriptedProvider, teams_listing, teams_spec,
};
use touchline_core::{
    Checkpoint, CompetitionId, DriverError, PipelineDriver, PipelinePlan, RunSummary, Season,
    Stage,
};

const TEAMS: &str = "/teams?league=39&season=2024";

struct ResumeWorld {
    plan: PipelinePlan,
    provider: RefCell<ScriptedProvider>,
    sink: RefCell<MemorySink>,
    store: RefCell<MemoryCheckpointStore>,
    outcome: RefCell<Option<Result<RunSummary, DriverError>>>,
}

impl ResumeWorld {
    fn new() -> Self {
        let plan = PipelinePlan::new(
            "football",
            vec![CompetitionId(39)],
            vec![Season(2024)],
            vec![teams_spec()],
        )
        .expect("valid plan");
        Self {
            plan,
            provider: RefCell::new(ScriptedProvider::default()),
            sink: RefCell::new(MemorySink::default()),
            store: RefCell::new(MemoryCheckpointStore::default()),
            outcome: RefCell::new(None),
        }
    }

    fn run(&self) {
        let provider = self.provider.borrow();
        let mut sink = self.sink.borrow_mut();
        let mut store = self.store.borrow_mut();
        let batch = NonZeroUsize::new(2).expect("non-zero batch size");
        let outcome = PipelineDriver::new(&self.plan, &*provider, &mut *sink, &mut *store)
            .with_batch_size(batch)
            .run();
        self.outcome.replace(Some(outcome));
    }
}

#[fixture]
fn resume_world() -> ResumeWorld {
    ResumeWorld::new()
}

#[given("a provider listing four teams for league 39 in 2024")]
fn four_teams(#[from(resume_world)] world: &ResumeWorld) {
    world
        .provider
        .replace(ScriptedProvider::default().respond(TEAMS, teams_listing(&[33, 34, 35, 36])));
}

#[given("a warehouse that rejects the second batch")]
fn rejecting_warehouse(#[from(resume_world)] world: &ResumeWorld) {
    world.sink.replace(MemorySink::failing_after(1));
}

#[given("a healthy warehouse")]
fn healthy_warehouse(#[from(resume_world)] world: &ResumeWorld) {
    world.sink.replace(MemorySink::default());
}

#[when("the pipeline runs with batches of two rows")]
fn run_pipeline(#[from(resume_world)] world: &ResumeWorld) {
    world.run();
}

#[when("the pipeline runs again")]
fn run_again(#[from(resume_world)] world: &ResumeWorld) {
    world.run();
}

#[when("the warehouse recovers and the pipeline runs again")]
fn recover_and_run(#[from(resume_world)] world: &ResumeWorld) {
    world.sink.borrow_mut().recover();
    world.run();
}

#[then("the run stops with a sink error")]
fn stops_with_sink_error(#[from(resume_world)] world: &ResumeWorld) {
    let outcome = world.outcome.borrow();
    let result = outcome.as_ref().expect("pipeline should have run");
    assert!(matches!(result, Err(DriverError::Sink(_))));
}

#[then("the checkpoint points past the first batch")]
fn checkpoint_after_first_batch(#[from(resume_world)] world: &ResumeWorld) {
    let expected = Checkpoint {
        entity_index: 2,
        ..Checkpoint::origin(Stage::Teams)
    };
    assert_eq!(world.store.borrow().current(), Some(expected));
}

#[then("every team is committed exactly once")]
fn committed_once(#[from(resume_world)] world: &ResumeWorld) {
    let sink = world.sink.borrow();
    let ids: Vec<Option<i64>> = sink
        .rows()
        .iter()
        .map(|(_, row)| row.keys().entity)
        .collect();
    assert_eq!(ids, vec![Some(33), Some(34), Some(35), Some(36)]);
}

#[then("the last run processes no units")]
fn no_units(#[from(resume_world)] world: &ResumeWorld) {
    let outcome = world.outcome.borrow();
    let summary = outcome
        .as_ref()
        .expect("pipeline should have run")
        .as_ref()
        .expect("pipeline should succeed");
    assert_eq!(summary.stage(Stage::Teams).map(|tally| tally.units), Some(0));
    assert_eq!(summary.rows_committed(), 0);
}

#[scenario(
    path = "tests/features/resume.feature",
    name = "a failed commit is resumed from the last committed checkpoint"
)]
fn resume_after_failed_commit(#[from(resume_world)] world: ResumeWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/resume.feature",
    name = "a completed season produces no further work"
)]
fn completed_season_is_idle(#[from(resume_world)] world: ResumeWorld) {
    let _ = world;
}
