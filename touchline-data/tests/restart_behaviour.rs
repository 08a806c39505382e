//! Behavioural coverage for resuming from files left by a previous process.

use std::cell::RefCell;
use std::num::NonZeroUsize;

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;
use touchline_core::test_support::{ScriptedProvider, teams_listing, teams_spec};
use touchline_core::{
    Checkpoint, CheckpointStore, CompetitionId, PipelineDriver, PipelinePlan, Season, Stage,
};
use touchline_data::{FileCheckpointStore, SqliteSink};

const TEAMS: &str = "/teams?league=39&season=2024";

struct RestartWorld {
    _dir: TempDir,
    database: Utf8PathBuf,
    checkpoint: Utf8PathBuf,
    plan: PipelinePlan,
    provider: RefCell<ScriptedProvider>,
}

impl RestartWorld {
    fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        let plan = PipelinePlan::new(
            "football",
            vec![CompetitionId(39)],
            vec![Season(2024)],
            vec![teams_spec()],
        )
        .expect("valid plan");
        Self {
            database: root.join("raw.sqlite"),
            checkpoint: root.join("checkpoints/football.json"),
            _dir: dir,
            plan,
            provider: RefCell::new(ScriptedProvider::default()),
        }
    }

    fn store(&self) -> FileCheckpointStore {
        FileCheckpointStore::new(self.checkpoint.clone(), "football")
    }

    fn committed_teams(&self) -> Vec<i64> {
        let sink = SqliteSink::open(&self.database).expect("open warehouse");
        let mut statement = sink
            .connection()
            .prepare("SELECT team_id FROM raw_teams_info ORDER BY id")
            .expect("prepare query");
        statement
            .query_map([], |row| row.get(0))
            .expect("query teams")
            .collect::<Result<Vec<i64>, _>>()
            .expect("read teams")
    }
}

#[fixture]
fn restart_world() -> RestartWorld {
    RestartWorld::new()
}

#[given("a provider listing four teams for league 39 in 2024")]
fn four_teams(#[from(restart_world)] world: &RestartWorld) {
    world
        .provider
        .replace(ScriptedProvider::default().respond(TEAMS, teams_listing(&[33, 34, 35, 36])));
}

#[given("a checkpoint file recording the first two teams as committed")]
fn checkpoint_after_two(#[from(restart_world)] world: &RestartWorld) {
    world
        .store()
        .save(&Checkpoint {
            entity_index: 2,
            ..Checkpoint::origin(Stage::Teams)
        })
        .expect("save checkpoint");
}

#[when("the pipeline runs into the SQLite warehouse with batches of two rows")]
fn run_pipeline(#[from(restart_world)] world: &RestartWorld) {
    let provider = world.provider.borrow();
    let sink = SqliteSink::open(&world.database).expect("open warehouse");
    let batch = NonZeroUsize::new(2).expect("non-zero batch size");
    PipelineDriver::new(&world.plan, &*provider, sink, world.store())
        .with_batch_size(batch)
        .run()
        .expect("run completes");
}

#[then("the warehouse holds teams 35 and 36 only")]
fn holds_second_half(#[from(restart_world)] world: &RestartWorld) {
    assert_eq!(world.committed_teams(), vec![35, 36]);
}

#[then("the warehouse holds all four teams")]
fn holds_all(#[from(restart_world)] world: &RestartWorld) {
    assert_eq!(world.committed_teams(), vec![33, 34, 35, 36]);
}

#[then("the checkpoint file points past the last team")]
fn checkpoint_past_last(#[from(restart_world)] world: &RestartWorld) {
    let expected = Checkpoint {
        entity_index: 4,
        ..Checkpoint::origin(Stage::Teams)
    };
    assert_eq!(world.store().load().expect("load checkpoint"), Some(expected));
}

#[scenario(
    path = "tests/features/restart.feature",
    name = "a restarted process continues from the checkpoint file"
)]
fn restart_from_checkpoint_file(#[from(restart_world)] world: RestartWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/restart.feature",
    name = "a fresh process starts from the origin"
)]
fn fresh_process(#[from(restart_world)] world: RestartWorld) {
    let _ = world;
}
