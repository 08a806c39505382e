//! In-memory collaborators used by unit and behaviour tests.
//!
//! Nothing here touches the network or the filesystem; every double records
//! what it was asked to do so tests can assert on it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};

use crate::enumerate::{Entity, EntityDirectory, Scope, WorkUnit};
use crate::{
    Batch, Checkpoint, CheckpointError, CheckpointStore, CompetitionId, Document, EntitySource,
    FetchError, FetchRequest, PipelinePlan, Provider, RateLimiters, ResourceKind, Row, RowShape,
    Season, Sink, SinkError, Stage, StageSpec, TableSpec,
};

/// Clock that only moves when told to.
///
/// Sleeping advances the clock by the requested amount and records the
/// duration.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    /// Move time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.saturating_add(by);
    }

    /// Every sleep requested so far.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl crate::Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        self.advance(duration);
    }
}

/// Checkpoint store holding its value in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryCheckpointStore {
    current: Option<Checkpoint>,
    saves: Vec<Checkpoint>,
    fail_saves: bool,
}

impl MemoryCheckpointStore {
    /// Store that starts with `checkpoint` already saved.
    #[must_use]
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        Self {
            current: Some(checkpoint),
            ..Self::default()
        }
    }

    /// Currently stored checkpoint.
    #[must_use]
    pub const fn current(&self) -> Option<Checkpoint> {
        self.current
    }

    /// Every successful save in order.
    #[must_use]
    pub fn saves(&self) -> &[Checkpoint] {
        &self.saves
    }

    /// Make subsequent saves fail.
    pub const fn fail_saves(&mut self, fail: bool) {
        self.fail_saves = fail;
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.current)
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        if self.fail_saves {
            return Err(CheckpointError::Write {
                location: "memory".to_owned(),
                source: std::io::Error::other("injected checkpoint failure"),
            });
        }
        self.current = Some(*checkpoint);
        self.saves.push(*checkpoint);
        Ok(())
    }
}

/// Sink keeping committed rows per table.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    committed: Vec<(String, Row)>,
    commits: usize,
    fail_after: Option<usize>,
}

impl MemorySink {
    /// Sink that accepts `commits` batches and then rejects every other one.
    #[must_use]
    pub fn failing_after(commits: usize) -> Self {
        Self {
            fail_after: Some(commits),
            ..Self::default()
        }
    }

    /// Accept every batch from now on.
    pub const fn recover(&mut self) {
        self.fail_after = None;
    }

    /// Number of successful commits.
    #[must_use]
    pub const fn commits(&self) -> usize {
        self.commits
    }

    /// All committed rows as `(table, row)` pairs in commit order.
    #[must_use]
    pub fn rows(&self) -> &[(String, Row)] {
        &self.committed
    }

    /// Committed rows for `table`.
    #[must_use]
    pub fn rows_in(&self, table: &str) -> Vec<&Row> {
        self.committed
            .iter()
            .filter(|(name, _)| name == table)
            .map(|(_, row)| row)
            .collect()
    }
}

impl Sink for MemorySink {
    fn insert_batch(&mut self, batch: &Batch<'_>) -> Result<(), SinkError> {
        if self.fail_after.is_some_and(|limit| self.commits >= limit) {
            return Err(SinkError::new(batch, "injected sink failure"));
        }
        self.committed.extend(
            batch
                .rows
                .iter()
                .map(|row| (batch.table.name.to_owned(), row.clone())),
        );
        self.commits += 1;
        Ok(())
    }
}

/// Provider answering from a table of canned responses.
///
/// Responses are keyed by the request's display form, for example
/// `/teams?league=39&season=2024`. Unscripted requests fail with HTTP 404.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    responses: HashMap<String, Result<Document, FetchError>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedProvider {
    /// Script a successful response.
    #[must_use]
    pub fn respond(mut self, request: &str, body: Value) -> Self {
        self.responses
            .insert(request.to_owned(), Ok(Document::new(body)));
        self
    }

    /// Script a transport failure.
    #[must_use]
    pub fn fail(mut self, request: &str, error: FetchError) -> Self {
        self.responses.insert(request.to_owned(), Err(error));
        self
    }

    /// Requests issued so far.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }
}

impl Provider for ScriptedProvider {
    fn fetch(&self, request: &FetchRequest, _limits: &RateLimiters) -> Result<Document, FetchError> {
        let key = request.to_string();
        self.calls.borrow_mut().push(key.clone());
        self.responses.get(&key).cloned().unwrap_or_else(|| {
            Err(FetchError::Http {
                url: key,
                status: 404,
                message: "no scripted response".to_owned(),
            })
        })
    }
}

/// Directory returning a fixed number of entities for every scope.
#[derive(Debug, Clone)]
pub struct FixedDirectory {
    counts: HashMap<(usize, usize, Stage), usize>,
    default_count: usize,
    lookups: Vec<Scope>,
}

impl FixedDirectory {
    /// Every scope has `count` entities.
    #[must_use]
    pub fn uniform(count: usize) -> Self {
        Self {
            counts: HashMap::new(),
            default_count: count,
            lookups: Vec::new(),
        }
    }

    /// Override the entity count of one scope.
    #[must_use]
    pub fn with_count(mut self, scope: Scope, count: usize) -> Self {
        self.counts.insert(
            (scope.competition_index, scope.season_index, scope.stage),
            count,
        );
        self
    }

    /// Scopes resolved so far.
    #[must_use]
    pub fn lookups(&self) -> &[Scope] {
        &self.lookups
    }
}

impl EntityDirectory for FixedDirectory {
    fn entities(&mut self, _plan: &PipelinePlan, scope: Scope) -> Vec<Entity> {
        self.lookups.push(scope);
        let count = self
            .counts
            .get(&(scope.competition_index, scope.season_index, scope.stage))
            .copied()
            .unwrap_or(self.default_count);
        (0..count)
            .map(|index| Entity {
                id: i64::try_from(index).ok().map(|id| id + 1),
                page: None,
                item: Some(json!({ "index": index })),
            })
            .collect()
    }
}

/// Listing stage over `/teams` writing to `raw_teams_info`.
#[must_use]
pub const fn teams_spec() -> StageSpec {
    StageSpec {
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
    }
}

/// Per-team stage over `/teams/statistics` writing to `raw_teams_statistics`.
#[must_use]
pub const fn team_stats_spec() -> StageSpec {
    StageSpec {
        stage: Stage::TeamStatistics,
        source: EntitySource::PerEntity {
            resource: ResourceKind::TeamStatistics,
            discovered_by: Stage::Teams,
            id_param: "team",
            scope_params: true,
        },
        table: TableSpec {
            name: "raw_teams_statistics",
            entity_column: Some("team_id"),
        },
        shape: RowShape::WholeResponse,
    }
}

/// Plan with the given dimensions running teams then team statistics.
///
/// # Panics
///
/// Panics when either dimension is empty.
#[must_use]
pub fn teams_plan(competitions: &[u32], seasons: &[u16]) -> PipelinePlan {
    PipelinePlan::new(
        "football",
        competitions.iter().copied().map(CompetitionId).collect(),
        seasons.iter().copied().map(Season).collect(),
        vec![teams_spec(), team_stats_spec()],
    )
    .unwrap_or_else(|err| panic!("test plan must be valid: {err}"))
}

/// Work unit for `spec` in competition 39, season 2024.
#[must_use]
pub fn unit_for(spec: &StageSpec, entity: Option<i64>) -> WorkUnit<'_> {
    WorkUnit {
        spec,
        scope: Scope {
            competition_index: 0,
            season_index: 0,
            stage: spec.stage,
        },
        competition: CompetitionId(39),
        season: Season(2024),
        entity_index: 0,
        entity: Entity {
            id: entity,
            page: None,
            item: None,
        },
    }
}

/// Listing body with one item per team identifier.
#[must_use]
pub fn teams_listing(ids: &[i64]) -> Value {
    let items: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "team": { "id": id, "name": format!("Team {id}") } }))
        .collect();
    json!({
        "errors": [],
        "results": items.len(),
        "paging": { "current": 1, "total": 1 },
        "response": items,
    })
}
