//! Ordered, restartable traversal of the work space.
//!
//! Work units are produced in lexicographic order over competition, season,
//! stage and entity, with outer dimensions varying slowest. The enumerator
//! behaves like an odometer seeded from a [`Checkpoint`]: the first scope
//! resumes at the checkpointed entity offset and every later scope starts at
//! zero.
//!
//! Entities are resolved lazily, one scope at a time, through an
//! [`EntityDirectory`]. Only the current scope's entities are held in memory.

use std::mem;

use serde_json::Value;

use crate::{Checkpoint, CompetitionId, PipelinePlan, PlanError, Season, Stage, StageSpec};

/// One (competition, season, stage) combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope {
    /// Index into the plan's competitions.
    pub competition_index: usize,
    /// Index into the plan's seasons.
    pub season_index: usize,
    /// Stage being enumerated.
    pub stage: Stage,
}

/// An entity within a scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    /// Provider identifier, when known.
    pub id: Option<i64>,
    /// Listing page the entity was found on, for paginated listings.
    pub page: Option<u32>,
    /// Listing item, for stages whose rows come straight from the listing.
    pub item: Option<Value>,
}

/// Resolves the entities of a scope.
///
/// Implementations must be deterministic for a given provider state so
/// that resuming from an entity offset addresses the same entity.
pub trait EntityDirectory {
    /// Entities of `scope`, in enumeration order.
    fn entities(&mut self, plan: &PipelinePlan, scope: Scope) -> Vec<Entity>;
}

impl<D: EntityDirectory + ?Sized> EntityDirectory for &mut D {
    fn entities(&mut self, plan: &PipelinePlan, scope: Scope) -> Vec<Entity> {
        (**self).entities(plan, scope)
    }
}

/// A single logical fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit<'p> {
    /// Stage specification.
    pub spec: &'p StageSpec,
    /// Scope the unit belongs to.
    pub scope: Scope,
    /// Competition identifier.
    pub competition: CompetitionId,
    /// Season.
    pub season: Season,
    /// Offset of the entity within the scope.
    pub entity_index: usize,
    /// The entity itself.
    pub entity: Entity,
}

impl WorkUnit<'_> {
    /// Checkpoint addressing the unit that follows this one.
    ///
    /// # Examples
    ///
    /// ```
    /// use touchline_core::test_support::{teams_spec, unit_for};
    ///
    /// let spec = teams_spec();
    /// let unit = unit_for(&spec, Some(42));
    /// assert_eq!(unit.next_checkpoint().entity_index, 1);
    /// ```
    #[must_use]
    pub const fn next_checkpoint(&self) -> Checkpoint {
        Checkpoint {
            competition_index: self.scope.competition_index,
            season_index: self.scope.season_index,
            stage: self.scope.stage,
            entity_index: self.entity_index + 1,
            page: self.entity.page,
        }
    }
}

/// Odometer over a [`PipelinePlan`].
#[derive(Debug)]
pub struct DimensionEnumerator<'p> {
    plan: &'p PipelinePlan,
    competition_index: usize,
    season_index: usize,
    stage_index: usize,
    entity_index: usize,
    entities: Option<Vec<Entity>>,
}

impl<'p> DimensionEnumerator<'p> {
    /// Start enumerating `plan` at `checkpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] when the checkpoint does not address a position
    /// in the plan.
    pub fn new(plan: &'p PipelinePlan, checkpoint: &Checkpoint) -> Result<Self, PlanError> {
        plan.validate_checkpoint(checkpoint)?;
        let stage_index = plan
            .stage_position(checkpoint.stage)
            .ok_or_else(|| PlanError::UnknownStage {
                plan: plan.name().to_owned(),
                stage: checkpoint.stage,
            })?;
        Ok(Self {
            plan,
            competition_index: checkpoint.competition_index,
            season_index: checkpoint.season_index,
            stage_index,
            entity_index: checkpoint.entity_index,
            entities: None,
        })
    }

    /// Next unit, resolving entities through `directory` as scopes open.
    ///
    /// Returns `None` once every competition is exhausted.
    pub fn next_unit<D>(&mut self, directory: &mut D) -> Option<WorkUnit<'p>>
    where
        D: EntityDirectory + ?Sized,
    {
        let plan = self.plan;
        loop {
            let competition = *plan.competitions().get(self.competition_index)?;
            let season = *plan.seasons().get(self.season_index)?;
            let spec = plan.stages().get(self.stage_index)?;
            let scope = self.scope(spec.stage);

            let entities = self
                .entities
                .get_or_insert_with(|| directory.entities(plan, scope));
            if let Some(slot) = entities.get_mut(self.entity_index) {
                let unit = WorkUnit {
                    spec,
                    scope,
                    competition,
                    season,
                    entity_index: self.entity_index,
                    entity: mem::take(slot),
                };
                self.entity_index += 1;
                return Some(unit);
            }
            self.advance_scope();
        }
    }

    /// Whether the current scope has no units left.
    ///
    /// Called right after [`DimensionEnumerator::next_unit`], this reports
    /// whether the unit just returned closed its scope.
    #[must_use]
    pub fn scope_exhausted(&self) -> bool {
        self.entities
            .as_ref()
            .is_some_and(|entities| self.entity_index >= entities.len())
    }

    /// Whether every competition has been enumerated.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.competition_index >= self.plan.competitions().len()
    }

    /// Checkpoint addressing the next unit to be produced.
    #[must_use]
    pub fn position(&self) -> Checkpoint {
        let stage = self
            .plan
            .stages()
            .get(self.stage_index)
            .map_or_else(|| self.plan.origin().stage, |spec| spec.stage);
        Checkpoint {
            competition_index: self.competition_index,
            season_index: self.season_index,
            stage,
            entity_index: self.entity_index,
            page: None,
        }
    }

    const fn scope(&self, stage: Stage) -> Scope {
        Scope {
            competition_index: self.competition_index,
            season_index: self.season_index,
            stage,
        }
    }

    fn advance_scope(&mut self) {
        self.entities = None;
        self.entity_index = 0;
        self.stage_index += 1;
        if self.stage_index < self.plan.stages().len() {
            return;
        }
        self.stage_index = 0;
        self.season_index += 1;
        if self.season_index < self.plan.seasons().len() {
            return;
        }
        self.season_index = 0;
        self.competition_index += 1;
    }
}
