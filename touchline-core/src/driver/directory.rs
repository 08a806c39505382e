//! Entity discovery backed by the provider's listings.

use std::collections::HashMap;

use log::{debug, warn};

use crate::document::lookup_id;
use crate::enumerate::{Entity, EntityDirectory, Scope};
use crate::{
    CompetitionId, EntitySource, FetchRequest, PipelinePlan, Provider, RateLimiters, Season,
    Stage, StageSpec,
};

use super::SkipReason;

/// A listing request that could not be completed.
#[derive(Debug, Clone)]
pub(crate) struct ListingSkip {
    pub(crate) scope: Scope,
    pub(crate) request: FetchRequest,
    pub(crate) reason: SkipReason,
}

/// Resolves entities by walking paginated listings.
///
/// Identifiers discovered by a listing stage are cached for the current
/// competition and season so dependent stages do not refetch them. The
/// cache is dropped whenever the enumeration moves to another season.
pub(crate) struct ProviderDirectory<'a, P: ?Sized> {
    provider: &'a P,
    limits: &'a RateLimiters,
    cached_for: Option<(usize, usize)>,
    discovered: HashMap<Stage, Vec<(i64, Option<u32>)>>,
    skips: Vec<ListingSkip>,
}

impl<'a, P: Provider + ?Sized> ProviderDirectory<'a, P> {
    pub(crate) fn new(provider: &'a P, limits: &'a RateLimiters) -> Self {
        Self {
            provider,
            limits,
            cached_for: None,
            discovered: HashMap::new(),
            skips: Vec::new(),
        }
    }

    /// Listing failures recorded since the last call.
    pub(crate) fn take_skips(&mut self) -> Vec<ListingSkip> {
        std::mem::take(&mut self.skips)
    }

    /// Fetch every page of `spec`'s listing for `scope`.
    ///
    /// Items lacking an identifier are dropped. A failing page ends the
    /// listing; entities from earlier pages are kept.
    fn walk_listing(
        &mut self,
        spec: &StageSpec,
        scope: Scope,
        competition: CompetitionId,
        season: Season,
    ) -> Vec<Entity> {
        let Some(id_path) = spec.id_path() else {
            return Vec::new();
        };
        let mut entities = Vec::new();
        let mut page = 1;
        loop {
            let Some(request) = spec.listing_request(competition, season, page) else {
                break;
            };
            self.limits.acquire();
            let document = match self.provider.fetch(&request, self.limits) {
                Ok(document) => document,
                Err(error) => {
                    self.skip(scope, request, SkipReason::Transport(error));
                    break;
                }
            };
            let issues = document.errors();
            if !issues.is_empty() {
                self.skip(scope, request, SkipReason::Provider(issues));
                break;
            }

            let paging = document.paging();
            let listed_page = paging.filter(|p| p.total > 1).map(|p| p.current);
            let before = entities.len();
            for item in document.items() {
                let Some(id) = lookup_id(item, id_path) else {
                    warn!(
                        "dropping {} item without {} for competition {competition}, season {season} on {request}",
                        spec.stage,
                        id_path.join(".")
                    );
                    continue;
                };
                entities.push(Entity {
                    id: Some(id),
                    page: listed_page,
                    item: Some(item.clone()),
                });
            }
            debug!(
                "{request} listed {} {} entities",
                entities.len() - before,
                spec.stage
            );

            match paging {
                Some(paging) if page < paging.total => page += 1,
                _ => break,
            }
        }

        self.discovered.insert(
            spec.stage,
            entities
                .iter()
                .filter_map(|entity| entity.id.map(|id| (id, entity.page)))
                .collect(),
        );
        entities
    }

    fn skip(&mut self, scope: Scope, request: FetchRequest, reason: SkipReason) {
        self.skips.push(ListingSkip {
            scope,
            request,
            reason,
        });
    }

    fn reset_cache(&mut self, scope: Scope) {
        let key = (scope.competition_index, scope.season_index);
        if self.cached_for != Some(key) {
            self.discovered.clear();
            self.cached_for = Some(key);
        }
    }
}

impl<P: Provider + ?Sized> EntityDirectory for ProviderDirectory<'_, P> {
    fn entities(&mut self, plan: &PipelinePlan, scope: Scope) -> Vec<Entity> {
        self.reset_cache(scope);
        let (Some(spec), Some(competition), Some(season)) = (
            plan.stage_spec(scope.stage),
            plan.competitions().get(scope.competition_index).copied(),
            plan.seasons().get(scope.season_index).copied(),
        ) else {
            return Vec::new();
        };

        match spec.source {
            EntitySource::Listing { .. } => self.walk_listing(spec, scope, competition, season),
            EntitySource::PerEntity { discovered_by, .. } => {
                if !self.discovered.contains_key(&discovered_by) {
                    let Some(listing) = plan.stage_spec(discovered_by) else {
                        return Vec::new();
                    };
                    // Resuming past the listing stage: rediscover without
                    // emitting listing rows.
                    let listing_scope = Scope {
                        stage: discovered_by,
                        ..scope
                    };
                    self.walk_listing(listing, listing_scope, competition, season);
                }
                self.discovered
                    .get(&discovered_by)
                    .map(|ids| {
                        ids.iter()
                            .map(|&(id, page)| Entity {
                                id: Some(id),
                                page,
                                item: None,
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            }
        }
    }
}
