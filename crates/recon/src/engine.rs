//! Run pipeline: survey ingest, cross-identification, registry resolution,
//! encyclopedia fold, report.

use crate::config::ReconConfig;
use crate::coords::CoordPair;
use crate::error::ReconError;
use crate::evidence::{compute_summary, EventLog};
use crate::index::{CatalogIndex, CrossIdRow, InsertOutcome};
use crate::ingest::{parse_encyclopedia, parse_survey};
use crate::matcher::{CrossIdService, MatchResult, Matcher};
use crate::merge::MergePolicy;
use crate::model::{FieldSet, MatchStats, ReconEvent, ReconInput, ReconMeta, ReconResult, SourceId, StarRecord};
use crate::registry::{StarId, StarRegistry};

/// Run reconciliation per config: survey, then cross-identification, then
/// encyclopedia. Only a fatal ingest failure aborts.
pub fn run(
    config: &ReconConfig,
    input: &ReconInput,
    service: &mut dyn CrossIdService,
) -> Result<ReconResult, ReconError> {
    execute(config, input, service).map(|pipeline| pipeline.finish())
}

/// Like [`run`], but hands back the finished pipeline so the caller can
/// still reach the full registry.
pub fn execute(
    config: &ReconConfig,
    input: &ReconInput,
    service: &mut dyn CrossIdService,
) -> Result<Pipeline, ReconError> {
    let mut pipeline = Pipeline::new(config);
    pipeline.ingest_survey(&input.survey)?;

    let names = pipeline.crossid_query_names();
    log::info!("fetching cross-identification rows for {} names", names.len());
    let rows = service
        .fetch_bulk(&names)
        .map_err(|e| ReconError::fatal("crossid", e.to_string()))?;
    pipeline.ingest_crossid(&rows);
    pipeline.resolve_registry(service);

    if let Some(text) = &input.encyclopedia {
        pipeline.fold_encyclopedia(text, service);
    }

    Ok(pipeline)
}

/// One reconciliation run. Owns the registry and the index for its lifetime.
#[derive(Debug)]
pub struct Pipeline {
    config: ReconConfig,
    matcher: Matcher,
    policy: MergePolicy,
    registry: StarRegistry,
    index: CatalogIndex,
    events: EventLog,
    matches: MatchStats,
}

impl Pipeline {
    pub fn new(config: &ReconConfig) -> Self {
        Self {
            config: config.clone(),
            matcher: Matcher::new(config),
            policy: MergePolicy::new(&config.merge),
            registry: StarRegistry::new(),
            index: CatalogIndex::new(),
            events: EventLog::new(),
            matches: MatchStats::default(),
        }
    }

    pub fn registry(&self) -> &StarRegistry {
        &self.registry
    }

    pub fn index(&self) -> &CatalogIndex {
        &self.index
    }

    pub fn events(&self) -> &[ReconEvent] {
        self.events.events()
    }

    pub fn matches(&self) -> &MatchStats {
        &self.matches
    }

    /// Drop everything from a previous run.
    pub fn reset(&mut self) {
        self.registry.clear();
        self.index = CatalogIndex::new();
        self.events.clear();
        self.matches = MatchStats::default();
    }

    /// Stage 1: one StarRecord per multi-planet survey host.
    pub fn ingest_survey(&mut self, text: &str) -> Result<usize, ReconError> {
        let hosts = parse_survey(text, &self.config.survey, &mut self.events)?;
        let min_planets = self.config.output.min_planets;
        let mut created = 0;

        for host in hosts {
            if host.planets < min_planets {
                log::debug!("'{}' has {} planet(s); not registered", host.name, host.planets);
                continue;
            }
            match self.registry.insert(StarRecord::new(host.name.as_str(), host.planets)) {
                Ok(id) => {
                    self.policy.merge_into(&mut self.registry, id, &host.fields, SourceId::Survey);
                    created += 1;
                }
                Err(_) => log::warn!("survey host '{}' registered twice", host.name),
            }
        }

        log::info!("survey: {created} multi-planet hosts registered");
        Ok(created)
    }

    /// Stage 2: names to request from the cross-identification service.
    pub fn crossid_query_names(&self) -> Vec<String> {
        let normalizer = self.matcher.normalizer();
        let mut names: Vec<String> = self
            .registry
            .iter()
            .map(|(_, r)| normalizer.normalize(&r.name).search_key)
            .chain(self.matcher.overrides().targets().map(String::from))
            .chain(self.config.matching.extra_queries.iter().cloned())
            .filter(|n| !n.is_empty())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Stage 3: populate the catalog index.
    pub fn ingest_crossid(&mut self, rows: &[CrossIdRow]) -> usize {
        let mut inserted = 0;
        for row in rows {
            match self.index.ingest_row(row) {
                Some(InsertOutcome::Inserted(_)) => inserted += 1,
                Some(InsertOutcome::Duplicate(_)) => {
                    if let Some(coordinates) = row.coordinates() {
                        self.events.push(ReconEvent::DuplicateCrossId {
                            name: row.main_id.clone(),
                            coordinates,
                        });
                    }
                }
                None => log::debug!("cross-id row '{}' has no coordinates; skipped", row.main_id),
            }
        }
        log::info!("crossid: {inserted} entries indexed ({} rows)", rows.len());
        inserted
    }

    /// Stage 4: resolve every registered star against the index.
    pub fn resolve_registry(&mut self, service: &mut dyn CrossIdService) {
        let ids: Vec<StarId> = self.registry.ids().collect();
        for id in ids {
            let name = self.registry.get(id).name.clone();
            let found = self.matcher.resolve(
                &name,
                SourceId::Survey,
                &mut self.index,
                service,
                &mut self.events,
            );
            self.matches.record(found.as_ref().map(|m| m.stage));

            let Some(found) = found else { continue };
            let fields = crossid_fields(&found);
            self.merge(id, &fields, SourceId::CrossId);
            self.registry.get_mut(id).crossid_anchor = Some(found.coordinates);
        }
        log::info!(
            "crossid: {} index, {} override, {} online, {} unresolved",
            self.matches.index,
            self.matches.override_table,
            self.matches.online,
            self.matches.unresolved
        );
    }

    /// Stage 5: fold encyclopedia rows into matching records.
    pub fn fold_encyclopedia(&mut self, text: &str, service: &mut dyn CrossIdService) -> usize {
        let rows = parse_encyclopedia(text, &mut self.events);
        let mut folded = 0;

        for row in &rows {
            let link = row.link();
            let matched = self.matcher.resolve(
                link,
                SourceId::Encyclopedia,
                &mut self.index,
                service,
                &mut self.events,
            );

            let located = self.locate(link, matched.as_ref(), row.coordinates.as_ref());
            let id = match located.as_slice() {
                [id] => *id,
                [] => {
                    self.events.push(ReconEvent::NotInRegistry {
                        name: row.name.clone(),
                        coordinates: row.coordinates,
                    });
                    continue;
                }
                candidates => {
                    self.events.push(ReconEvent::AmbiguousMatch {
                        name: row.name.clone(),
                        search_key: link.to_string(),
                        candidates: candidates.len(),
                    });
                    continue;
                }
            };

            self.merge(id, &row.fields, SourceId::Encyclopedia);
            folded += 1;
        }

        log::info!("encyclopedia: {folded} of {} rows folded", rows.len());
        folded
    }

    /// Matched coordinates first, then the row's own, then a name prefix.
    /// Several prefix survivors are returned as is and never guessed between.
    fn locate(
        &self,
        link: &str,
        matched: Option<&MatchResult>,
        own: Option<&CoordPair>,
    ) -> Vec<StarId> {
        let by_coordinates = matched
            .and_then(|m| self.registry.find_by_coordinates(&m.coordinates))
            .or_else(|| own.and_then(|c| self.registry.find_by_coordinates(c)));
        match by_coordinates {
            Some(id) => vec![id],
            None => {
                let prefix = self.matcher.normalizer().apply_alias(link);
                self.registry.find_by_name_prefix(&prefix)
            }
        }
    }

    fn merge(&mut self, id: StarId, fields: &FieldSet, source: SourceId) {
        for conflict in self.policy.merge_into(&mut self.registry, id, fields, source) {
            self.events.push(ReconEvent::MergeConflict(conflict));
        }
    }

    /// Stage 6: publishable records, summary and events. The registry stays
    /// in place so it can still be persisted.
    pub fn finish(&self) -> ReconResult {
        let min_planets = self.config.output.min_planets;
        let summary = compute_summary(
            &self.registry,
            &self.index,
            &self.matches,
            self.events.events(),
            min_planets,
        );
        let stars = self.registry.publishable(min_planets).into_iter().cloned().collect();

        ReconResult {
            meta: ReconMeta {
                config_name: self.config.name.clone(),
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                run_at: chrono::Utc::now().to_rfc3339(),
            },
            summary,
            stars,
            events: self.events.events().to_vec(),
        }
    }

    /// Hand the registry over, e.g. for persistence.
    pub fn into_registry(self) -> StarRegistry {
        self.registry
    }
}

fn crossid_fields(found: &MatchResult) -> FieldSet {
    FieldSet {
        coordinates: Some(found.coordinates),
        distance_ly: found.distance_ly,
        magnitude: found.magnitude,
        alternate_names: found.identifiers.clone(),
        ..Default::default()
    }
}
