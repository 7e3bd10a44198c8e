//! Event log and run summary.

use crate::index::CatalogIndex;
use crate::model::{MatchStats, ReconEvent, ReconSummary};
use crate::registry::StarRegistry;

/// Ordered record of the non-fatal outcomes of a run. Every event is logged
/// as it is pushed.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<ReconEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ReconEvent) {
        match &event {
            ReconEvent::AmbiguousMatch { name, search_key, candidates } => log::warn!(
                "'{name}': {candidates} candidates match '{search_key}'; treated as not found"
            ),
            ReconEvent::MergeConflict(c) => log::warn!(
                "{}: distance conflict, {} ly kept, {} ly ({}) rejected",
                c.star,
                c.kept_ly,
                c.rejected_ly,
                c.rejected_source
            ),
            ReconEvent::UnresolvedStar { name, source } => {
                log::warn!("'{name}' ({source}) unresolved; keeping partial data")
            }
            ReconEvent::RowSkipped { source, line, reason } => {
                log::warn!("{source} line {line} skipped: {reason}")
            }
            ReconEvent::NotInRegistry { name, coordinates } => match coordinates {
                Some(c) => log::warn!("'{name}' ({c}) not in registry"),
                None => log::warn!("'{name}' not in registry"),
            },
            ReconEvent::ExcludedCompanion { planet, host, mass } => {
                log::warn!("'{planet}' around '{host}' excluded: mass {mass} above brown-dwarf limit")
            }
            ReconEvent::DuplicateCrossId { name, coordinates } => {
                log::warn!("cross-id row '{name}' duplicates coordinates {coordinates}; dropped")
            }
        }
        self.events.push(event);
    }

    pub fn events(&self) -> &[ReconEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// Compute summary statistics for a finished run.
pub fn compute_summary(
    registry: &StarRegistry,
    index: &CatalogIndex,
    matches: &MatchStats,
    events: &[ReconEvent],
    min_planets: u32,
) -> ReconSummary {
    let mut ambiguous = 0;
    let mut merge_conflicts = 0;
    let mut not_in_registry = 0;
    let mut rows_skipped = 0;
    let mut excluded_companions = 0;

    for event in events {
        match event {
            ReconEvent::AmbiguousMatch { .. } => ambiguous += 1,
            ReconEvent::MergeConflict(_) => merge_conflicts += 1,
            ReconEvent::NotInRegistry { .. } => not_in_registry += 1,
            ReconEvent::RowSkipped { .. } => rows_skipped += 1,
            ReconEvent::ExcludedCompanion { .. } => excluded_companions += 1,
            ReconEvent::UnresolvedStar { .. } | ReconEvent::DuplicateCrossId { .. } => {}
        }
    }

    let planet_histogram = registry.planet_histogram(min_planets);

    ReconSummary {
        registered: registry.len(),
        published: planet_histogram.values().sum(),
        crossid_entries: index.len(),
        matches: matches.clone(),
        ambiguous,
        merge_conflicts,
        not_in_registry,
        rows_skipped,
        excluded_companions,
        planet_histogram,
    }
}
