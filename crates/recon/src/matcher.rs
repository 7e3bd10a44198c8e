//! Matcher: resolve a star name to at most one cross-identification entry.
//!
//! Stages, in order: catalog index, peculiar-name override table, online
//! single-object query. An online hit is folded back into the index so later
//! lookups in the same run resolve locally.

use std::fmt;

use serde::Serialize;

use crate::config::{OverrideTable, ReconConfig};
use crate::coords::CoordPair;
use crate::evidence::EventLog;
use crate::index::{CatalogIndex, CrossIdRow, EntryId, Lookup};
use crate::model::{MatchStage, ReconEvent, SourceId};
use crate::names::{collapse_whitespace, NormalizedName, Normalizer};

// ---------------------------------------------------------------------------
// Cross-identification service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Worth retrying: timeouts, rate limits, upstream 5xx.
    Transient(String),
    /// Retrying will not help.
    Permanent(String),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(msg) => write!(f, "transient: {msg}"),
            Self::Permanent(msg) => write!(f, "permanent: {msg}"),
        }
    }
}

impl std::error::Error for LookupError {}

/// The cross-identification catalog API.
pub trait CrossIdService {
    /// One row per object for a batch of names.
    fn fetch_bulk(&mut self, names: &[String]) -> Result<Vec<CrossIdRow>, LookupError>;

    /// Single-object lookup. `Ok(None)` when the catalog does not know the name.
    fn query_object(&mut self, name: &str) -> Result<Option<CrossIdRow>, LookupError>;
}

/// Answers from a pre-loaded row set; never touches the network.
#[derive(Debug, Clone, Default)]
pub struct OfflineCrossId {
    rows: Vec<CrossIdRow>,
}

impl OfflineCrossId {
    pub fn new(rows: Vec<CrossIdRow>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

fn same_identifier(a: &str, b: &str) -> bool {
    collapse_whitespace(a).eq_ignore_ascii_case(&collapse_whitespace(b))
}

impl CrossIdService for OfflineCrossId {
    fn fetch_bulk(&mut self, _names: &[String]) -> Result<Vec<CrossIdRow>, LookupError> {
        Ok(self.rows.clone())
    }

    fn query_object(&mut self, name: &str) -> Result<Option<CrossIdRow>, LookupError> {
        Ok(self
            .rows
            .iter()
            .find(|row| {
                same_identifier(&row.main_id, name)
                    || row.ids.split('|').any(|id| same_identifier(id, name))
            })
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Catalog main identifier of the matched entry.
    pub entry_name: String,
    pub coordinates: CoordPair,
    pub distance_ly: Option<f64>,
    pub magnitude: Option<f64>,
    pub identifiers: Vec<String>,
    pub stage: MatchStage,
}

impl MatchResult {
    fn from_entry(index: &CatalogIndex, id: EntryId, stage: MatchStage) -> Self {
        let entry = index.entry(id);
        Self {
            entry_name: entry.name.clone(),
            coordinates: entry.coordinates,
            distance_ly: entry.distance_ly(),
            magnitude: entry.magnitude,
            identifiers: entry.identifiers.clone(),
            stage,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Matcher {
    normalizer: Normalizer,
    overrides: OverrideTable,
    online_attempts: u32,
}

impl Matcher {
    pub fn new(config: &ReconConfig) -> Self {
        Self {
            normalizer: Normalizer::new(&config.normalize),
            overrides: config.overrides.clone(),
            online_attempts: config.matching.online_attempts.max(1),
        }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn overrides(&self) -> &OverrideTable {
        &self.overrides
    }

    /// Override target for a name, tried on the raw, display and key forms.
    fn override_for(&self, raw: &str, normalized: &NormalizedName) -> Option<String> {
        [raw.trim(), normalized.display.as_str(), normalized.search_key.as_str()]
            .into_iter()
            .find_map(|form| self.overrides.get(form))
            .map(String::from)
    }

    /// Resolve `name` to a single entry. Ambiguity counts as a miss. A name
    /// that fails every stage is reported as unresolved for `source`.
    pub fn resolve(
        &self,
        name: &str,
        source: SourceId,
        index: &mut CatalogIndex,
        service: &mut dyn CrossIdService,
        events: &mut EventLog,
    ) -> Option<MatchResult> {
        let normalized = self.normalizer.normalize(name);
        log::debug!("resolve '{name}' as '{}'", normalized.search_key);

        if let Some(id) = Self::lookup(index, name, &normalized.search_key, events) {
            return Some(MatchResult::from_entry(index, id, MatchStage::Index));
        }

        let override_target = self.override_for(name, &normalized);
        if let Some(target) = &override_target {
            if let Some(id) = Self::lookup(index, name, target, events) {
                log::debug!("'{name}' resolved through override '{target}'");
                index.merge_synonym(id, &normalized.search_key);
                return Some(MatchResult::from_entry(index, id, MatchStage::Override));
            }
        }

        let mut queries: Vec<String> = Vec::new();
        for q in override_target
            .into_iter()
            .chain([collapse_whitespace(name), normalized.search_key.clone()])
        {
            if !q.is_empty() && !queries.iter().any(|seen| same_identifier(seen, &q)) {
                queries.push(q);
            }
        }

        for query in &queries {
            let Some(row) = self.query_with_retry(service, query) else {
                continue;
            };
            match index.absorb_discovery(&row, &normalized.search_key) {
                Some(id) => {
                    log::info!("'{name}' resolved online as '{}'", index.entry(id).name);
                    return Some(MatchResult::from_entry(index, id, MatchStage::Online));
                }
                None => log::debug!("online row for '{query}' has no coordinates"),
            }
        }

        events.push(ReconEvent::UnresolvedStar { name: name.to_string(), source });
        None
    }

    fn lookup(
        index: &CatalogIndex,
        name: &str,
        key: &str,
        events: &mut EventLog,
    ) -> Option<EntryId> {
        match index.resolve_identifier(key) {
            Lookup::Found(id) => Some(id),
            Lookup::NotFound => None,
            Lookup::Ambiguous(candidates) => {
                events.push(ReconEvent::AmbiguousMatch {
                    name: name.to_string(),
                    search_key: key.to_string(),
                    candidates: candidates.len(),
                });
                None
            }
        }
    }

    fn query_with_retry(&self, service: &mut dyn CrossIdService, query: &str) -> Option<CrossIdRow> {
        for attempt in 1..=self.online_attempts {
            match service.query_object(query) {
                Ok(found) => return found,
                Err(LookupError::Transient(msg)) => {
                    log::warn!(
                        "online query '{query}' failed (attempt {attempt}/{}): {msg}",
                        self.online_attempts
                    );
                }
                Err(LookupError::Permanent(msg)) => {
                    log::warn!("online query '{query}' failed: {msg}");
                    return None;
                }
            }
        }
        None
    }
}
