//! Record, field-set, event and report types shared by every stage.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::coords::CoordPair;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// Planet-survey catalog. First writer, establishes the row.
    Survey,
    /// Stellar cross-identification catalog.
    #[serde(rename = "crossid")]
    CrossId,
    /// Curated encyclopedia page.
    Encyclopedia,
}

impl SourceId {
    pub const ALL: [SourceId; 3] = [Self::Survey, Self::CrossId, Self::Encyclopedia];
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Survey => write!(f, "survey"),
            Self::CrossId => write!(f, "crossid"),
            Self::Encyclopedia => write!(f, "encyclopedia"),
        }
    }
}

/// Mergeable StarRecord attributes, for provenance tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    Coordinates,
    Magnitude,
    Distance,
    SpectralType,
    Mass,
    Radius,
    Temperature,
    Age,
    Metallicity,
}

// ---------------------------------------------------------------------------
// Registry entity
// ---------------------------------------------------------------------------

/// One reconciled host star.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarRecord {
    pub name: String,
    pub coordinates: Option<CoordPair>,
    pub magnitude: Option<f64>,
    pub distance_ly: Option<f64>,
    pub spectral_type: Option<String>,
    /// Solar masses.
    pub mass: Option<f64>,
    /// Solar radii.
    pub radius: Option<f64>,
    /// Effective temperature, K.
    pub temperature: Option<f64>,
    /// Gyr.
    pub age: Option<f64>,
    /// [Fe/H].
    pub metallicity: Option<f64>,
    /// Confirmed planets, counted from the survey only.
    pub planets: u32,
    #[serde(default)]
    pub alternate_names: Vec<String>,
    /// Coordinates of the cross-identification entry this star resolved to.
    /// A second coordinate join key next to `coordinates`.
    #[serde(default)]
    pub crossid_anchor: Option<CoordPair>,
    /// Which source last wrote each populated field.
    #[serde(default)]
    pub provenance: BTreeMap<Field, SourceId>,
}

impl StarRecord {
    pub fn new(name: impl Into<String>, planets: u32) -> Self {
        Self {
            name: name.into(),
            coordinates: None,
            magnitude: None,
            distance_ly: None,
            spectral_type: None,
            mass: None,
            radius: None,
            temperature: None,
            age: None,
            metallicity: None,
            planets,
            alternate_names: Vec::new(),
            crossid_anchor: None,
            provenance: BTreeMap::new(),
        }
    }

    pub fn add_alternate_name(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty() || name == self.name {
            return;
        }
        if !self.alternate_names.iter().any(|n| n == name) {
            self.alternate_names.push(name.to_string());
        }
    }
}

/// Incoming attribute values from one source for one star.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    pub name: Option<String>,
    pub coordinates: Option<CoordPair>,
    pub magnitude: Option<f64>,
    pub distance_ly: Option<f64>,
    pub spectral_type: Option<String>,
    pub mass: Option<f64>,
    pub radius: Option<f64>,
    pub temperature: Option<f64>,
    pub age: Option<f64>,
    pub metallicity: Option<f64>,
    pub alternate_names: Vec<String>,
}

// ---------------------------------------------------------------------------
// Non-fatal outcomes
// ---------------------------------------------------------------------------

/// Two sources disagree on a star's distance beyond the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeConflict {
    pub star: String,
    pub kept_ly: f64,
    pub kept_source: Option<SourceId>,
    pub rejected_ly: f64,
    pub rejected_source: SourceId,
    pub difference_ly: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconEvent {
    /// Several index entries survived disambiguation. Treated as not found.
    AmbiguousMatch { name: String, search_key: String, candidates: usize },
    MergeConflict(MergeConflict),
    /// All matcher stages failed. The record keeps its partial data.
    UnresolvedStar { name: String, source: SourceId },
    /// A single malformed row, dropped.
    RowSkipped { source: SourceId, line: usize, reason: String },
    /// Encyclopedia row with no registry counterpart.
    NotInRegistry { name: String, coordinates: Option<CoordPair> },
    /// Companion above the brown-dwarf mass limit.
    ExcludedCompanion { planet: String, host: String, mass: f64 },
    /// Cross-identification row whose coordinate pair is already indexed.
    DuplicateCrossId { name: String, coordinates: CoordPair },
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Pre-fetched bulk source text. The cross-identification catalog is reached
/// through a `CrossIdService` instead, because its query depends on the survey.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub survey: String,
    pub encyclopedia: Option<String>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    Index,
    Override,
    Online,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchStats {
    pub index: usize,
    pub override_table: usize,
    pub online: usize,
    pub unresolved: usize,
}

impl MatchStats {
    pub fn record(&mut self, stage: Option<MatchStage>) {
        match stage {
            Some(MatchStage::Index) => self.index += 1,
            Some(MatchStage::Override) => self.override_table += 1,
            Some(MatchStage::Online) => self.online += 1,
            None => self.unresolved += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconSummary {
    pub registered: usize,
    pub published: usize,
    pub crossid_entries: usize,
    pub matches: MatchStats,
    pub ambiguous: usize,
    pub merge_conflicts: usize,
    pub not_in_registry: usize,
    pub rows_skipped: usize,
    pub excluded_companions: usize,
    /// planet count -> number of published systems
    pub planet_histogram: BTreeMap<u32, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    /// Publishable records, ordered by canonical name.
    pub stars: Vec<StarRecord>,
    pub events: Vec<ReconEvent>,
}

impl ReconResult {
    /// True when something needs a human look before publishing.
    pub fn needs_review(&self) -> bool {
        self.summary.merge_conflicts > 0 || self.summary.matches.unresolved > 0
    }
}
