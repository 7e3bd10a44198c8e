//! Run configuration: TOML parse, then validate.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ReconError;
use crate::model::SourceId;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    pub name: String,
    pub survey: SurveyConfig,
    pub normalize: NormalizeConfig,
    pub matching: MatchingConfig,
    pub overrides: OverrideTable,
    pub merge: MergeConfig,
    pub output: OutputConfig,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            name: "Sistemi multiplanetari".into(),
            survey: SurveyConfig::default(),
            normalize: NormalizeConfig::default(),
            matching: MatchingConfig::default(),
            overrides: OverrideTable::default(),
            merge: MergeConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Survey ingestion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    /// Companions heavier than this are treated as probable brown dwarfs.
    pub brown_dwarf_mass_limit: f64,
    /// Rows with fewer fields abort the run.
    pub min_fields: usize,
    /// Hosts whose whole system is suspected sub-stellar.
    pub excluded_hosts: Vec<String>,
    /// Host values that are not stars of their own (solar-system entries).
    pub excluded_stars: Vec<String>,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            brown_dwarf_mass_limit: 20.0,
            min_fields: 93,
            excluded_hosts: vec!["HS 0705+6700".into()],
            excluded_stars: vec!["Sun".into()],
        }
    }
}

// ---------------------------------------------------------------------------
// Identifier normalization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Decorations cross-identification sources prepend to names.
    pub noise_prefixes: Vec<String>,
    /// Leading catalog spelling -> spelling used by the target catalog.
    pub aliases: BTreeMap<String, String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            noise_prefixes: vec!["NAME ".into(), "V* ".into(), "** ".into(), "* ".into()],
            aliases: BTreeMap::from([("Gliese ".to_string(), "GJ ".to_string())]),
        }
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Attempts per online query when the failure is transient.
    pub online_attempts: u32,
    /// Names always included in the bulk cross-identification query.
    pub extra_queries: Vec<String>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            online_attempts: 3,
            extra_queries: vec!["HD 20794".into()],
        }
    }
}

/// Hand-curated raw name -> identifier map for names the normalizer cannot
/// resolve. Consulted only after the automated lookup misses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct OverrideTable(BTreeMap<String, String>);

impl Default for OverrideTable {
    fn default() -> Self {
        Self(BTreeMap::from(
            [
                ("1RXS 1609", "1RXS J160929.1-210524"),
                ("1SWASP J1407", "1SWASP J140747.93-394542.6"),
                ("2M 0103-55 (AB)", "SCR J0103-5515"),
                ("Teegarden's", "gat 1370"),
                ("Mu Arae", "mu Ara"),
                ("TOI-4481", "GJ 806"),
                ("Nu Ophiuchi", "HD 163917"),
                ("PSR 1257 12", "PSR B1257+12"),
            ]
            .map(|(k, v)| (k.to_string(), v.to_string())),
        ))
    }
}

impl OverrideTable {
    /// Parse a standalone overrides file: a flat `"raw name" = "identifier"` table.
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))
    }

    pub fn get(&self, raw_name: &str) -> Option<&str> {
        self.0.get(raw_name).map(String::as_str)
    }

    /// Later entries win.
    pub fn extend(&mut self, other: OverrideTable) {
        self.0.extend(other.0);
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Merge + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Highest precedence first.
    pub precedence: Vec<SourceId>,
    /// Distances further apart than this are reported, not merged.
    pub distance_conflict_ly: f64,
    /// Source whose display name always replaces the canonical name.
    pub display_name_source: SourceId,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            precedence: vec![SourceId::Survey, SourceId::CrossId, SourceId::Encyclopedia],
            distance_conflict_ly: 1000.0,
            display_name_source: SourceId::Encyclopedia,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Systems with fewer planets are not published.
    pub min_planets: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { min_planets: 2 }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        for source in SourceId::ALL {
            let count = self.merge.precedence.iter().filter(|s| **s == source).count();
            if count != 1 {
                return Err(ReconError::ConfigValidation(format!(
                    "merge.precedence must list '{source}' exactly once, found {count}"
                )));
            }
        }

        if !(self.merge.distance_conflict_ly > 0.0) {
            return Err(ReconError::ConfigValidation(format!(
                "merge.distance_conflict_ly must be positive, got {}",
                self.merge.distance_conflict_ly
            )));
        }

        if !(self.survey.brown_dwarf_mass_limit > 0.0) {
            return Err(ReconError::ConfigValidation(format!(
                "survey.brown_dwarf_mass_limit must be positive, got {}",
                self.survey.brown_dwarf_mass_limit
            )));
        }

        // The survey column map reaches index 92.
        if self.survey.min_fields < 93 {
            return Err(ReconError::ConfigValidation(format!(
                "survey.min_fields must be at least 93, got {}",
                self.survey.min_fields
            )));
        }

        if self.matching.online_attempts == 0 {
            return Err(ReconError::ConfigValidation(
                "matching.online_attempts must be at least 1".into(),
            ));
        }

        if self.output.min_planets < 2 {
            return Err(ReconError::ConfigValidation(format!(
                "output.min_planets must be at least 2, got {}",
                self.output.min_planets
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
