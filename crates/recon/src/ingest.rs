//! Source row parsers: planet survey CSV, cross-identification CSV,
//! encyclopedia markup lines.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::SurveyConfig;
use crate::coords::{parse_sexagesimal, parsecs_to_light_years, Axis, CoordPair};
use crate::error::ReconError;
use crate::evidence::EventLog;
use crate::index::CrossIdRow;
use crate::model::{FieldSet, ReconEvent, SourceId};

// ---------------------------------------------------------------------------
// Planet survey
// ---------------------------------------------------------------------------

/// Survey column positions (0-based).
pub mod survey_columns {
    pub const PLANET: usize = 0;
    pub const PLANET_MASS: usize = 2;
    pub const HOST: usize = 68;
    pub const RA_DEG: usize = 69;
    pub const DEC_DEG: usize = 70;
    pub const MAGNITUDE: usize = 71;
    pub const DISTANCE_PC: usize = 76;
    pub const METALLICITY: usize = 79;
    pub const STAR_MASS: usize = 82;
    pub const STAR_RADIUS: usize = 85;
    pub const SPECTRAL_TYPE: usize = 88;
    pub const AGE: usize = 89;
    pub const TEMPERATURE: usize = 92;
}

/// "Name b", "Name (AB) c", "Name AB)b": a planet designation.
fn planet_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Z)\s][a-z]$").unwrap())
}

pub fn is_planet_designation(name: &str) -> bool {
    planet_name_re().is_match(name.trim_end())
}

/// One host star as described by the survey, with its qualifying planets.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyHost {
    pub name: String,
    pub planets: u32,
    pub fields: FieldSet,
}

fn cell<'r>(record: &'r csv::StringRecord, idx: usize) -> &'r str {
    record.get(idx).unwrap_or("").trim()
}

fn number(record: &csv::StringRecord, idx: usize, line: u64) -> Option<f64> {
    let raw = cell(record, idx);
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            log::warn!("survey line {line}, column {idx}: '{raw}' is not a number; treated as missing");
            None
        }
    }
}

fn fill_blanks(target: &mut FieldSet, row: FieldSet) {
    fn blank(v: Option<f64>) -> bool {
        v.map_or(true, |x| x == 0.0)
    }
    macro_rules! fill {
        ($($field:ident),*) => {
            $(if blank(target.$field) && !blank(row.$field) {
                target.$field = row.$field;
            })*
        };
    }
    fill!(magnitude, distance_ly, mass, radius, temperature, age, metallicity);
    if target.coordinates.is_none() {
        target.coordinates = row.coordinates;
    }
    if target.spectral_type.as_deref().map_or(true, str::is_empty) {
        target.spectral_type = row.spectral_type;
    }
}

/// Parse the survey CSV into hosts, in first-seen order.
///
/// Rows are grouped by host name wherever they appear. Companions above the
/// brown-dwarf limit are not counted; hosts in the exclusion list are dropped.
pub fn parse_survey(
    text: &str,
    config: &SurveyConfig,
    events: &mut EventLog,
) -> Result<Vec<SurveyHost>, ReconError> {
    use survey_columns as col;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut hosts: Vec<SurveyHost> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    let mut data_rows = 0usize;

    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line() as usize);
                events.push(ReconEvent::RowSkipped {
                    source: SourceId::Survey,
                    line,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let line = record.position().map_or(0, |p| p.line());
        data_rows += 1;

        if record.len() < config.min_fields {
            return Err(ReconError::fatal(
                "survey",
                format!(
                    "line {line}: expected at least {} fields, found {}",
                    config.min_fields,
                    record.len()
                ),
            ));
        }

        let planet = cell(&record, col::PLANET);
        let host = cell(&record, col::HOST);
        if host.is_empty()
            || config.excluded_stars.iter().any(|s| s == host)
            || !is_planet_designation(planet)
        {
            continue;
        }

        let planet_mass = number(&record, col::PLANET_MASS, line).unwrap_or(0.0);
        if planet_mass > config.brown_dwarf_mass_limit {
            events.push(ReconEvent::ExcludedCompanion {
                planet: planet.to_string(),
                host: host.to_string(),
                mass: planet_mass,
            });
            continue;
        }

        let coordinates = match (number(&record, col::RA_DEG, line), number(&record, col::DEC_DEG, line)) {
            (Some(ra), Some(dec)) => CoordPair::from_degrees(ra, dec),
            _ => None,
        };
        let spectral_type = Some(cell(&record, col::SPECTRAL_TYPE))
            .filter(|s| !s.is_empty())
            .map(String::from);

        let fields = FieldSet {
            coordinates,
            magnitude: number(&record, col::MAGNITUDE, line),
            distance_ly: number(&record, col::DISTANCE_PC, line)
                .filter(|d| *d > 0.0)
                .map(parsecs_to_light_years),
            spectral_type,
            mass: number(&record, col::STAR_MASS, line),
            radius: number(&record, col::STAR_RADIUS, line),
            temperature: number(&record, col::TEMPERATURE, line),
            age: number(&record, col::AGE, line),
            metallicity: number(&record, col::METALLICITY, line),
            ..Default::default()
        };

        match by_name.get(host) {
            Some(&i) => {
                hosts[i].planets += 1;
                fill_blanks(&mut hosts[i].fields, fields);
            }
            None => {
                by_name.insert(host.to_string(), hosts.len());
                hosts.push(SurveyHost { name: host.to_string(), planets: 1, fields });
            }
        }
    }

    if data_rows == 0 {
        return Err(ReconError::fatal("survey", "no data rows"));
    }

    hosts.retain(|h| {
        let excluded = config.excluded_hosts.iter().any(|x| x == &h.name);
        if excluded {
            log::info!("host '{}' excluded ({} companions)", h.name, h.planets);
        }
        !excluded
    });

    log::debug!("survey: {data_rows} rows, {} hosts", hosts.len());
    Ok(hosts)
}

// ---------------------------------------------------------------------------
// Cross-identification CSV
// ---------------------------------------------------------------------------

pub const CROSSID_REQUIRED_COLUMNS: [&str; 3] = ["main_id", "ra", "dec"];

/// Parse a cross-identification CSV (`main_id,ra,dec,dist,unit,mag,ids`).
/// A malformed row is skipped; a missing required column is an error.
pub fn parse_crossid_csv(text: &str, events: &mut EventLog) -> Result<Vec<CrossIdRow>, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ReconError::fatal("crossid", e.to_string()))?
        .clone();
    for required in CROSSID_REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h.trim() == required) {
            return Err(ReconError::MissingField {
                source: SourceId::CrossId.to_string(),
                line: 1,
                field: required.into(),
            });
        }
    }

    let mut rows = Vec::new();
    for result in reader.deserialize::<CrossIdRow>() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line() as usize);
                events.push(ReconEvent::RowSkipped {
                    source: SourceId::CrossId,
                    line,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Encyclopedia markup
// ---------------------------------------------------------------------------

/// Lines carrying a star row contain this token.
pub const ENCYCLOPEDIA_MARKER: &str = "Stella=";

const ENCYCLOPEDIA_FIELDS: usize = 11;

#[derive(Debug, Clone, PartialEq)]
pub struct EncyclopediaRow {
    pub line: usize,
    /// Full link text, `Link|Display` or just `Link`.
    pub name: String,
    /// Sexagesimal coordinates as written on the page.
    pub coordinates: Option<CoordPair>,
    /// Values to merge, with `name` set to the full link text.
    pub fields: FieldSet,
}

impl EncyclopediaRow {
    /// Link target: the name used for matching.
    pub fn link(&self) -> &str {
        self.name.split('|').next().unwrap_or(&self.name).trim()
    }
}

fn wiki_value(raw: &str) -> Option<&str> {
    let value = raw.split_once('=').map_or("", |(_, v)| v).trim();
    (!value.is_empty() && value != "-").then_some(value)
}

fn wiki_number(raw: &str) -> Option<f64> {
    let value = wiki_value(raw)?;
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            log::debug!("encyclopedia value '{value}' is not a number; treated as missing");
            None
        }
    }
}

/// `{{RA|10|56|29.27}}` or `{{DEC|-5|3|9.6}}`.
fn wiki_angle(raw: &str, axis: Axis) -> Option<crate::coords::Sexagesimal> {
    let value = wiki_value(raw)?;
    let inner = value.trim_start_matches("{{").trim_end_matches('}');
    let (_, triple) = inner.split_once('|')?;
    parse_sexagesimal(triple, axis)
}

/// Parse one marker line. `Err` carries the reason it was unusable.
pub fn parse_encyclopedia_line(line_no: usize, line: &str) -> Result<EncyclopediaRow, String> {
    let normalized = line.trim().replace(',', ".").replace('−', "-");
    let normalized = normalized.trim_start_matches('|').trim_end_matches('}');
    let fields: Vec<&str> = normalized.split("||").collect();
    if fields.len() < ENCYCLOPEDIA_FIELDS {
        return Err(format!(
            "expected {ENCYCLOPEDIA_FIELDS} fields, found {}",
            fields.len()
        ));
    }

    let name = wiki_value(fields[0])
        .map(|n| n.trim_start_matches("[[").trim_end_matches("]]").trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| "missing star name".to_string())?;

    let ra = wiki_angle(fields[1], Axis::RightAscension);
    let dec = wiki_angle(fields[2], Axis::Declination);
    let coordinates = match (ra, dec) {
        (Some(ra), Some(dec)) => CoordPair { ra, dec },
        _ => return Err(format!("unparsable coordinates for '{name}'")),
    };

    let row_fields = FieldSet {
        name: Some(name.clone()),
        coordinates: Some(coordinates),
        magnitude: wiki_number(fields[3]),
        distance_ly: wiki_number(fields[4]),
        spectral_type: wiki_value(fields[5]).map(String::from),
        mass: wiki_number(fields[6]),
        radius: wiki_number(fields[7]),
        temperature: wiki_number(fields[8]),
        age: wiki_number(fields[9]),
        metallicity: wiki_number(fields[10]),
        alternate_names: Vec::new(),
    };

    Ok(EncyclopediaRow {
        line: line_no,
        name,
        coordinates: Some(coordinates),
        fields: row_fields,
    })
}

/// Parse every marker line of an encyclopedia page. Unusable lines become
/// `RowSkipped` events.
pub fn parse_encyclopedia(text: &str, events: &mut EventLog) -> Vec<EncyclopediaRow> {
    let mut rows = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if !line.contains(ENCYCLOPEDIA_MARKER) {
            continue;
        }
        match parse_encyclopedia_line(i + 1, line) {
            Ok(row) => rows.push(row),
            Err(reason) => events.push(ReconEvent::RowSkipped {
                source: SourceId::Encyclopedia,
                line: i + 1,
                reason,
            }),
        }
    }
    rows
}
