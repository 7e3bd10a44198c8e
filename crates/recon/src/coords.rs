//! Coordinate codec: catalog angles to sexagesimal triples and back.
//!
//! Every conversion path (decimal degrees, pre-formatted strings, values read
//! back from a snapshot) funnels through [`Sexagesimal::from_parts`], so the
//! rounding carry is applied identically everywhere: seconds rolling to 60
//! bump the minutes, minutes rolling to 60 bump the hour/degree field, and
//! right ascension wraps at 24h.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Field delimiter of the canonical text form (`10|56|29`).
pub const DELIMITER: char = '|';

pub const LY_PER_PARSEC: f64 = 3.261563777;

/// Parsecs to light-years, rounded to one decimal.
pub fn parsecs_to_light_years(pc: f64) -> f64 {
    (pc * LY_PER_PARSEC * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    RightAscension,
    Declination,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RightAscension => write!(f, "ra"),
            Self::Declination => write!(f, "dec"),
        }
    }
}

/// An angle as an integer hour/degree, minute, second triple.
///
/// The sign lives only on the major field. `negative` is kept separately so
/// that declinations between 0° and -1° keep their sign (`-0|30|0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sexagesimal {
    negative: bool,
    major: u32,
    minutes: u32,
    seconds: u32,
}

impl Sexagesimal {
    /// Build a triple, applying the full rollover carry.
    pub fn from_parts(axis: Axis, negative: bool, major: u32, minutes: u32, seconds: u32) -> Self {
        let (mut major, minutes, seconds) = carry(major, minutes, seconds);
        if axis == Axis::RightAscension {
            major %= 24;
        }
        let negative = negative && (major, minutes, seconds) != (0, 0, 0);
        Self { negative, major, minutes, seconds }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    /// Signed total seconds. Ordering and diagnostics only; joins compare
    /// the triple itself.
    pub fn to_numeric_key(&self) -> i64 {
        let total = self.major as i64 * 3600 + self.minutes as i64 * 60 + self.seconds as i64;
        if self.negative {
            -total
        } else {
            total
        }
    }

    /// Back to decimal degrees.
    pub fn to_degrees(&self, axis: Axis) -> f64 {
        let units = self.to_numeric_key() as f64 / 3600.0;
        match axis {
            Axis::RightAscension => units * 15.0,
            Axis::Declination => units,
        }
    }

    /// Zero-padded publication form (`05|03|09`, `-05|03|09`).
    pub fn to_padded(&self) -> String {
        let sign = if self.negative { "-" } else { "" };
        format!(
            "{sign}{:02}{DELIMITER}{:02}{DELIMITER}{:02}",
            self.major, self.minutes, self.seconds
        )
    }
}

/// Seconds -> minutes -> major carry.
pub fn carry(major: u32, minutes: u32, seconds: u32) -> (u32, u32, u32) {
    let minutes = minutes + seconds / 60;
    let seconds = seconds % 60;
    let major = major + minutes / 60;
    let minutes = minutes % 60;
    (major, minutes, seconds)
}

/// Convert decimal degrees to a sexagesimal triple.
///
/// Right ascension is divided by 15 first (degrees to hours). Returns `None`
/// for non-finite input.
pub fn to_sexagesimal(value: f64, axis: Axis) -> Option<Sexagesimal> {
    if !value.is_finite() {
        return None;
    }
    let units = match axis {
        Axis::RightAscension => value / 15.0,
        Axis::Declination => value,
    };
    let negative = units < 0.0;
    let abs = units.abs();
    let major = abs.trunc();
    let minutes = (abs - major) * 60.0;
    let whole_minutes = minutes.trunc();
    let seconds = ((minutes - whole_minutes) * 60.0).round();

    let sexa = Sexagesimal::from_parts(
        axis,
        negative,
        major as u32,
        whole_minutes as u32,
        seconds as u32,
    );
    log::debug!("to_sexagesimal: {value} ({axis}) -> {sexa}");
    Some(sexa)
}

/// Parse a source-formatted sexagesimal string (`10 56 29.27`, `10|56|29.27`,
/// `-05:03:09.6`). The seconds field is rounded and the carry applied.
pub fn parse_sexagesimal(text: &str, axis: Axis) -> Option<Sexagesimal> {
    let fields: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || c == DELIMITER || c == ':')
        .filter(|s| !s.is_empty())
        .collect();
    if fields.len() != 3 {
        return None;
    }

    let major_text = fields[0];
    let negative = major_text.starts_with('-');
    let major: f64 = major_text.trim_start_matches(['-', '+']).parse().ok()?;
    let minutes: f64 = fields[1].parse().ok()?;
    let seconds: f64 = fields[2].parse().ok()?;
    if !(major.is_finite() && minutes.is_finite() && seconds.is_finite())
        || major < 0.0
        || minutes < 0.0
        || seconds < 0.0
    {
        return None;
    }

    Some(Sexagesimal::from_parts(
        axis,
        negative,
        major.trunc() as u32,
        minutes.trunc() as u32,
        seconds.round() as u32,
    ))
}

impl fmt::Display for Sexagesimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.negative { "-" } else { "" };
        write!(
            f,
            "{sign}{}{DELIMITER}{}{DELIMITER}{}",
            self.major, self.minutes, self.seconds
        )
    }
}

impl FromStr for Sexagesimal {
    type Err = String;

    /// Strict canonical form only: three `|`-separated integers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(DELIMITER).collect();
        if parts.len() != 3 {
            return Err(format!("expected h|m|s, got '{s}'"));
        }
        let negative = parts[0].starts_with('-');
        let field = |t: &str| -> Result<u32, String> {
            t.trim_start_matches('-')
                .parse::<u32>()
                .map_err(|_| format!("bad sexagesimal field '{t}' in '{s}'"))
        };
        let major = field(parts[0])?;
        let minutes = field(parts[1])?;
        let seconds = field(parts[2])?;
        if minutes > 59 || seconds > 59 {
            return Err(format!("minutes/seconds out of range in '{s}'"));
        }
        let negative = negative && (major, minutes, seconds) != (0, 0, 0);
        Ok(Self { negative, major, minutes, seconds })
    }
}

impl Serialize for Sexagesimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Sexagesimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Right ascension + declination. The primary identity key of the
/// cross-identification index and the coordinate join key of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CoordPair {
    pub ra: Sexagesimal,
    pub dec: Sexagesimal,
}

impl CoordPair {
    pub fn from_degrees(ra_deg: f64, dec_deg: f64) -> Option<Self> {
        Some(Self {
            ra: to_sexagesimal(ra_deg, Axis::RightAscension)?,
            dec: to_sexagesimal(dec_deg, Axis::Declination)?,
        })
    }
}

impl fmt::Display for CoordPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RA:{}, DEC:{}", self.ra, self.dec)
    }
}
