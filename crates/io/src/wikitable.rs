// Publication markup: the it.wikipedia multi-planet systems table

use std::collections::BTreeMap;
use std::fmt::Write;

use starmerge_recon::coords::Sexagesimal;
use starmerge_recon::model::StarRecord;

pub const SUMMARY_TEMPLATE: &str = "Progetto sistemi multiplanetari";
pub const ROW_TEMPLATE: &str = "Stelle con pianeti extrasolari confermati";

/// Planet counts reported in the summary line.
const SUMMARY_PLANET_COUNTS: std::ops::RangeInclusive<u32> = 2..=8;

/// Numeric precision per column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// Round to this many decimals.
    Decimals(u32),
    /// Rounded to an integer.
    Integer,
    /// Printed as stored.
    AsStored,
}

/// Number in publication form: empty for zero or missing, `,` as the
/// decimal separator. Whole numbers keep one decimal unless rounded to an
/// integer (`7,0`, `3129`).
pub fn format_number(value: Option<f64>, precision: Precision) -> String {
    let Some(v) = value.filter(|v| *v != 0.0 && v.is_finite()) else {
        return String::new();
    };
    let text = match precision {
        Precision::Integer => format!("{}", v.round() as i64),
        Precision::Decimals(d) => {
            let factor = 10f64.powi(d as i32);
            plain((v * factor).round() / factor)
        }
        Precision::AsStored => plain(v),
    };
    text.replace('.', ",")
}

fn plain(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

fn angle(s: Option<Sexagesimal>) -> String {
    s.map(|s| s.to_padded()).unwrap_or_default()
}

/// Summary line: number of published systems with 2..=8 planets.
pub fn summary_line(stars: &[&StarRecord]) -> String {
    let mut histogram: BTreeMap<u32, usize> = BTreeMap::new();
    for s in stars {
        *histogram.entry(s.planets).or_insert(0) += 1;
    }
    let mut line = format!("{{{{{SUMMARY_TEMPLATE}");
    for n in SUMMARY_PLANET_COUNTS {
        let _ = write!(line, "|con{n}pianeti={}", histogram.get(&n).copied().unwrap_or(0));
    }
    line.push_str("}}");
    line
}

/// One two-line block per star.
pub fn star_block(star: &StarRecord) -> String {
    let coords = star.coordinates;
    format!(
        "{{{{{ROW_TEMPLATE}\n|Stella=[[{name}]]||Ascensione retta={{{{RA|{ra}}}}}||Declinazione={{{{DEC|{dec}}}}}||Magnitudine apparente={mag}||Distanza={dist}||Tipo spettrale={kind}||Massa={mass}||Raggio={radius}||Temperatura={temp}||Età={age}||Metallicità={met}||Pianeti={planets}}}}}",
        name = star.name,
        ra = angle(coords.map(|c| c.ra)),
        dec = angle(coords.map(|c| c.dec)),
        mag = format_number(star.magnitude, Precision::Decimals(2)),
        dist = format_number(star.distance_ly, Precision::AsStored),
        kind = star.spectral_type.as_deref().unwrap_or(""),
        mass = format_number(star.mass, Precision::Decimals(2)),
        radius = format_number(star.radius, Precision::Decimals(2)),
        temp = format_number(star.temperature, Precision::Integer),
        age = format_number(star.age, Precision::AsStored),
        met = format_number(star.metallicity, Precision::Decimals(2)),
        planets = star.planets,
    )
}

/// Render the full page section. Records are sorted by canonical name;
/// filtering on planet count is the caller's job.
pub fn render(stars: &[StarRecord]) -> String {
    let mut sorted: Vec<&StarRecord> = stars.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::new();
    out.push_str(&summary_line(&sorted));
    out.push_str("\n\n");
    let _ = writeln!(out, "<noinclude>{{{{{ROW_TEMPLATE}/Top}}}}</noinclude>");
    for star in &sorted {
        out.push_str(&star_block(star));
        out.push('\n');
    }
    let _ = writeln!(out, "<noinclude>{{{{{ROW_TEMPLATE}/Bottom}}}}</noinclude>");
    out
}
