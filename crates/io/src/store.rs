// Registry snapshot using SQLite

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, Connection};

use starmerge_recon::coords::{CoordPair, Sexagesimal};
use starmerge_recon::model::{Field, ReconMeta, SourceId, StarRecord};
use starmerge_recon::{ReconError, StarRegistry};

use crate::SNAPSHOT_FORMAT_VERSION;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS stars (
    name TEXT PRIMARY KEY,
    ra TEXT,                 -- h|m|s, NULL when unresolved
    dec TEXT,                -- d|m|s
    anchor_ra TEXT,          -- cross-id match coordinates
    anchor_dec TEXT,
    mag REAL,
    dist REAL,               -- light-years
    type TEXT,
    mass REAL,
    radius REAL,
    temp REAL,
    age REAL,
    metall REAL,
    planets INTEGER NOT NULL,
    alt_names TEXT NOT NULL DEFAULT '',   -- pipe-delimited
    provenance TEXT NOT NULL DEFAULT '{}' -- JSON field -> source
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// A loaded snapshot.
#[derive(Debug)]
pub struct Snapshot {
    pub meta: ReconMeta,
    pub registry: StarRegistry,
}

fn store_err(e: impl ToString) -> ReconError {
    ReconError::Store(e.to_string())
}

fn split_coords(c: Option<&CoordPair>) -> (Option<String>, Option<String>) {
    match c {
        Some(c) => (Some(c.ra.to_string()), Some(c.dec.to_string())),
        None => (None, None),
    }
}

fn join_coords(ra: Option<String>, dec: Option<String>) -> Result<Option<CoordPair>, ReconError> {
    match (ra, dec) {
        (Some(ra), Some(dec)) => {
            let ra: Sexagesimal = ra.parse().map_err(store_err)?;
            let dec: Sexagesimal = dec.parse().map_err(store_err)?;
            Ok(Some(CoordPair { ra, dec }))
        }
        _ => Ok(None),
    }
}

/// Write the registry to a fresh database at `path`, replacing any file
/// already there.
pub fn save(registry: &StarRegistry, meta: &ReconMeta, path: &Path) -> Result<(), ReconError> {
    if path.exists() {
        std::fs::remove_file(path).map_err(|e| ReconError::Io(e.to_string()))?;
    }

    let mut conn = Connection::open(path).map_err(store_err)?;
    conn.execute_batch(SCHEMA).map_err(store_err)?;

    let tx = conn.transaction().map_err(store_err)?;
    {
        let mut meta_stmt = tx
            .prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")
            .map_err(store_err)?;
        for (key, value) in [
            ("format_version", SNAPSHOT_FORMAT_VERSION.to_string()),
            ("config_name", meta.config_name.clone()),
            ("engine_version", meta.engine_version.clone()),
            ("run_at", meta.run_at.clone()),
        ] {
            meta_stmt.execute(params![key, value]).map_err(store_err)?;
        }

        let mut stmt = tx
            .prepare(
                "INSERT INTO stars (name, ra, dec, anchor_ra, anchor_dec, mag, dist, type, mass, radius, temp, age, metall, planets, alt_names, provenance) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            )
            .map_err(store_err)?;

        for (_, r) in registry.iter() {
            let (ra, dec) = split_coords(r.coordinates.as_ref());
            let (anchor_ra, anchor_dec) = split_coords(r.crossid_anchor.as_ref());
            let provenance = serde_json::to_string(&r.provenance).map_err(store_err)?;
            stmt.execute(params![
                r.name,
                ra,
                dec,
                anchor_ra,
                anchor_dec,
                r.magnitude,
                r.distance_ly,
                r.spectral_type,
                r.mass,
                r.radius,
                r.temperature,
                r.age,
                r.metallicity,
                r.planets as i64,
                r.alternate_names.join("|"),
                provenance,
            ])
            .map_err(|e| ReconError::Store(format!("insert star '{}' failed: {e}", r.name)))?;
        }
    }
    tx.commit().map_err(store_err)?;

    log::info!("saved {} stars to {}", registry.len(), path.display());
    Ok(())
}

/// Read a snapshot written by [`save`].
pub fn load(path: &Path) -> Result<Snapshot, ReconError> {
    if !path.exists() {
        return Err(ReconError::Io(format!("{} does not exist", path.display())));
    }
    let conn = Connection::open(path).map_err(store_err)?;

    let meta_value = |key: &str| -> String {
        conn.query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| row.get(0))
            .unwrap_or_default()
    };

    let version: u32 = meta_value("format_version").parse().unwrap_or(0);
    if version > SNAPSHOT_FORMAT_VERSION {
        return Err(ReconError::Store(format!(
            "snapshot format {version} is newer than supported ({SNAPSHOT_FORMAT_VERSION})"
        )));
    }

    let meta = ReconMeta {
        config_name: meta_value("config_name"),
        engine_version: meta_value("engine_version"),
        run_at: meta_value("run_at"),
    };

    let mut stmt = conn
        .prepare(
            "SELECT name, ra, dec, anchor_ra, anchor_dec, mag, dist, type, mass, radius, temp, age, metall, planets, alt_names, provenance FROM stars ORDER BY rowid",
        )
        .map_err(store_err)?;

    type Row = (
        String,
        [Option<String>; 4],
        [Option<f64>; 2],
        Option<String>,
        [Option<f64>; 5],
        i64,
        String,
        String,
    );

    let rows = stmt
        .query_map([], |row| -> rusqlite::Result<Row> {
            Ok((
                row.get(0)?,
                [row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?],
                [row.get(5)?, row.get(6)?],
                row.get(7)?,
                [row.get(8)?, row.get(9)?, row.get(10)?, row.get(11)?, row.get(12)?],
                row.get(13)?,
                row.get(14)?,
                row.get(15)?,
            ))
        })
        .map_err(store_err)?;

    let mut registry = StarRegistry::new();
    for row in rows {
        let (name, [ra, dec, anchor_ra, anchor_dec], [mag, dist], spectral_type, [mass, radius, temp, age, metall], planets, alt_names, provenance) =
            row.map_err(store_err)?;

        let provenance: BTreeMap<Field, SourceId> =
            serde_json::from_str(&provenance).map_err(store_err)?;

        let mut record = StarRecord::new(name, planets.max(0) as u32);
        record.coordinates = join_coords(ra, dec)?;
        record.crossid_anchor = join_coords(anchor_ra, anchor_dec)?;
        record.magnitude = mag;
        record.distance_ly = dist;
        record.spectral_type = spectral_type;
        record.mass = mass;
        record.radius = radius;
        record.temperature = temp;
        record.age = age;
        record.metallicity = metall;
        record.alternate_names = alt_names
            .split('|')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        record.provenance = provenance;

        if let Err(existing) = registry.insert(record) {
            log::warn!("duplicate star '{}' in snapshot", registry.get(existing).name);
        }
    }

    Ok(Snapshot { meta, registry })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn meta() -> ReconMeta {
        ReconMeta {
            config_name: "Sistemi multiplanetari".into(),
            engine_version: "0.3.0".into(),
            run_at: "2026-01-15T00:00:00+00:00".into(),
        }
    }

    fn gliese_876() -> StarRecord {
        let mut r = StarRecord::new("Gliese 876", 4);
        r.coordinates = CoordPair::from_degrees(343.3197, -14.2637);
        r.crossid_anchor = CoordPair::from_degrees(343.3205, -14.2650);
        r.distance_ly = Some(15.2);
        r.spectral_type = Some("M4V".into());
        r.mass = Some(0.37);
        r.alternate_names = vec!["GJ 876".into(), "IL Aqr".into()];
        r.provenance.insert(Field::Distance, SourceId::CrossId);
        r.provenance.insert(Field::Name, SourceId::Encyclopedia);
        r
    }

    #[test]
    fn save_load_preserves_records() {
        let mut registry = StarRegistry::new();
        registry.insert(gliese_876()).unwrap();
        registry.insert(StarRecord::new("Kepler-90", 8)).unwrap();

        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        save(&registry, &meta(), temp_file.path()).expect("save should succeed");
        let snapshot = load(temp_file.path()).expect("load should succeed");

        assert_eq!(snapshot.meta.config_name, "Sistemi multiplanetari");
        assert_eq!(snapshot.meta.run_at, "2026-01-15T00:00:00+00:00");
        assert_eq!(snapshot.registry.len(), 2);

        let id = snapshot.registry.find_by_name("Gliese 876").unwrap();
        assert_eq!(snapshot.registry.get(id), &gliese_876());

        let k90 = snapshot.registry.get(snapshot.registry.find_by_name("Kepler-90").unwrap());
        assert_eq!(k90.coordinates, None);
        assert!(k90.alternate_names.is_empty());
    }

    #[test]
    fn save_replaces_existing_file() {
        let temp_file = NamedTempFile::with_suffix(".db").unwrap();
        let mut first = StarRegistry::new();
        first.insert(StarRecord::new("HD 1", 2)).unwrap();
        save(&first, &meta(), temp_file.path()).unwrap();

        let mut second = StarRegistry::new();
        second.insert(StarRecord::new("HD 2", 3)).unwrap();
        save(&second, &meta(), temp_file.path()).unwrap();

        let snapshot = load(temp_file.path()).unwrap();
        assert_eq!(snapshot.registry.len(), 1);
        assert!(snapshot.registry.find_by_name("HD 2").is_some());
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("nope.db")).unwrap_err();
        assert!(matches!(err, ReconError::Io(_)));
    }
}
