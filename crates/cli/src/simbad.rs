//! SIMBAD TAP adapter: cross-identification rows over ADQL.
//!
//! Every query joins the same five tables and returns one row per
//! (object, distance measurement); rows are collapsed to one per `main_id`,
//! first measurement first.

use std::collections::HashSet;

use serde::Deserialize;

use starmerge_recon::{CrossIdRow, CrossIdService, LookupError};

use crate::exit_codes;
use crate::fetch::FetchClient;
use crate::CliError;

/// Names per bulk query; keeps the ADQL below the service's size limit.
const BULK_BATCH: usize = 200;

const SELECT: &str = "SELECT b.main_id, b.ra, b.dec, d.dist, d.unit, f.V, i.ids \
FROM ident AS n \
JOIN basic AS b ON b.oid = n.oidref \
JOIN ids AS i ON i.oidref = b.oid \
LEFT JOIN mesDistance AS d ON d.oidref = b.oid \
LEFT JOIN allfluxes AS f ON f.oidref = b.oid";

// ── ADQL ────────────────────────────────────────────────────────────

/// Quote a string for ADQL (`'` doubled).
pub fn adql_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub fn bulk_query(names: &[String]) -> String {
    let list = names.iter().map(|n| adql_literal(n)).collect::<Vec<_>>().join(", ");
    format!("{SELECT} WHERE n.id IN ({list})")
}

pub fn object_query(name: &str) -> String {
    format!("{SELECT} WHERE n.id = {}", adql_literal(name))
}

// ── TAP JSON ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TapResponse {
    metadata: Vec<TapColumn>,
    data: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct TapColumn {
    name: String,
}

/// Decode a TAP JSON result (`metadata` + `data`) into rows.
pub fn parse_tap_json(text: &str) -> Result<Vec<CrossIdRow>, String> {
    let resp: TapResponse =
        serde_json::from_str(text).map_err(|e| format!("invalid TAP response: {e}"))?;

    let column = |name: &str| resp.metadata.iter().position(|c| c.name.eq_ignore_ascii_case(name));
    let main_id = column("main_id").ok_or("TAP response has no main_id column")?;
    let ra = column("ra");
    let dec = column("dec");
    let dist = column("dist");
    let unit = column("unit");
    let mag = column("V");
    let ids = column("ids");

    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for record in &resp.data {
        let text_at = |i: Option<usize>| {
            i.and_then(|i| record.get(i))
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let number_at = |i: Option<usize>| i.and_then(|i| record.get(i)).and_then(|v| v.as_f64());

        let Some(id) = text_at(Some(main_id)) else {
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }
        rows.push(CrossIdRow {
            main_id: id,
            ra_deg: number_at(ra),
            dec_deg: number_at(dec),
            distance: number_at(dist),
            distance_unit: text_at(unit),
            magnitude: number_at(mag),
            ids: text_at(ids).unwrap_or_default(),
        });
    }
    Ok(rows)
}

fn lookup_error(err: CliError) -> LookupError {
    match err.code {
        exit_codes::EXIT_FETCH_UPSTREAM | exit_codes::EXIT_FETCH_RATE_LIMIT => {
            LookupError::Transient(err.message)
        }
        _ => LookupError::Permanent(err.message),
    }
}

// ── Service ─────────────────────────────────────────────────────────

pub struct SimbadTap {
    client: FetchClient,
    endpoint: String,
}

impl SimbadTap {
    pub fn new(client: FetchClient, endpoint: impl Into<String>) -> Self {
        Self { client, endpoint: endpoint.into() }
    }

    /// Bulk batches retry at the HTTP layer. Single-object queries go out
    /// once; the matcher owns their retry budget.
    fn query(&self, adql: &str, retry: bool) -> Result<Vec<CrossIdRow>, LookupError> {
        log::debug!("{}: {adql}", self.client.source_name());
        let build = |http: &reqwest::blocking::Client| {
            http.post(&self.endpoint).form(&[
                ("request", "doQuery"),
                ("lang", "adql"),
                ("format", "json"),
                ("query", adql),
            ])
        };
        let text = if retry {
            self.client.request_with_retry(build)
        } else {
            self.client.request_once(build)
        }
        .map_err(lookup_error)?;
        parse_tap_json(&text).map_err(LookupError::Permanent)
    }
}

impl CrossIdService for SimbadTap {
    fn fetch_bulk(&mut self, names: &[String]) -> Result<Vec<CrossIdRow>, LookupError> {
        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for (i, batch) in names.chunks(BULK_BATCH).enumerate() {
            log::info!(
                "{}: bulk batch {} ({} names)",
                self.client.source_name(),
                i + 1,
                batch.len()
            );
            for row in self.query(&bulk_query(batch), true)? {
                if seen.insert(row.main_id.clone()) {
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }

    fn query_object(&mut self, name: &str) -> Result<Option<CrossIdRow>, LookupError> {
        Ok(self.query(&object_query(name), false)?.into_iter().next())
    }
}

/// Cross-identification as `run` wires it: a local bulk file when one was
/// given, SIMBAD for everything else unless running offline.
pub struct CatalogSource {
    local: Option<Vec<CrossIdRow>>,
    online: Option<SimbadTap>,
}

impl CatalogSource {
    pub fn new(local: Option<Vec<CrossIdRow>>, online: Option<SimbadTap>) -> Self {
        Self { local, online }
    }
}

impl CrossIdService for CatalogSource {
    fn fetch_bulk(&mut self, names: &[String]) -> Result<Vec<CrossIdRow>, LookupError> {
        if let Some(rows) = self.local.take() {
            return Ok(rows);
        }
        match self.online.as_mut() {
            Some(tap) => tap.fetch_bulk(names),
            None => Err(LookupError::Permanent("no cross-identification source".into())),
        }
    }

    fn query_object(&mut self, name: &str) -> Result<Option<CrossIdRow>, LookupError> {
        match self.online.as_mut() {
            Some(tap) => tap.query_object(name),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn tap(server: &MockServer) -> SimbadTap {
        let client = FetchClient::new("SIMBAD").unwrap().with_backoff(Duration::ZERO);
        SimbadTap::new(client, server.url("/sim-tap/sync"))
    }

    fn gj876_response() -> serde_json::Value {
        serde_json::json!({
            "metadata": [
                {"name": "main_id"}, {"name": "ra"}, {"name": "dec"},
                {"name": "dist"}, {"name": "unit"}, {"name": "V"}, {"name": "ids"}
            ],
            "data": [
                ["* GJ 876", 343.3197, -14.2637, 4.67, "pc", 10.17, "GJ 876|IL Aqr|G 156-57"],
                ["* GJ 876", 343.3197, -14.2637, 4.69, "pc", 10.17, "GJ 876|IL Aqr|G 156-57"],
                ["Kepler-11", 297.1151, 41.9091, 0.613, "kpc", null, "KOI-157|Kepler-11"]
            ]
        })
    }

    #[test]
    fn quotes_are_doubled() {
        assert_eq!(adql_literal("Teegarden's Star"), "'Teegarden''s Star'");
        assert!(object_query("Teegarden's Star").ends_with("WHERE n.id = 'Teegarden''s Star'"));
    }

    #[test]
    fn bulk_query_lists_every_name() {
        let q = bulk_query(&["GJ 876".into(), "Kepler-11".into()]);
        assert!(q.starts_with("SELECT b.main_id"));
        assert!(q.contains("LEFT JOIN mesDistance"));
        assert!(q.ends_with("WHERE n.id IN ('GJ 876', 'Kepler-11')"));
    }

    #[test]
    fn tap_rows_collapse_per_object() {
        let rows = parse_tap_json(&gj876_response().to_string()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].main_id, "* GJ 876");
        assert_eq!(rows[0].distance, Some(4.67));
        assert_eq!(rows[0].ids, "GJ 876|IL Aqr|G 156-57");
        assert_eq!(rows[1].distance_unit.as_deref(), Some("kpc"));
        assert_eq!(rows[1].magnitude, None);
        assert_eq!(rows[1].distance_pc(), Some(613.0));
    }

    #[test]
    fn tap_without_main_id_is_rejected() {
        let body = r#"{"metadata": [{"name": "ra"}], "data": []}"#;
        assert!(parse_tap_json(body).unwrap_err().contains("main_id"));
        assert!(parse_tap_json("<VOTABLE/>").unwrap_err().contains("invalid TAP response"));
    }

    #[test]
    fn bulk_fetch_posts_adql() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/sim-tap/sync");
            then.status(200).json_body(gj876_response());
        });

        let rows = tap(&server).fetch_bulk(&["GJ 876".into(), "Kepler-11".into()]).unwrap();
        assert_eq!(rows.len(), 2);
        mock.assert_calls(1);
    }

    #[test]
    fn unknown_object_is_none() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/sim-tap/sync");
            then.status(200).json_body(serde_json::json!({
                "metadata": [{"name": "main_id"}],
                "data": []
            }));
        });

        assert_eq!(tap(&server).query_object("Nowhere").unwrap(), None);
    }

    #[test]
    fn failures_are_classified() {
        let server = MockServer::start();
        let down = server.mock(|when, then| {
            when.method(POST).path("/sim-tap/sync");
            then.status(502);
        });
        assert!(matches!(tap(&server).query_object("GJ 876"), Err(LookupError::Transient(_))));
        // One HTTP attempt per object query; bulk batches keep the full budget.
        down.assert_calls(1);
        assert!(matches!(tap(&server).fetch_bulk(&["GJ 876".into()]), Err(LookupError::Transient(_))));
        down.assert_calls(1 + 4);

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/sim-tap/sync");
            then.status(400).body("ADQL syntax error");
        });
        assert!(matches!(tap(&server).query_object("GJ 876"), Err(LookupError::Permanent(_))));
    }

    #[test]
    fn local_rows_are_served_once_then_online() {
        let local = vec![CrossIdRow { main_id: "HD 1".into(), ..Default::default() }];
        let mut source = CatalogSource::new(Some(local), None);
        assert_eq!(source.fetch_bulk(&[]).unwrap().len(), 1);
        assert!(source.fetch_bulk(&[]).is_err());
        assert_eq!(source.query_object("HD 1").unwrap(), None);
    }

    proptest! {
        #[test]
        fn literal_unquotes_to_input(s in ".*") {
            let lit = adql_literal(&s);
            prop_assert!(lit.starts_with('\'') && lit.ends_with('\''));
            let inner = &lit[1..lit.len() - 1];
            prop_assert_eq!(inner.replace("''", "'"), s);
        }
    }
}
