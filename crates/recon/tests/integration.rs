use std::path::PathBuf;

use starmerge_recon::config::ReconConfig;
use starmerge_recon::engine::{run, Pipeline};
use starmerge_recon::evidence::EventLog;
use starmerge_recon::index::CrossIdRow;
use starmerge_recon::ingest::parse_crossid_csv;
use starmerge_recon::matcher::{CrossIdService, LookupError, OfflineCrossId};
use starmerge_recon::model::{Field, ReconEvent, ReconInput, ReconResult, SourceId};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture(name: &str) -> String {
    let path = fixtures_dir().join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()))
}

fn crossid_rows() -> Vec<CrossIdRow> {
    parse_crossid_csv(&fixture("crossid.csv"), &mut EventLog::new()).unwrap()
}

/// Bulk download misses some objects that single-object queries still find.
struct PartialBulk {
    bulk: Vec<CrossIdRow>,
    online: OfflineCrossId,
    queries: Vec<String>,
}

impl PartialBulk {
    fn without(main_ids: &[&str]) -> Self {
        let all = crossid_rows();
        Self {
            bulk: all.iter().filter(|r| !main_ids.contains(&r.main_id.as_str())).cloned().collect(),
            online: OfflineCrossId::new(all),
            queries: Vec::new(),
        }
    }
}

impl CrossIdService for PartialBulk {
    fn fetch_bulk(&mut self, _names: &[String]) -> Result<Vec<CrossIdRow>, LookupError> {
        Ok(self.bulk.clone())
    }

    fn query_object(&mut self, name: &str) -> Result<Option<CrossIdRow>, LookupError> {
        self.queries.push(name.to_string());
        self.online.query_object(name)
    }
}

struct Unreachable;

impl CrossIdService for Unreachable {
    fn fetch_bulk(&mut self, _names: &[String]) -> Result<Vec<CrossIdRow>, LookupError> {
        Err(LookupError::Permanent("connection refused".into()))
    }

    fn query_object(&mut self, _name: &str) -> Result<Option<CrossIdRow>, LookupError> {
        Err(LookupError::Permanent("connection refused".into()))
    }
}

fn fixture_run(service: &mut dyn CrossIdService) -> ReconResult {
    let config = ReconConfig::from_toml(&fixture("recon.toml")).unwrap();
    let input = ReconInput {
        survey: fixture("survey.csv"),
        encyclopedia: Some(fixture("encyclopedia.txt")),
    };
    run(&config, &input, service).unwrap()
}

fn star<'a>(result: &'a ReconResult, name: &str) -> &'a starmerge_recon::StarRecord {
    result
        .stars
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("'{name}' not published"))
}

// -------------------------------------------------------------------------
// End to end
// -------------------------------------------------------------------------

#[test]
fn publishes_multi_planet_systems_in_name_order() {
    let mut service = PartialBulk::without(&["GJ 9066"]);
    let result = fixture_run(&mut service);

    let names: Vec<&str> = result.stars.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Gliese 876", "HD 20", "HD Example", "Kepler-11", "Teegarden's Star"]
    );
    assert_eq!(result.meta.config_name, "Fixture run");
    assert_eq!(result.summary.registered, 5);
    assert_eq!(result.summary.published, 5);
}

#[test]
fn two_planet_host_is_one_record() {
    let result = fixture_run(&mut PartialBulk::without(&[]));
    let hd = star(&result, "HD Example");
    assert_eq!(hd.planets, 2);
    assert_eq!(hd.distance_ly, Some(239.1));
    assert_eq!(hd.coordinates.unwrap().ra.to_string(), "10|56|29");
    assert_eq!(hd.coordinates.unwrap().dec.to_string(), "7|0|52");
    assert_eq!(hd.spectral_type.as_deref(), Some("G5"));
    assert_eq!(hd.provenance.get(&Field::Distance), Some(&SourceId::Survey));
}

#[test]
fn single_planet_and_brown_dwarf_hosts_are_absent() {
    let result = fixture_run(&mut PartialBulk::without(&[]));
    assert!(result.stars.iter().all(|s| s.name != "Lonely"));
    // HD 2 c is above the brown-dwarf limit, leaving one planet.
    assert!(result.stars.iter().all(|s| s.name != "HD 2"));
    assert!(result.stars.iter().all(|s| s.name != "Sun"));
    assert_eq!(result.summary.excluded_companions, 1);
    assert!(result.events.iter().any(|e| matches!(
        e,
        ReconEvent::ExcludedCompanion { planet, .. } if planet == "HD 2 c"
    )));
}

#[test]
fn encyclopedia_name_wins_and_fills_gaps() {
    let result = fixture_run(&mut PartialBulk::without(&[]));
    let gj = star(&result, "Gliese 876");
    assert_eq!(gj.planets, 4);
    assert_eq!(gj.spectral_type.as_deref(), Some("M4V"));
    // survey value kept, encyclopedia only fills blanks
    assert_eq!(gj.mass, Some(0.37));
    assert_eq!(gj.radius, Some(0.36));
    assert_eq!(gj.distance_ly, Some(15.2));
    assert!(gj.alternate_names.iter().any(|n| n == "GJ 876"));
    assert!(gj.alternate_names.iter().any(|n| n == "IL Aqr"));
}

#[test]
fn distance_disagreement_is_reported_not_applied() {
    let result = fixture_run(&mut PartialBulk::without(&[]));
    let hd20 = star(&result, "HD 20");
    assert_eq!(hd20.distance_ly, Some(1304.6));

    let conflicts: Vec<_> = result
        .events
        .iter()
        .filter_map(|e| match e {
            ReconEvent::MergeConflict(c) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].star, "HD 20");
    assert_eq!(conflicts[0].rejected_ly, 100.0);
    assert_eq!(conflicts[0].rejected_source, SourceId::Encyclopedia);
    assert!(result.needs_review());
}

#[test]
fn disambiguation_keeps_kepler_11_apart_from_kepler_110() {
    let result = fixture_run(&mut PartialBulk::without(&[]));
    let k11 = star(&result, "Kepler-11");
    assert_eq!(k11.planets, 6);
    assert!(k11.alternate_names.iter().any(|n| n == "KOI-157"));
    assert!(!k11.alternate_names.iter().any(|n| n == "KOI-124"));
}

#[test]
fn online_fallback_resolves_missing_bulk_entry() {
    let mut service = PartialBulk::without(&["GJ 9066"]);
    let result = fixture_run(&mut service);
    assert_eq!(result.summary.matches.online, 1);
    assert_eq!(result.summary.matches.index, 4);
    assert_eq!(result.summary.matches.unresolved, 0);
    assert_eq!(service.queries.first().map(String::as_str), Some("Teegarden's Star"));

    let teegarden = star(&result, "Teegarden's Star");
    assert!(teegarden.alternate_names.iter().any(|n| n == "GJ 9066"));
    assert!(teegarden.crossid_anchor.is_some());
}

#[test]
fn encyclopedia_problems_are_events() {
    let result = fixture_run(&mut PartialBulk::without(&[]));
    assert_eq!(result.summary.not_in_registry, 1);
    assert_eq!(result.summary.rows_skipped, 1);
    assert!(result.events.iter().any(|e| matches!(
        e,
        ReconEvent::NotInRegistry { name, .. } if name == "Nowhere"
    )));
}

#[test]
fn unreachable_crossid_service_is_fatal() {
    let config = ReconConfig::default();
    let input = ReconInput { survey: fixture("survey.csv"), encyclopedia: None };
    let err = run(&config, &input, &mut Unreachable).unwrap_err();
    assert!(matches!(err, starmerge_recon::ReconError::FatalIngest { .. }));
}

#[test]
fn result_serializes_to_json() {
    let result = fixture_run(&mut PartialBulk::without(&[]));
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["summary"]["published"], 5);
    assert_eq!(json["stars"][0]["name"], "Gliese 876");
    assert_eq!(json["stars"][0]["coordinates"]["ra"], "22|53|17");
    assert!(json["events"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["kind"] == "merge_conflict"));
}

// -------------------------------------------------------------------------
// Stage by stage
// -------------------------------------------------------------------------

#[test]
fn stages_can_run_individually() {
    let config = ReconConfig::default();
    let mut pipeline = Pipeline::new(&config);
    assert_eq!(pipeline.ingest_survey(&fixture("survey.csv")).unwrap(), 5);
    assert_eq!(pipeline.ingest_crossid(&crossid_rows()), 6);

    let mut offline = OfflineCrossId::empty();
    pipeline.resolve_registry(&mut offline);
    // Teegarden's Star is only reachable online.
    assert_eq!(pipeline.matches().index, 4);
    assert_eq!(pipeline.matches().unresolved, 1);

    let folded = pipeline.fold_encyclopedia(&fixture("encyclopedia.txt"), &mut offline);
    assert_eq!(folded, 2);

    let registry = pipeline.into_registry();
    assert!(registry.find_by_name("Gliese 876").is_some());
    assert!(registry.find_by_name("GJ 876").is_none());
}

#[test]
fn crossid_resolution_stage_is_recorded() {
    let config = ReconConfig::default();
    let mut pipeline = Pipeline::new(&config);
    pipeline.ingest_survey(&fixture("survey.csv")).unwrap();
    pipeline.resolve_registry(&mut OfflineCrossId::new(crossid_rows()));
    // Empty index: everything goes online.
    assert_eq!(pipeline.matches().online, 5);
    assert_eq!(pipeline.index().len(), 5);
    assert!(pipeline
        .events()
        .iter()
        .all(|e| !matches!(e, ReconEvent::UnresolvedStar { .. })));
}
