//! Shell contract of the `starmerge` binary: exit codes, stdout/stderr split,
//! and the files `run` writes.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use httpmock::prelude::*;

fn starmerge() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_starmerge"));
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
    // Keep a developer's environment from redirecting downloads.
    cmd.env_remove("STARMERGE_SURVEY_URL");
    cmd.env_remove("STARMERGE_ENCYCLOPEDIA_URL");
    cmd.env_remove("STARMERGE_TAP_URL");
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../recon/tests/fixtures").join(name)
}

fn fixture_text(name: &str) -> String {
    std::fs::read_to_string(fixture(name)).unwrap()
}

fn code(output: &Output) -> i32 {
    output.status.code().expect("terminated by signal")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn offline_run(extra: &[&str]) -> Output {
    let mut cmd = starmerge();
    cmd.arg("run")
        .arg("--offline")
        .arg("--config")
        .arg(fixture("recon.toml"))
        .arg("--survey")
        .arg(fixture("survey.csv"))
        .arg("--crossid")
        .arg(fixture("crossid.csv"))
        .arg("--encyclopedia")
        .arg(fixture("encyclopedia.txt"))
        .args(extra);
    cmd.output().expect("failed to run starmerge")
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[test]
fn offline_run_prints_report_json_on_stdout() {
    let output = offline_run(&["--json"]);
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["meta"]["config_name"], "Fixture run");
    assert_eq!(report["summary"]["published"], 5);
    assert_eq!(report["stars"][0]["name"], "Gliese 876");
    // Teegarden's Star needs the online query, which --offline skips.
    assert_eq!(report["summary"]["matches"]["unresolved"], 1);

    let err = stderr(&output);
    assert!(err.contains("Fixture run: 5 systems published"), "{err}");
}

#[test]
fn human_summary_keeps_stdout_empty() {
    let output = offline_run(&[]);
    assert_eq!(code(&output), 0);
    assert!(output.stdout.is_empty());
    assert!(stderr(&output).contains("merge conflicts"));
}

#[test]
fn run_writes_table_snapshot_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let table = dir.path().join("tabella.wiki");
    let db = dir.path().join("stars.db");
    let report = dir.path().join("run.json");

    let output = offline_run(&[
        "--output",
        table.to_str().unwrap(),
        "--db",
        db.to_str().unwrap(),
        "--report",
        report.to_str().unwrap(),
    ]);
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));

    let wiki = std::fs::read_to_string(&table).unwrap();
    assert!(wiki.starts_with("{{Progetto sistemi multiplanetari|con2pianeti="));
    assert!(wiki.contains("|Stella=[[Gliese 876]]||Ascensione retta={{RA|22|53|17}}"));
    assert!(wiki.trim_end().ends_with("<noinclude>{{Stelle con pianeti extrasolari confermati/Bottom}}</noinclude>"));

    let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(report["summary"]["merge_conflicts"], 1);

    // Alternate names from the cross-identification survive the snapshot.
    let shown = starmerge()
        .args(["show", db.to_str().unwrap(), "IL Aqr"])
        .output()
        .unwrap();
    assert_eq!(code(&shown), 0, "stderr: {}", stderr(&shown));
    let star: serde_json::Value = serde_json::from_slice(&shown.stdout).unwrap();
    assert_eq!(star["name"], "Gliese 876");
    assert_eq!(star["planets"], 4);
    assert!(stderr(&shown).contains("Fixture run"));
}

#[test]
fn strict_run_with_conflicts_exits_6() {
    let output = offline_run(&["--strict"]);
    assert_eq!(code(&output), 6);
    assert!(stderr(&output).contains("review required: 1 merge conflicts, 1 unresolved stars"));
}

#[test]
fn offline_without_crossid_is_a_usage_error() {
    let output = starmerge()
        .arg("run")
        .arg("--offline")
        .arg("--survey")
        .arg(fixture("survey.csv"))
        .output()
        .unwrap();
    assert_eq!(code(&output), 2);
    assert!(stderr(&output).contains("--offline needs both --survey and --crossid"));
}

#[test]
fn invalid_config_exits_3() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "[merge]\nprecedence = [\"survey\", \"survey\", \"crossid\"]\n").unwrap();

    let output = starmerge()
        .arg("run")
        .arg("--offline")
        .arg("--config")
        .arg(&config)
        .arg("--survey")
        .arg(fixture("survey.csv"))
        .arg("--crossid")
        .arg(fixture("crossid.csv"))
        .output()
        .unwrap();
    assert_eq!(code(&output), 3);
    assert!(stderr(&output).contains("merge.precedence"));
}

#[test]
fn truncated_survey_exits_4() {
    let dir = tempfile::tempdir().unwrap();
    let survey = dir.path().join("short.csv");
    std::fs::write(&survey, "# name,planet_status\nHD 1 b,Confirmed\n").unwrap();

    let output = starmerge()
        .arg("run")
        .arg("--offline")
        .arg("--survey")
        .arg(&survey)
        .arg("--crossid")
        .arg(fixture("crossid.csv"))
        .output()
        .unwrap();
    assert_eq!(code(&output), 4);
    assert!(stderr(&output).contains("fatal ingest failure (survey)"));
}

// ---------------------------------------------------------------------------
// run against mocked upstreams
// ---------------------------------------------------------------------------

#[test]
fn downloads_sources_and_queries_tap() {
    let server = MockServer::start();
    let survey = server.mock(|when, then| {
        when.method(GET).path("/catalog/csv/");
        then.status(200).body(fixture_text("survey.csv"));
    });
    let encyclopedia = server.mock(|when, then| {
        when.method(GET).path("/w/index.php");
        then.status(200).body(fixture_text("encyclopedia.txt"));
    });
    // Bulk rows come from the local file; single-object queries find nothing.
    let tap = server.mock(|when, then| {
        when.method(POST).path("/sim-tap/sync");
        then.status(200).json_body(serde_json::json!({
            "metadata": [{"name": "main_id"}, {"name": "ra"}, {"name": "dec"}],
            "data": []
        }));
    });

    let output = starmerge()
        .arg("run")
        .arg("--config")
        .arg(fixture("recon.toml"))
        .arg("--crossid")
        .arg(fixture("crossid.csv"))
        .arg("--json")
        .env("STARMERGE_SURVEY_URL", server.url("/catalog/csv/"))
        .env("STARMERGE_ENCYCLOPEDIA_URL", server.url("/w/index.php"))
        .env("STARMERGE_TAP_URL", server.url("/sim-tap/sync"))
        .output()
        .unwrap();
    assert_eq!(code(&output), 0, "stderr: {}", stderr(&output));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["summary"]["published"], 5);
    assert_eq!(report["summary"]["not_in_registry"], 1);
    survey.assert_calls(1);
    encyclopedia.assert_calls(1);
    assert!(tap.calls() >= 1);
}

#[test]
fn rejected_bulk_query_is_fatal() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/sim-tap/sync");
        then.status(400).body("ADQL syntax error");
    });

    let output = starmerge()
        .arg("run")
        .arg("--survey")
        .arg(fixture("survey.csv"))
        .arg("--encyclopedia")
        .arg(fixture("encyclopedia.txt"))
        .env("STARMERGE_TAP_URL", server.url("/sim-tap/sync"))
        .output()
        .unwrap();
    assert_eq!(code(&output), 4);
    let err = stderr(&output);
    assert!(err.contains("fatal ingest failure (crossid)"), "{err}");
    assert!(err.contains("hint:"));
}

#[test]
fn missing_survey_download_uses_fetch_code() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/catalog/csv/");
        then.status(404);
    });

    let output = starmerge()
        .args(["run", "--survey-url", &server.url("/catalog/csv/")])
        .output()
        .unwrap();
    assert_eq!(code(&output), 54);
    assert!(stderr(&output).contains("survey error (404)"));
}

// ---------------------------------------------------------------------------
// small commands
// ---------------------------------------------------------------------------

#[test]
fn validate_reports_ok() {
    let output = starmerge().arg("validate").arg(fixture("recon.toml")).output().unwrap();
    assert_eq!(code(&output), 0);
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains(": ok"));
    assert!(stdout.contains("survey > crossid > encyclopedia"));
}

#[test]
fn coords_prints_triple_and_key() {
    let output = starmerge().args(["coords", "164.1221", "--axis", "ra"]).output().unwrap();
    assert_eq!(code(&output), 0);
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "10|56|29\t39389\n");

    let output = starmerge().args(["coords", "-5.0525", "--axis", "dec"]).output().unwrap();
    assert_eq!(code(&output), 0);
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "-5|3|9\t-18189\n");
}

#[test]
fn normalize_prints_key_and_display() {
    let output = starmerge().args(["normalize", "NAME Gliese 876"]).output().unwrap();
    assert_eq!(code(&output), 0);
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "search key: GJ 876\ndisplay:    Gliese 876\n"
    );
}

#[test]
fn show_unknown_star_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("stars.db");
    assert_eq!(code(&offline_run(&["--db", db.to_str().unwrap()])), 0);

    let output = starmerge().args(["show", db.to_str().unwrap(), "Kepler-90"]).output().unwrap();
    assert_eq!(code(&output), 1);
    assert!(stderr(&output).contains("no star named 'Kepler-90'"));
}

#[test]
fn show_missing_snapshot_exits_5() {
    let output = starmerge().args(["show", "/nonexistent/stars.db", "HD 1"]).output().unwrap();
    assert_eq!(code(&output), 5);
}
