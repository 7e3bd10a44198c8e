//! `starmerge run` / `validate` / `show`: the reconciliation commands.

use std::path::{Path, PathBuf};

use clap::Args;

use starmerge_io::{store, wikitable};
use starmerge_recon::evidence::EventLog;
use starmerge_recon::ingest::parse_crossid_csv;
use starmerge_recon::{OverrideTable, ReconConfig, ReconInput, ReconResult, StarRecord, StarRegistry};

use crate::exit_codes::{EXIT_ERROR, EXIT_INGEST, EXIT_INVALID_CONFIG, EXIT_OUTPUT, EXIT_REVIEW};
use crate::fetch::{self, FetchClient};
use crate::simbad::{CatalogSource, SimbadTap};
use crate::CliError;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run config (TOML). Built-in defaults when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Planet survey CSV. Downloaded from --survey-url when omitted
    #[arg(long)]
    pub survey: Option<PathBuf>,

    /// Cross-identification CSV (main_id,ra,dec,dist,unit,mag,ids). Queried from SIMBAD when omitted
    #[arg(long)]
    pub crossid: Option<PathBuf>,

    /// Encyclopedia page markup. Downloaded from --encyclopedia-url when omitted
    #[arg(long)]
    pub encyclopedia: Option<PathBuf>,

    /// Never touch the network (needs --survey and --crossid; no encyclopedia unless given)
    #[arg(long)]
    pub offline: bool,

    /// Extra peculiar-name overrides (TOML table), merged over the config's
    #[arg(long)]
    pub overrides: Option<PathBuf>,

    /// Write the publication table here
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Save the full registry as a SQLite snapshot
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Output the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Write the run report JSON to a file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Exit 6 when the run has merge conflicts or unresolved stars
    #[arg(long)]
    pub strict: bool,

    #[arg(long, env = "STARMERGE_SURVEY_URL", default_value = fetch::DEFAULT_SURVEY_URL, hide_default_value = true)]
    pub survey_url: String,

    #[arg(long, env = "STARMERGE_ENCYCLOPEDIA_URL", default_value = fetch::DEFAULT_ENCYCLOPEDIA_URL, hide_default_value = true)]
    pub encyclopedia_url: String,

    #[arg(long, env = "STARMERGE_TAP_URL", default_value = fetch::DEFAULT_TAP_URL, hide_default_value = true)]
    pub tap_url: String,
}

/// Load a config file, or the defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<ReconConfig, CliError> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                CliError::new(EXIT_INVALID_CONFIG, format!("cannot read config {}: {e}", path.display()))
            })?;
            Ok(ReconConfig::from_toml(&text)?)
        }
        None => Ok(ReconConfig::default()),
    }
}

fn read_source(what: &str, path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path)
        .map_err(|e| CliError::new(EXIT_INGEST, format!("cannot read {what} {}: {e}", path.display())))
}

fn write_output(what: &str, path: &Path, contents: &str) -> Result<(), CliError> {
    std::fs::write(path, contents)
        .map_err(|e| CliError::new(EXIT_OUTPUT, format!("cannot write {what} {}: {e}", path.display())))?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    if args.offline && (args.survey.is_none() || args.crossid.is_none()) {
        return Err(CliError::usage("--offline needs both --survey and --crossid")
            .with_hint("download the sources once, then pass them as files"));
    }

    let mut config = load_config(args.config.as_deref())?;
    if let Some(path) = &args.overrides {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CliError::new(EXIT_INVALID_CONFIG, format!("cannot read overrides {}: {e}", path.display()))
        })?;
        let extra = OverrideTable::from_toml(&text)?;
        log::info!("loaded {} overrides from {}", extra.len(), path.display());
        config.overrides.extend(extra);
    }

    // Sources
    let survey = match &args.survey {
        Some(path) => read_source("survey", path)?,
        None => {
            let url = fetch::check_url("--survey-url", &args.survey_url)?;
            FetchClient::new("survey")?.get_text(url.as_str())?
        }
    };

    let encyclopedia = match (&args.encyclopedia, args.offline) {
        (Some(path), _) => Some(read_source("encyclopedia", path)?),
        (None, true) => None,
        (None, false) => {
            let url = fetch::check_url("--encyclopedia-url", &args.encyclopedia_url)?;
            Some(FetchClient::new("encyclopedia")?.get_text(url.as_str())?)
        }
    };

    let local_rows = match &args.crossid {
        Some(path) => {
            let mut parse_events = EventLog::new();
            let rows = parse_crossid_csv(&read_source("cross-identification file", path)?, &mut parse_events)?;
            if !parse_events.is_empty() {
                eprintln!("crossid: {} rows skipped", parse_events.len());
            }
            Some(rows)
        }
        None => None,
    };

    let online = if args.offline {
        None
    } else {
        let url = fetch::check_url("--tap-url", &args.tap_url)?;
        Some(SimbadTap::new(FetchClient::new("SIMBAD")?, url.as_str()))
    };
    let mut service = CatalogSource::new(local_rows, online);

    // Reconcile
    let input = ReconInput { survey, encyclopedia };
    let pipeline = starmerge_recon::execute(&config, &input, &mut service)?;
    let result = pipeline.finish();

    // Outputs
    if let Some(path) = &args.output {
        write_output("table", path, &wikitable::render(&result.stars))?;
    }

    if let Some(path) = &args.db {
        store::save(pipeline.registry(), &result.meta, path)?;
        eprintln!("wrote {}", path.display());
    }

    if args.json || args.report.is_some() {
        let json = serde_json::to_string_pretty(&result)
            .map_err(|e| CliError::new(EXIT_OUTPUT, format!("JSON serialization error: {e}")))?;
        if let Some(path) = &args.report {
            write_output("report", path, &json)?;
        }
        if args.json {
            println!("{json}");
        }
    }

    print_summary(&result);

    if args.strict && result.needs_review() {
        return Err(CliError::new(
            EXIT_REVIEW,
            format!(
                "review required: {} merge conflicts, {} unresolved stars",
                result.summary.merge_conflicts, result.summary.matches.unresolved,
            ),
        ));
    }

    Ok(())
}

/// Human summary on stderr.
fn print_summary(result: &ReconResult) {
    let s = &result.summary;
    eprintln!(
        "{}: {} systems published ({} stars registered, {} cross-id entries)",
        result.meta.config_name, s.published, s.registered, s.crossid_entries,
    );
    eprintln!(
        "matched: {} index, {} override, {} online, {} unresolved",
        s.matches.index, s.matches.override_table, s.matches.online, s.matches.unresolved,
    );
    eprintln!(
        "review: {} merge conflicts, {} ambiguous, {} not in registry, {} rows skipped, {} companions excluded",
        s.merge_conflicts, s.ambiguous, s.not_in_registry, s.rows_skipped, s.excluded_companions,
    );
}

pub fn cmd_validate(path: PathBuf) -> Result<(), CliError> {
    let config = load_config(Some(&path))?;
    let precedence: Vec<String> = config.merge.precedence.iter().map(|s| s.to_string()).collect();
    println!("{}: ok", path.display());
    println!("  name:       {}", config.name);
    println!("  precedence: {}", precedence.join(" > "));
    println!("  overrides:  {}", config.overrides.len());
    println!("  min planets: {}", config.output.min_planets);
    Ok(())
}

/// Exact canonical name first, then any alternate name.
fn find_star<'a>(registry: &'a StarRegistry, name: &str) -> Option<&'a StarRecord> {
    if let Some(id) = registry.find_by_name(name) {
        return Some(registry.get(id));
    }
    registry
        .iter()
        .map(|(_, record)| record)
        .find(|record| record.alternate_names.iter().any(|alt| alt == name))
}

pub fn cmd_show(db: PathBuf, name: String) -> Result<(), CliError> {
    let snapshot = store::load(&db)?;
    let run_at = chrono::DateTime::parse_from_rfc3339(&snapshot.meta.run_at)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|_| snapshot.meta.run_at.clone());
    eprintln!(
        "{} ({} stars, run {run_at})",
        snapshot.meta.config_name,
        snapshot.registry.len(),
    );

    let record = find_star(&snapshot.registry, &name)
        .ok_or_else(|| CliError::new(EXIT_ERROR, format!("no star named '{name}' in {}", db.display())))?;
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| CliError::new(EXIT_OUTPUT, format!("JSON serialization error: {e}")))?;
    println!("{json}");
    Ok(())
}
