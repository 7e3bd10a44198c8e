// starmerge CLI - multi-planet host star catalog reconciliation

mod exit_codes;
mod fetch;
mod recon;
mod simbad;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use starmerge_recon::coords::to_sexagesimal;
use starmerge_recon::{Axis, Normalizer, ReconError};

use exit_codes::{recon_exit_code, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "starmerge")]
#[command(about = "Merge planet survey, cross-identification and encyclopedia catalogs of multi-planet host stars")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the three catalogs and publish the multi-planet table
    #[command(after_help = "\
Examples:
  starmerge run --output tabella.wiki
  starmerge run --config recon.toml --db stars.db --report run.json
  starmerge run --offline --survey exoplanet.eu.csv --crossid simbad.csv --json
  starmerge run --overrides peculiar.toml --strict")]
    Run(recon::RunArgs),

    /// Validate a run config without running
    #[command(after_help = "\
Examples:
  starmerge validate recon.toml")]
    Validate {
        /// Path to the run config (TOML)
        config: PathBuf,
    },

    /// Convert decimal degrees to the sexagesimal triple used for joins
    #[command(after_help = "\
Examples:
  starmerge coords 164.1221 --axis ra
  starmerge coords -5.0525 --axis dec")]
    Coords {
        /// Angle in decimal degrees
        #[arg(allow_negative_numbers = true)]
        degrees: f64,

        #[arg(long, value_enum)]
        axis: AxisArg,
    },

    /// Show the search key and display form of a star name
    #[command(after_help = "\
Examples:
  starmerge normalize \"NAME Teegarden's Star\"
  starmerge normalize 'Gliese 876' --config recon.toml")]
    Normalize {
        name: String,

        /// Take noise prefixes and aliases from this config
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print one star from a saved registry snapshot as JSON
    #[command(after_help = "\
Examples:
  starmerge show stars.db 'Gliese 876'
  starmerge show stars.db 'IL Aqr'")]
    Show {
        /// Snapshot written by `run --db`
        db: PathBuf,

        /// Canonical or alternate name
        name: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AxisArg {
    Ra,
    Dec,
}

impl From<AxisArg> for Axis {
    fn from(axis: AxisArg) -> Self {
        match axis {
            AxisArg::Ra => Axis::RightAscension,
            AxisArg::Dec => Axis::Declination,
        }
    }
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\ntarget:   ", env!("TARGET"),
    )
}

fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => recon::cmd_run(args),
        Commands::Validate { config } => recon::cmd_validate(config),
        Commands::Coords { degrees, axis } => cmd_coords(degrees, axis.into()),
        Commands::Normalize { name, config } => cmd_normalize(name, config),
        Commands::Show { db, name } => recon::cmd_show(db, name),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        let hint = match &err {
            ReconError::FatalIngest { source, .. } if source == "crossid" => {
                Some("pass a local file with --crossid, or retry later".to_string())
            }
            ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => {
                Some("check it with `starmerge validate <config>`".to_string())
            }
            _ => None,
        };
        Self { code: recon_exit_code(&err), message: err.to_string(), hint }
    }
}

// ============================================================================
// coords / normalize
// ============================================================================

fn cmd_coords(degrees: f64, axis: Axis) -> Result<(), CliError> {
    let sexa = to_sexagesimal(degrees, axis)
        .ok_or_else(|| CliError::usage(format!("not a finite angle: {degrees}")))?;
    println!("{sexa}\t{}", sexa.to_numeric_key());
    Ok(())
}

fn cmd_normalize(name: String, config: Option<PathBuf>) -> Result<(), CliError> {
    let config = recon::load_config(config.as_deref())?;
    let normalized = Normalizer::new(&config.normalize).normalize(&name);
    println!("search key: {}", normalized.search_key);
    println!("display:    {}", normalized.display);
    Ok(())
}
