//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain    | Description                                   |
//! |---------|-----------|-----------------------------------------------|
//! | 0       | Universal | Success                                       |
//! | 1       | Universal | General error (unspecified)                   |
//! | 2       | Universal | CLI usage error (bad args, missing file)      |
//! | 3-9     | run       | Reconciliation run codes                      |
//! | 50-59   | fetch     | Source downloads and the SIMBAD TAP service   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use starmerge_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Run (3-9)
// =============================================================================

/// Config file failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// A bulk source is unreachable or structurally unusable.
pub const EXIT_INGEST: u8 = 4;

/// Snapshot, table or report could not be written (or read back).
pub const EXIT_OUTPUT: u8 = 5;

/// `--strict` run finished with merge conflicts or unresolved stars.
pub const EXIT_REVIEW: u8 = 6;

// =============================================================================
// Fetch (50-59)
// =============================================================================

/// Auth rejected by upstream (401/403).
pub const EXIT_FETCH_AUTH: u8 = 51;

/// Bad request rejected by upstream (400).
pub const EXIT_FETCH_VALIDATION: u8 = 52;

/// Rate limited after retries (429).
pub const EXIT_FETCH_RATE_LIMIT: u8 = 53;

/// Upstream error (5xx, other 4xx) or network failure after retries.
pub const EXIT_FETCH_UPSTREAM: u8 = 54;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        ReconError::FatalIngest { .. } | ReconError::MissingField { .. } => EXIT_INGEST,
        ReconError::Store(_) | ReconError::Io(_) => EXIT_OUTPUT,
    }
}
