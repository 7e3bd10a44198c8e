//! Engine error type.

use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad precedence list, non-positive threshold, etc.).
    ConfigValidation(String),
    /// A bulk source is unreachable or structurally unusable. Aborts the run.
    FatalIngest { source: String, message: String },
    /// A required field is absent from a row that cannot be skipped.
    MissingField { source: String, line: usize, field: String },
    /// Registry snapshot read/write failure.
    Store(String),
    /// IO error (file read, etc.).
    Io(String),
}

impl ReconError {
    pub fn fatal(source: &str, message: impl Into<String>) -> Self {
        Self::FatalIngest { source: source.into(), message: message.into() }
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::FatalIngest { source, message } => {
                write!(f, "fatal ingest failure ({source}): {message}")
            }
            Self::MissingField { source, line, field } => {
                write!(f, "source '{source}', line {line}: missing field '{field}'")
            }
            Self::Store(msg) => write!(f, "store error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_display_names_source() {
        let err = ReconError::fatal("survey", "expected at least 93 fields, found 12");
        assert_eq!(
            err.to_string(),
            "fatal ingest failure (survey): expected at least 93 fields, found 12"
        );
    }
}
