use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum StandoffError {
    #[error("line {line} in {source_name}: expected {expected} fields, got {found}: {content}")]
    Format {
        source_name: String,
        line: usize,
        expected: usize,
        found: usize,
        content: String,
    },

    #[error("line {line} in {source_name}: invalid {field} value {value:?}")]
    InvalidField {
        source_name: String,
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("text mismatch in {pmid}: {mention:?} vs {reference:?}")]
    #[diagnostic(help("tagger offsets and document text have drifted apart"))]
    TextMismatch {
        pmid: String,
        mention: String,
        reference: String,
    },

    #[error("unexpected type {0}")]
    UnexpectedType(i64),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("key-value store error: {0}")]
    Store(String),

    #[error("invalid retype rule: {0}")]
    InvalidRetype(String),
}

impl StandoffError {
    pub(crate) fn format(
        source_name: &str,
        line: usize,
        expected: usize,
        found: usize,
        content: &str,
    ) -> Self {
        StandoffError::Format {
            source_name: source_name.to_string(),
            line,
            expected,
            found,
            content: content.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StandoffError {
    fn from(err: rusqlite::Error) -> Self {
        StandoffError::Store(err.to_string())
    }
}
