//! Library error type.
//!
//! Fixture authoring mistakes (a fixture that is not valid C, or that does not
//! exhibit its defect) are *not* errors; they surface as validation problems in
//! the harness report. Errors here mean the run itself could not proceed.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NullfixError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is {size} bytes, larger than the configured limit of {limit} bytes")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    #[error("cannot determine defect category for '{0}'")]
    UnknownCategory(String),

    #[error("invalid manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to load the C grammar: {0}")]
    Language(String),

    #[error("tree-sitter returned no tree for {0}")]
    ParseFailed(String),

    #[error("invalid findings file {path}: {message}")]
    Findings { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, NullfixError>;

impl NullfixError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        NullfixError::Io {
            path: path.into(),
            source,
        }
    }
}
