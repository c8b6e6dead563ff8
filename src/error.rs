// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a history query
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("no git repository found from {}", .0.display())]
    RepositoryNotFound(PathBuf),

    /// Revision, path or object absent
    #[error("not found: {0}")]
    NotFound(String),

    #[error("history backend failed: {0}")]
    Backend(String),
}

impl HistoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, HistoryError::NotFound(_))
    }
}

impl From<git2::Error> for HistoryError {
    fn from(err: git2::Error) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => HistoryError::NotFound(err.message().to_string()),
            _ => HistoryError::Backend(err.message().to_string()),
        }
    }
}

impl From<std::io::Error> for HistoryError {
    fn from(err: std::io::Error) -> Self {
        HistoryError::Backend(err.to_string())
    }
}

/// Invalid configuration, reported before any unit is processed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("bad value of {key}: {value:?} (expected {expected})")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("age and rank cannot both be enabled")]
    ConflictingRecency,

    #[error("no metric enabled in {0}")]
    NoMetrics(&'static str),

    #[error("cannot read thresholds from {path}: {reason}")]
    Thresholds { path: PathBuf, reason: String },
}

pub type HistoryResult<T> = Result<T, HistoryError>;
