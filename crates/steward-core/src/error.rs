use serde::Serialize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid weight vector: {0}")]
    InvalidWeights(String),

    #[error("Unknown run id {0}")]
    UnknownRun(i64),

    #[error("{0}")]
    Other(String),
}

/// Non-fatal conditions collected during a run. None of these abort a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    ScanError,
    ClassifierUnavailable,
    DestinationCollision,
    ExecutionFailure,
    RollbackGap,
    WeightCorruption,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::ScanError => "scan_error",
            IssueKind::ClassifierUnavailable => "classifier_unavailable",
            IssueKind::DestinationCollision => "destination_collision",
            IssueKind::ExecutionFailure => "execution_failure",
            IssueKind::RollbackGap => "rollback_gap",
            IssueKind::WeightCorruption => "weight_corruption",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the `errors[]` list in a run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub path: String,
    pub kind: IssueKind,
    pub message: String,
}

impl Issue {
    pub fn new(path: impl AsRef<Path>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_string_lossy().into_owned(),
            kind,
            message: message.into(),
        }
    }
}
