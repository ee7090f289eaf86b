use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One invocation of the pipeline.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: i64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub dry_run: bool,
}

/// A run with its operation log counted up, for browsing history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub id: i64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub dry_run: bool,
    /// Successful forward moves.
    pub moved: i64,
    /// Log entries of either kind that failed.
    pub failed: i64,
    /// Successful rollback moves.
    pub compensated: i64,
}

/// Totals over every recorded run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryStatistics {
    pub total_runs: i64,
    pub runs_by_status: BTreeMap<String, i64>,
    pub dry_runs: i64,
    pub moved: i64,
    pub failed: i64,
    pub compensated: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// A forward move made by the executor.
    Move,
    /// An inverse move applied during rollback.
    Compensate,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Move => "move",
            OperationKind::Compensate => "compensate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "move" => Some(OperationKind::Move),
            "compensate" => Some(OperationKind::Compensate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("success"),
            Outcome::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}

/// State of the source file captured before it was touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreState {
    pub size: i64,
    pub modified: String,
    pub checksum: String,
}

/// A row to append to the operation log; the sequence number is assigned on insert.
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub run_id: i64,
    pub kind: OperationKind,
    pub source_path: String,
    pub destination_path: String,
    pub pre_state: Option<PreState>,
    pub outcome: Outcome,
}

/// Immutable operation log row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationLogEntry {
    pub id: i64,
    pub run_id: i64,
    pub sequence: i64,
    pub kind: OperationKind,
    pub source_path: String,
    pub destination_path: String,
    /// `None` when any of the pre-state columns is missing.
    pub pre_state: Option<PreState>,
    pub recorded_at: String,
    pub outcome: Outcome,
}

/// A `ProposeConfirm` decision waiting for a human.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProposal {
    pub id: i64,
    pub run_id: i64,
    pub path: String,
    pub destination_path: String,
    pub confidence: f64,
    pub risk: String,
    /// JSON-encoded `FeatureVector`.
    pub features: String,
    pub decision: Option<String>,
}

/// A persisted accept/reject and the weight change it caused.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRow {
    pub id: i64,
    pub proposal_id: Option<i64>,
    pub path: String,
    pub predicted_action: String,
    pub decision: String,
    /// JSON-encoded `[f64; 10]`.
    pub weight_delta: String,
    pub applied: bool,
    pub recorded_at: String,
}
