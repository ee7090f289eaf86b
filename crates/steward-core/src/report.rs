use crate::analysis::{DuplicateCatalog, DuplicateGroup, ProposedAction, RiskLevel};
use crate::error::Issue;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Finished, but at least one file produced an issue.
    CompletedWithErrors,
    /// Stopped by the cancel token; the run can be resumed.
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decision for a single file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposalReport {
    pub path: String,
    pub destination: String,
    pub action: ProposedAction,
    pub confidence: f64,
    pub risk: RiskLevel,
    pub reasons: Vec<String>,
    /// Set for persisted `ProposeConfirm` decisions awaiting feedback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<i64>,
}

/// One confirmed duplicate group, as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroupReport {
    pub content_hash: String,
    pub file_size: u64,
    pub keeper: String,
    /// Every member including the keeper, sorted.
    pub members: Vec<String>,
    pub wasted_bytes: u64,
}

impl From<&DuplicateGroup> for DuplicateGroupReport {
    fn from(group: &DuplicateGroup) -> Self {
        Self {
            content_hash: group.content_hash.clone(),
            file_size: group.file_size,
            keeper: group.keeper.to_string_lossy().into_owned(),
            members: group
                .members
                .iter()
                .map(|m| m.to_string_lossy().into_owned())
                .collect(),
            wasted_bytes: group.wasted_bytes(),
        }
    }
}

/// Result of a duplicate-only scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DuplicateReport {
    pub files_scanned: usize,
    pub groups: Vec<DuplicateGroupReport>,
    pub wasted_bytes: u64,
    pub errors: Vec<Issue>,
    /// The scan was stopped by the cancel token before it finished.
    pub cancelled: bool,
}

impl DuplicateReport {
    pub(crate) fn from_catalog(files_scanned: usize, catalog: &DuplicateCatalog) -> Self {
        Self {
            files_scanned,
            groups: catalog.groups().iter().map(DuplicateGroupReport::from).collect(),
            wasted_bytes: catalog.wasted_bytes(),
            errors: catalog.issues().to_vec(),
            cancelled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: i64,
    pub dry_run: bool,
    pub status: RunStatus,
    pub counts_by_action: BTreeMap<ProposedAction, usize>,
    pub proposals: Vec<ProposalReport>,
    pub errors: Vec<Issue>,
    pub duplicate_groups: Vec<DuplicateGroupReport>,
    pub wasted_bytes: u64,
}

impl RunReport {
    pub fn new(run_id: i64, dry_run: bool) -> Self {
        Self {
            run_id,
            dry_run,
            status: RunStatus::Completed,
            counts_by_action: ProposedAction::ALL.into_iter().map(|a| (a, 0)).collect(),
            proposals: Vec::new(),
            errors: Vec::new(),
            duplicate_groups: Vec::new(),
            wasted_bytes: 0,
        }
    }

    pub fn count(&self, action: ProposedAction) -> usize {
        self.counts_by_action.get(&action).copied().unwrap_or(0)
    }

    pub(crate) fn push(&mut self, proposal: ProposalReport) {
        *self.counts_by_action.entry(proposal.action).or_insert(0) += 1;
        self.proposals.push(proposal);
    }

    /// Turn an executable decision into `Skip` after the fact.
    pub(crate) fn downgrade_last(&mut self, reason: String) {
        if let Some(last) = self.proposals.last_mut() {
            if let Some(count) = self.counts_by_action.get_mut(&last.action) {
                *count = count.saturating_sub(1);
            }
            last.action = ProposedAction::Skip;
            last.reasons.push(reason);
            *self.counts_by_action.entry(ProposedAction::Skip).or_insert(0) += 1;
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
