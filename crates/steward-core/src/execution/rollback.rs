use super::executor::{capture_pre_state, move_file, path_string};
use crate::error::{Error, Issue, IssueKind};
use crate::storage::models::{NewOperation, OperationKind, Outcome};
use crate::storage::Database;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Moves a file from where a run put it back to where it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InverseOperation {
    /// Sequence number of the forward move this undoes.
    pub sequence: i64,
    pub from: String,
    pub to: String,
    pub expected_size: i64,
    pub expected_checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackPlan {
    pub run_id: i64,
    /// Timestamp of the newest forward move, `None` for an empty segment.
    pub generated_at: Option<String>,
    pub entry_count: usize,
    pub operations: Vec<InverseOperation>,
}

#[derive(Debug, Clone)]
pub struct RollbackDerivation {
    pub plan: RollbackPlan,
    pub gaps: Vec<Issue>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RollbackReport {
    pub restored: usize,
    pub already_restored: usize,
    pub failures: Vec<Issue>,
}

impl RollbackReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct RollbackManager<'a> {
    db: &'a Database,
}

impl<'a> RollbackManager<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Builds the inverse of every successful move in the run, newest first.
    ///
    /// Reads only the log, so deriving twice gives the same plan even after
    /// a partial apply.
    pub fn derive(&self, run_id: i64) -> Result<RollbackDerivation, Error> {
        if self.db.get_run(run_id)?.is_none() {
            return Err(Error::UnknownRun(run_id));
        }

        let moves: Vec<_> = self
            .db
            .get_operations_for_run(run_id)?
            .into_iter()
            .filter(|e| e.kind == OperationKind::Move && e.outcome.is_success())
            .collect();

        let generated_at = moves.iter().map(|e| e.recorded_at.clone()).max();

        let mut operations = Vec::with_capacity(moves.len());
        let mut gaps = Vec::new();
        for entry in moves.iter().rev() {
            match &entry.pre_state {
                Some(pre) => operations.push(InverseOperation {
                    sequence: entry.sequence,
                    from: entry.destination_path.clone(),
                    to: entry.source_path.clone(),
                    expected_size: pre.size,
                    expected_checksum: pre.checksum.clone(),
                }),
                None => {
                    let issue = Issue::new(
                        &entry.source_path,
                        IssueKind::RollbackGap,
                        format!(
                            "move #{} of run {} has no recorded pre-state; cannot be reversed",
                            entry.sequence, run_id
                        ),
                    );
                    warn!("{}", issue.message);
                    gaps.push(issue);
                }
            }
        }

        debug!(
            "Derived rollback for run {}: {} inverse operations, {} gaps",
            run_id,
            operations.len(),
            gaps.len()
        );

        Ok(RollbackDerivation {
            plan: RollbackPlan {
                run_id,
                generated_at,
                entry_count: operations.len(),
                operations,
            },
            gaps,
        })
    }

    /// Applies the plan in order. Safe to repeat: restored entries are skipped.
    pub fn apply(&self, plan: &RollbackPlan) -> Result<RollbackReport, Error> {
        let mut report = RollbackReport::default();

        for op in &plan.operations {
            let from = Path::new(&op.from);
            let to = Path::new(&op.to);

            match (from.exists(), to.exists()) {
                (false, true) => {
                    report.already_restored += 1;
                }
                (false, false) => {
                    report.failures.push(Issue::new(
                        to,
                        IssueKind::ExecutionFailure,
                        format!("{} is missing; nothing to restore", op.from),
                    ));
                }
                (true, true) => {
                    report.failures.push(Issue::new(
                        to,
                        IssueKind::ExecutionFailure,
                        "original path is occupied by another file",
                    ));
                }
                (true, false) => {
                    let pre_state = match capture_pre_state(from) {
                        Ok(pre) => pre,
                        Err(e) => {
                            report.failures.push(Issue::new(
                                from,
                                IssueKind::ExecutionFailure,
                                format!("cannot verify before restoring: {}", e),
                            ));
                            continue;
                        }
                    };
                    if pre_state.checksum != op.expected_checksum {
                        report.failures.push(Issue::new(
                            from,
                            IssueKind::ExecutionFailure,
                            "content changed since it was moved; left in place",
                        ));
                        continue;
                    }

                    let outcome = match move_file(from, to) {
                        Ok(()) => Outcome::Success,
                        Err(e) => Outcome::Failed(e.to_string()),
                    };
                    self.db.append_operation(&NewOperation {
                        run_id: plan.run_id,
                        kind: OperationKind::Compensate,
                        source_path: path_string(from),
                        destination_path: path_string(to),
                        pre_state: Some(pre_state),
                        outcome: outcome.clone(),
                    })?;
                    match outcome {
                        Outcome::Success => report.restored += 1,
                        Outcome::Failed(reason) => {
                            error!("Failed to restore '{}' to '{}': {}", op.from, op.to, reason);
                            report
                                .failures
                                .push(Issue::new(from, IssueKind::ExecutionFailure, reason));
                        }
                    }
                }
            }
        }

        for failure in &report.failures {
            warn!("{}: {}", failure.path, failure.message);
        }
        info!(
            "Rollback of run {}: {} restored, {} already in place, {} failed",
            plan.run_id,
            report.restored,
            report.already_restored,
            report.failures.len()
        );
        Ok(report)
    }
}

pub fn render_json(plan: &RollbackPlan) -> Result<String, Error> {
    Ok(serde_json::to_string_pretty(plan)?)
}

/// POSIX shell equivalent of [`RollbackManager::apply`], minus checksum checks.
/// Each step is skipped when the original path is already occupied.
pub fn render_shell(plan: &RollbackPlan) -> String {
    let mut script = String::from("#!/bin/sh\n");
    let _ = writeln!(
        script,
        "# rollback for run {} ({} operations, generated {})",
        plan.run_id,
        plan.entry_count,
        plan.generated_at.as_deref().unwrap_or("never")
    );
    script.push_str("set -u\n\n");

    for op in &plan.operations {
        let from = shell_quote(&op.from);
        let to = shell_quote(&op.to);
        let parent = Path::new(&op.to)
            .parent()
            .map(|p| shell_quote(&p.to_string_lossy()))
            .unwrap_or_else(|| "'.'".to_string());
        let _ = writeln!(script, "# move #{}", op.sequence);
        let _ = writeln!(
            script,
            "if [ -e {to} ]; then echo \"skip: \"{to}\" exists\" >&2; \
             else mkdir -p {parent} && mv -- {from} {to}; fi"
        );
    }
    script
}

/// Single-quote for sh; embedded quotes become `'\''`.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
