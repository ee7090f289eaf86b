use crate::analysis::ProposedAction;
use crate::error::{Error, Issue, IssueKind};
use crate::hasher::content;
use crate::storage::models::{NewOperation, OperationKind, OperationLogEntry, Outcome, PreState};
use crate::storage::{timestamp, Database};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// One file the planner wants moved.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub action: ProposedAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Moved(OperationLogEntry),
    Failed(OperationLogEntry, Issue),
    /// Already moved by an earlier attempt of the same run.
    AlreadyDone,
    /// Lost the destination to an earlier move; the action becomes `Skip`.
    Collision(Issue),
    /// `ProposeConfirm` and `Skip` are never executed.
    NotExecutable,
    /// A path the log cannot store exactly; the file stays where it is.
    Refused(Issue),
    /// Dry run: the destination is claimed but nothing is touched.
    Planned,
}

/// Single writer for one run's moves and log entries.
///
/// Destinations are claimed in call order: the first move to a path wins
/// and any later one in the same run is downgraded. Existing files are never
/// overwritten. A failed move is logged and the batch carries on; only
/// database errors abort. A dry-run executor claims destinations the same
/// way but never moves or logs anything.
pub struct OperationExecutor<'a> {
    db: &'a Database,
    run_id: i64,
    dry_run: bool,
    /// destination -> source, for every destination claimed in this run
    claimed: HashMap<PathBuf, PathBuf>,
    /// destination -> source, for moves that already succeeded in this run
    completed: HashMap<PathBuf, PathBuf>,
}

impl<'a> OperationExecutor<'a> {
    /// Prepares an executor for `run_id`, picking up moves an interrupted
    /// attempt of the same run already logged.
    pub fn new(db: &'a Database, run_id: i64) -> Result<Self, Error> {
        let log = db.get_operations_for_run(run_id)?;
        let mut completed: HashMap<PathBuf, PathBuf> = HashMap::new();
        for entry in &log {
            if !entry.outcome.is_success() {
                continue;
            }
            match entry.kind {
                OperationKind::Move => {
                    completed.insert(
                        PathBuf::from(&entry.destination_path),
                        PathBuf::from(&entry.source_path),
                    );
                }
                // A compensated move is no longer done.
                OperationKind::Compensate => {
                    completed.remove(Path::new(&entry.source_path));
                }
            }
        }
        if !completed.is_empty() {
            debug!("Run {}: resuming with {} moves already done", run_id, completed.len());
        }

        Ok(Self {
            db,
            run_id,
            dry_run: false,
            claimed: completed.clone(),
            completed,
        })
    }

    pub fn dry_run(db: &'a Database, run_id: i64) -> Self {
        Self {
            db,
            run_id,
            dry_run: true,
            claimed: HashMap::new(),
            completed: HashMap::new(),
        }
    }

    pub fn execute(&mut self, planned: &PlannedMove) -> Result<ExecutionOutcome, Error> {
        if !planned.action.is_executable() {
            return Ok(ExecutionOutcome::NotExecutable);
        }

        if planned.source.to_str().is_none() || planned.destination.to_str().is_none() {
            let issue = Issue::new(
                &planned.source,
                IssueKind::ExecutionFailure,
                "path is not valid UTF-8 and cannot be logged for rollback; not moved",
            );
            warn!("{}: {}", issue.path, issue.message);
            return Ok(ExecutionOutcome::Refused(issue));
        }

        if self.completed.get(&planned.destination) == Some(&planned.source) {
            return Ok(ExecutionOutcome::AlreadyDone);
        }

        if let Some(winner) = self.claimed.get(&planned.destination) {
            let issue = Issue::new(
                &planned.source,
                IssueKind::DestinationCollision,
                format!(
                    "destination {} already taken by {} in this run; skipped",
                    planned.destination.display(),
                    winner.display()
                ),
            );
            warn!("{}: {}", issue.path, issue.message);
            return Ok(ExecutionOutcome::Collision(issue));
        }
        self.claimed
            .insert(planned.destination.clone(), planned.source.clone());
        if self.dry_run {
            return Ok(ExecutionOutcome::Planned);
        }

        let pre_state = match capture_pre_state(&planned.source) {
            Ok(pre) => pre,
            Err(e) => return self.record_failure(planned, None, format!("pre-state capture failed: {}", e)),
        };

        if planned.destination.exists() {
            return self.record_failure(planned, Some(pre_state), "destination already exists".to_string());
        }

        if let Err(e) = move_file(&planned.source, &planned.destination) {
            return self.record_failure(planned, Some(pre_state), e.to_string());
        }

        let entry = self.db.append_operation(&NewOperation {
            run_id: self.run_id,
            kind: OperationKind::Move,
            source_path: path_string(&planned.source),
            destination_path: path_string(&planned.destination),
            pre_state: Some(pre_state),
            outcome: Outcome::Success,
        })?;
        self.completed
            .insert(planned.destination.clone(), planned.source.clone());
        debug!(
            "Moved {} -> {}",
            planned.source.display(),
            planned.destination.display()
        );
        Ok(ExecutionOutcome::Moved(entry))
    }

    fn record_failure(
        &self,
        planned: &PlannedMove,
        pre_state: Option<PreState>,
        reason: String,
    ) -> Result<ExecutionOutcome, Error> {
        error!(
            "Failed to move '{}' to '{}': {}",
            planned.source.display(),
            planned.destination.display(),
            reason
        );
        let entry = self.db.append_operation(&NewOperation {
            run_id: self.run_id,
            kind: OperationKind::Move,
            source_path: path_string(&planned.source),
            destination_path: path_string(&planned.destination),
            pre_state,
            outcome: Outcome::Failed(reason.clone()),
        })?;
        let issue = Issue::new(&planned.source, IssueKind::ExecutionFailure, reason);
        Ok(ExecutionOutcome::Failed(entry, issue))
    }
}

pub(crate) fn capture_pre_state(path: &Path) -> io::Result<PreState> {
    let metadata = fs::metadata(path)?;
    let modified = DateTime::<Utc>::from(metadata.modified()?);
    Ok(PreState {
        size: metadata.len() as i64,
        modified: timestamp(modified),
        checksum: content::hash_file(path)?,
    })
}

/// Rename within one filesystem, creating the destination's parent first.
pub(crate) fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(from, to)
}

pub(crate) fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
