use super::models::*;
use super::sqlite::Database;
use super::timestamp_now;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Result, Row};
use tracing::debug;

impl Database {
    // ── Runs ─────────────────────────────────────────────────────

    pub fn create_run(&self, dry_run: bool) -> Result<i64> {
        self.connection().execute(
            "INSERT INTO run (started_at, status, dry_run) VALUES (?1, 'running', ?2)",
            params![timestamp_now(), dry_run],
        )?;
        let id = self.connection().last_insert_rowid();
        debug!("Created run {} (dry_run = {})", id, dry_run);
        Ok(id)
    }

    pub fn complete_run(&self, run_id: i64, status: &str) -> Result<()> {
        self.connection().execute(
            "UPDATE run SET completed_at = ?1, status = ?2 WHERE id = ?3",
            params![timestamp_now(), status, run_id],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: i64) -> Result<Option<Run>> {
        self.connection()
            .query_row(
                "SELECT id, started_at, completed_at, status, dry_run FROM run WHERE id = ?1",
                params![run_id],
                |row| {
                    Ok(Run {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        completed_at: row.get(2)?,
                        status: row.get(3)?,
                        dry_run: row.get(4)?,
                    })
                },
            )
            .optional()
    }

    pub fn get_latest_run_id(&self) -> Result<Option<i64>> {
        self.connection()
            .query_row("SELECT id FROM run ORDER BY id DESC LIMIT 1", [], |row| row.get(0))
            .optional()
    }

    // ── Operation Log ────────────────────────────────────────────

    /// Append one entry, assigning the next sequence number of its run.
    pub fn append_operation(&self, op: &NewOperation) -> Result<OperationLogEntry> {
        let tx = self.connection().unchecked_transaction()?;
        let sequence: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM operation_log WHERE run_id = ?1",
            params![op.run_id],
            |row| row.get(0),
        )?;
        let recorded_at = timestamp_now();
        let (outcome, failure_reason) = match &op.outcome {
            Outcome::Success => ("success", None),
            Outcome::Failed(reason) => ("failed", Some(reason.as_str())),
        };
        tx.execute(
            "INSERT INTO operation_log \
             (run_id, sequence, kind, source_path, destination_path, \
              pre_size, pre_modified, pre_checksum, recorded_at, outcome, failure_reason) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                op.run_id,
                sequence,
                op.kind.as_str(),
                op.source_path,
                op.destination_path,
                op.pre_state.as_ref().map(|p| p.size),
                op.pre_state.as_ref().map(|p| p.modified.as_str()),
                op.pre_state.as_ref().map(|p| p.checksum.as_str()),
                recorded_at,
                outcome,
                failure_reason,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(OperationLogEntry {
            id,
            run_id: op.run_id,
            sequence,
            kind: op.kind,
            source_path: op.source_path.clone(),
            destination_path: op.destination_path.clone(),
            pre_state: op.pre_state.clone(),
            recorded_at,
            outcome: op.outcome.clone(),
        })
    }

    /// The run's log segment in sequence order.
    pub fn get_operations_for_run(&self, run_id: i64) -> Result<Vec<OperationLogEntry>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, run_id, sequence, kind, source_path, destination_path, \
                    pre_size, pre_modified, pre_checksum, recorded_at, outcome, failure_reason \
             FROM operation_log WHERE run_id = ?1 ORDER BY sequence",
        )?;
        let entries = stmt
            .query_map(params![run_id], operation_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(entries)
    }

    // ── History ──────────────────────────────────────────────────

    /// Runs newest first, each with its operation log counts.
    pub fn get_run_summaries(&self, limit: usize, offset: usize) -> Result<Vec<RunSummary>> {
        let mut stmt = self.connection().prepare(
            "SELECT r.id, r.started_at, r.completed_at, r.status, r.dry_run, \
                    COALESCE(SUM(o.kind = 'move' AND o.outcome = 'success'), 0), \
                    COALESCE(SUM(o.outcome = 'failed'), 0), \
                    COALESCE(SUM(o.kind = 'compensate' AND o.outcome = 'success'), 0) \
             FROM run r LEFT JOIN operation_log o ON o.run_id = r.id \
             GROUP BY r.id ORDER BY r.id DESC LIMIT ?1 OFFSET ?2",
        )?;
        let summaries = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                Ok(RunSummary {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    completed_at: row.get(2)?,
                    status: row.get(3)?,
                    dry_run: row.get(4)?,
                    moved: row.get(5)?,
                    failed: row.get(6)?,
                    compensated: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(summaries)
    }

    pub fn get_history_statistics(&self) -> Result<HistoryStatistics> {
        let conn = self.connection();
        let mut stats = HistoryStatistics::default();

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM run GROUP BY status")?;
        let by_status = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>>>()?;
        for (status, count) in by_status {
            stats.total_runs += count;
            stats.runs_by_status.insert(status, count);
        }
        stats.dry_runs = conn.query_row("SELECT COUNT(*) FROM run WHERE dry_run = 1", [], |row| {
            row.get(0)
        })?;

        let (moved, failed, compensated): (i64, i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(kind = 'move' AND outcome = 'success'), 0), \
                    COALESCE(SUM(outcome = 'failed'), 0), \
                    COALESCE(SUM(kind = 'compensate' AND outcome = 'success'), 0) \
             FROM operation_log",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        stats.moved = moved;
        stats.failed = failed;
        stats.compensated = compensated;
        Ok(stats)
    }

    // ── Proposals ────────────────────────────────────────────────

    pub fn insert_proposal(
        &self,
        run_id: i64,
        path: &str,
        destination_path: &str,
        confidence: f64,
        risk: &str,
        features_json: &str,
    ) -> Result<i64> {
        self.connection().execute(
            "INSERT INTO proposal (run_id, path, destination_path, confidence, risk, features) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![run_id, path, destination_path, confidence, risk, features_json],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn get_proposal(&self, id: i64) -> Result<Option<StoredProposal>> {
        self.connection()
            .query_row(
                "SELECT id, run_id, path, destination_path, confidence, risk, features, decision \
                 FROM proposal WHERE id = ?1",
                params![id],
                proposal_from_row,
            )
            .optional()
    }

    pub fn get_proposals_for_run(&self, run_id: i64) -> Result<Vec<StoredProposal>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, run_id, path, destination_path, confidence, risk, features, decision \
             FROM proposal WHERE run_id = ?1 ORDER BY id",
        )?;
        let proposals = stmt
            .query_map(params![run_id], proposal_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(proposals)
    }

    pub fn get_pending_proposals(&self, run_id: i64) -> Result<Vec<StoredProposal>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, run_id, path, destination_path, confidence, risk, features, decision \
             FROM proposal WHERE run_id = ?1 AND decision IS NULL ORDER BY id",
        )?;
        let proposals = stmt
            .query_map(params![run_id], proposal_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(proposals)
    }

    pub fn set_proposal_decision(&self, id: i64, decision: &str) -> Result<()> {
        self.connection().execute(
            "UPDATE proposal SET decision = ?1 WHERE id = ?2",
            params![decision, id],
        )?;
        Ok(())
    }

    // ── Feedback ─────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn insert_feedback(
        &self,
        proposal_id: Option<i64>,
        path: &str,
        predicted_action: &str,
        decision: &str,
        weight_delta_json: &str,
        applied: bool,
        recorded_at: &str,
    ) -> Result<i64> {
        self.connection().execute(
            "INSERT INTO feedback \
             (proposal_id, path, predicted_action, decision, weight_delta, applied, recorded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                proposal_id,
                path,
                predicted_action,
                decision,
                weight_delta_json,
                applied,
                recorded_at
            ],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    /// Weight updates applied at or after `since` (RFC 3339, UTC, fixed precision).
    pub fn count_applied_feedback_since(&self, since: &str) -> Result<u32> {
        self.connection().query_row(
            "SELECT COUNT(*) FROM feedback WHERE applied = 1 AND recorded_at >= ?1",
            params![since],
            |row| row.get(0),
        )
    }

    pub fn get_feedback(&self) -> Result<Vec<FeedbackRow>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, proposal_id, path, predicted_action, decision, weight_delta, applied, recorded_at \
             FROM feedback ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FeedbackRow {
                    id: row.get(0)?,
                    proposal_id: row.get(1)?,
                    path: row.get(2)?,
                    predicted_action: row.get(3)?,
                    decision: row.get(4)?,
                    weight_delta: row.get(5)?,
                    applied: row.get(6)?,
                    recorded_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Weight Vector ────────────────────────────────────────────

    /// Raw JSON of the persisted weights, if any were ever saved.
    pub fn load_weights_json(&self) -> Result<Option<String>> {
        self.connection()
            .query_row("SELECT weights FROM weight_vector WHERE id = 1", [], |row| row.get(0))
            .optional()
    }

    pub fn save_weights_json(&self, weights_json: &str) -> Result<()> {
        self.connection().execute(
            "INSERT INTO weight_vector (id, weights, updated_at) VALUES (1, ?1, ?2) \
             ON CONFLICT(id) DO UPDATE SET weights = excluded.weights, updated_at = excluded.updated_at",
            params![weights_json, timestamp_now()],
        )?;
        debug!("Persisted weight vector");
        Ok(())
    }
}

fn operation_from_row(row: &Row<'_>) -> Result<OperationLogEntry> {
    let kind: String = row.get(3)?;
    let kind = OperationKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown operation kind '{}'", kind).into(),
        )
    })?;

    let pre_size: Option<i64> = row.get(6)?;
    let pre_modified: Option<String> = row.get(7)?;
    let pre_checksum: Option<String> = row.get(8)?;
    let pre_state = match (pre_size, pre_modified, pre_checksum) {
        (Some(size), Some(modified), Some(checksum)) => Some(PreState {
            size,
            modified,
            checksum,
        }),
        _ => None,
    };

    let outcome: String = row.get(10)?;
    let outcome = if outcome == "success" {
        Outcome::Success
    } else {
        let reason: Option<String> = row.get(11)?;
        Outcome::Failed(reason.unwrap_or_default())
    };

    Ok(OperationLogEntry {
        id: row.get(0)?,
        run_id: row.get(1)?,
        sequence: row.get(2)?,
        kind,
        source_path: row.get(4)?,
        destination_path: row.get(5)?,
        pre_state,
        recorded_at: row.get(9)?,
        outcome,
    })
}

fn proposal_from_row(row: &Row<'_>) -> Result<StoredProposal> {
    Ok(StoredProposal {
        id: row.get(0)?,
        run_id: row.get(1)?,
        path: row.get(2)?,
        destination_path: row.get(3)?,
        confidence: row.get(4)?,
        risk: row.get(5)?,
        features: row.get(6)?,
        decision: row.get(7)?,
    })
}
