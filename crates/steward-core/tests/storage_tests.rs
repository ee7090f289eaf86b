use steward_core::execution::RollbackManager;
use steward_core::storage::models::{NewOperation, OperationKind, Outcome, PreState};
use steward_core::{Database, IssueKind};
use tempfile::tempdir;

fn new_move(run_id: i64, name: &str, pre_state: Option<PreState>) -> NewOperation {
    NewOperation {
        run_id,
        kind: OperationKind::Move,
        source_path: format!("/inbox/{}", name),
        destination_path: format!("/organized/Documents/{}", name),
        pre_state,
        outcome: Outcome::Success,
    }
}

fn pre_state() -> PreState {
    PreState {
        size: 3,
        modified: "2024-01-01T00:00:00.000000Z".to_string(),
        checksum: "abc".to_string(),
    }
}

#[test]
fn test_sequence_numbers_are_per_run() {
    let db = Database::open_in_memory().unwrap();
    let first = db.create_run(false).unwrap();
    let second = db.create_run(false).unwrap();

    db.append_operation(&new_move(first, "a", Some(pre_state()))).unwrap();
    db.append_operation(&new_move(second, "b", Some(pre_state()))).unwrap();
    let third = db.append_operation(&new_move(first, "c", Some(pre_state()))).unwrap();

    assert_eq!(third.sequence, 2);
    let log = db.get_operations_for_run(first).unwrap();
    assert_eq!(
        log.iter().map(|e| e.sequence).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(log[0].pre_state, Some(pre_state()));
}

#[test]
fn test_operation_log_is_append_only() {
    let db = Database::open_in_memory().unwrap();
    let run_id = db.create_run(false).unwrap();
    db.append_operation(&new_move(run_id, "a", Some(pre_state()))).unwrap();

    let update = db
        .connection()
        .execute("UPDATE operation_log SET outcome = 'failed'", []);
    assert!(update.is_err());
    let delete = db.connection().execute("DELETE FROM operation_log", []);
    assert!(delete.is_err());

    let log = db.get_operations_for_run(run_id).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].outcome, Outcome::Success);
}

#[test]
fn test_missing_pre_state_is_a_rollback_gap() {
    let db = Database::open_in_memory().unwrap();
    let run_id = db.create_run(false).unwrap();
    db.append_operation(&new_move(run_id, "kept", Some(pre_state()))).unwrap();
    db.append_operation(&new_move(run_id, "lost", None)).unwrap();

    let derivation = RollbackManager::new(&db).derive(run_id).unwrap();
    assert_eq!(derivation.plan.entry_count, 1);
    assert_eq!(derivation.plan.operations[0].to, "/inbox/kept");
    assert_eq!(derivation.gaps.len(), 1);
    assert_eq!(derivation.gaps[0].kind, IssueKind::RollbackGap);
    assert_eq!(derivation.gaps[0].path, "/inbox/lost");
}

#[test]
fn test_failed_moves_are_not_reversed() {
    let db = Database::open_in_memory().unwrap();
    let run_id = db.create_run(false).unwrap();
    let mut failed = new_move(run_id, "a", None);
    failed.outcome = Outcome::Failed("permission denied".to_string());
    db.append_operation(&failed).unwrap();

    let log = db.get_operations_for_run(run_id).unwrap();
    assert_eq!(log[0].outcome, Outcome::Failed("permission denied".to_string()));

    let derivation = RollbackManager::new(&db).derive(run_id).unwrap();
    assert!(derivation.plan.operations.is_empty());
    assert!(derivation.plan.generated_at.is_none());
    assert!(derivation.gaps.is_empty());
}

#[test]
fn test_database_reopens_with_existing_data() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("steward.db");
    let path = path.to_str().unwrap();

    let run_id = {
        let db = Database::open(path).unwrap();
        let run_id = db.create_run(false).unwrap();
        db.complete_run(run_id, "completed").unwrap();
        db.save_weights_json("[0.1,0.1,0.1,0.1,0.1,0.1,0.1,0.1,0.1,0.1]").unwrap();
        run_id
    };

    let db = Database::open(path).unwrap();
    let run = db.get_run(run_id).unwrap().unwrap();
    assert_eq!(run.status, "completed");
    assert!(run.completed_at.is_some());
    assert_eq!(db.get_latest_run_id().unwrap(), Some(run_id));
    assert!(db.load_weights_json().unwrap().is_some());
}

#[test]
fn test_history_counts_operations_per_run() {
    let db = Database::open_in_memory().unwrap();
    let organize = db.create_run(false).unwrap();
    db.append_operation(&new_move(organize, "a", Some(pre_state()))).unwrap();
    db.append_operation(&new_move(organize, "b", Some(pre_state()))).unwrap();
    let mut failed = new_move(organize, "c", None);
    failed.outcome = Outcome::Failed("permission denied".to_string());
    db.append_operation(&failed).unwrap();
    let mut undo = new_move(organize, "a", None);
    undo.kind = OperationKind::Compensate;
    db.append_operation(&undo).unwrap();
    db.complete_run(organize, "completed_with_errors").unwrap();

    let plan = db.create_run(true).unwrap();
    db.complete_run(plan, "completed").unwrap();
    let empty = db.create_run(false).unwrap();
    db.complete_run(empty, "completed").unwrap();

    let summaries = db.get_run_summaries(10, 0).unwrap();
    assert_eq!(
        summaries.iter().map(|s| s.id).collect::<Vec<_>>(),
        vec![empty, plan, organize]
    );
    let oldest = &summaries[2];
    assert_eq!((oldest.moved, oldest.failed, oldest.compensated), (2, 1, 1));
    assert_eq!((summaries[0].moved, summaries[0].failed), (0, 0));
    assert!(summaries[1].dry_run);

    let page = db.get_run_summaries(1, 1).unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, plan);

    let stats = db.get_history_statistics().unwrap();
    assert_eq!(stats.total_runs, 3);
    assert_eq!(stats.runs_by_status.get("completed"), Some(&2));
    assert_eq!(stats.runs_by_status.get("completed_with_errors"), Some(&1));
    assert_eq!(stats.dry_runs, 1);
    assert_eq!((stats.moved, stats.failed, stats.compensated), (2, 1, 1));
}

#[test]
fn test_history_of_empty_database() {
    let db = Database::open_in_memory().unwrap();
    assert!(db.get_run_summaries(20, 0).unwrap().is_empty());
    let stats = db.get_history_statistics().unwrap();
    assert_eq!(stats.total_runs, 0);
    assert!(stats.runs_by_status.is_empty());
}
