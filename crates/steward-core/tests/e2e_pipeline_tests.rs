use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

use steward_core::analysis::{
    Classifier, ClassifierError, Dimension, FeatureContext, FeatureVector, ProposedAction, NEUTRAL,
};
use steward_core::config::{RiskConfig, Thresholds};
use steward_core::execution::RollbackManager;
use steward_core::{
    AppConfig, CancelToken, Database, IssueKind, OrganizeEngine, ProgressReporter, RunStatus,
    SilentReporter,
};

/// Thresholds low enough that every non-critical file is executed, and a
/// personal-data cutoff that random temp directory names cannot trip.
fn executing_config(root: &Path) -> AppConfig {
    AppConfig {
        root_paths: vec![root.join("inbox").to_string_lossy().into_owned()],
        target_root: root.join("organized").to_string_lossy().into_owned(),
        database_path: root.join("steward.db").to_string_lossy().into_owned(),
        thresholds: Thresholds {
            auto_execute: 0.03,
            review_execute: 0.02,
            propose_confirm: 0.01,
        },
        risk: RiskConfig {
            critical_reversibility: 0.1,
            critical_personal_data: 0.0,
        },
        ..AppConfig::default()
    }
}

/// Create a temp directory tree with one duplicate pair and one name clash.
/// Layout:
///   root/inbox/
///     copy_a.dat        ("same bytes")
///     nested/copy_b.dat ("same bytes")   <- duplicate of copy_a.dat
///     notes.txt         ("meeting notes")
///     photo.jpg         ("first photo")
///     sub/photo.jpg     ("second photo") <- same destination as photo.jpg
fn create_test_tree(root: &Path) {
    let inbox = root.join("inbox");
    fs::create_dir_all(inbox.join("nested")).unwrap();
    fs::create_dir_all(inbox.join("sub")).unwrap();

    fs::write(inbox.join("copy_a.dat"), "same bytes").unwrap();
    fs::write(inbox.join("nested/copy_b.dat"), "same bytes").unwrap();
    fs::write(inbox.join("notes.txt"), "meeting notes").unwrap();
    fs::write(inbox.join("photo.jpg"), "first photo").unwrap();
    fs::write(inbox.join("sub/photo.jpg"), "second photo").unwrap();
}

fn files_under(dir: &Path) -> BTreeSet<PathBuf> {
    let mut files = BTreeSet::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(files_under(&path));
            } else {
                files.insert(path);
            }
        }
    }
    files
}

#[test]
fn test_plan_moves_nothing() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    let before = files_under(&tmp.path().join("inbox"));

    let engine = OrganizeEngine::new(executing_config(tmp.path())).unwrap();
    let db = Database::open_in_memory().unwrap();
    let source = engine.walk_source().unwrap();
    let report = engine.plan(&db, &source, &SilentReporter).unwrap();

    assert!(report.dry_run);
    assert_eq!(report.proposals.len(), 5);
    assert_eq!(report.counts_by_action.values().sum::<usize>(), 5);
    assert_eq!(report.duplicate_groups.len(), 1);

    // the plan reports the same destination clash organize would hit
    assert_eq!(report.count(ProposedAction::Skip), 1);
    let skipped: Vec<_> = report
        .proposals
        .iter()
        .filter(|p| p.action == ProposedAction::Skip)
        .collect();
    assert!(skipped[0].path.ends_with("sub/photo.jpg"));
    assert!(report
        .errors
        .iter()
        .any(|e| e.kind == IssueKind::DestinationCollision && e.path.ends_with("sub/photo.jpg")));

    assert_eq!(files_under(&tmp.path().join("inbox")), before);
    assert!(!tmp.path().join("organized").exists());
    assert!(db.get_operations_for_run(report.run_id).unwrap().is_empty());
    assert!(db.get_run(report.run_id).unwrap().unwrap().dry_run);
}

#[test]
fn test_organize_then_rollback_restores_original_paths() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    let inbox = tmp.path().join("inbox");
    let organized = tmp.path().join("organized");
    let before = files_under(&inbox);

    let engine = OrganizeEngine::new(executing_config(tmp.path())).unwrap();
    let db = Database::open_in_memory().unwrap();
    let source = engine.walk_source().unwrap();
    let report = engine.organize(&db, &source, &SilentReporter).unwrap();

    // the second photo.jpg lost its destination
    assert_eq!(report.status, RunStatus::CompletedWithErrors);
    let collisions: Vec<_> = report
        .errors
        .iter()
        .filter(|e| e.kind == IssueKind::DestinationCollision)
        .collect();
    assert_eq!(collisions.len(), 1);
    assert!(collisions[0].path.ends_with("sub/photo.jpg"));
    assert_eq!(report.count(ProposedAction::Skip), 1);

    assert_eq!(
        fs::read_to_string(organized.join("Images/photo.jpg")).unwrap(),
        "first photo"
    );
    assert!(inbox.join("sub/photo.jpg").exists());
    assert!(organized.join("Duplicates/copy_b.dat").exists());
    assert!(organized.join("Documents/notes.txt").exists());
    assert_eq!(files_under(&organized).len(), 4);

    let manager = RollbackManager::new(&db);
    let derivation = manager.derive(report.run_id).unwrap();
    assert!(derivation.gaps.is_empty());
    assert_eq!(derivation.plan.entry_count, 4);

    let applied = manager.apply(&derivation.plan).unwrap();
    assert_eq!(applied.restored, 4);
    assert!(applied.is_complete());
    assert_eq!(files_under(&inbox), before);
    assert!(files_under(&organized).is_empty());

    let again = manager.apply(&manager.derive(report.run_id).unwrap().plan).unwrap();
    assert_eq!(again.restored, 0);
    assert_eq!(again.already_restored, 4);
    assert_eq!(files_under(&inbox), before);
}

struct CancelAfterFirst(CancelToken);

impl ProgressReporter for CancelAfterFirst {
    fn on_evaluate_progress(&self, files_done: usize, _total_files: usize) {
        if files_done == 1 {
            self.0.cancel();
        }
    }
}

#[test]
fn test_cancelled_run_resumes_where_it_stopped() {
    let tmp = tempdir().unwrap();
    let inbox = tmp.path().join("inbox");
    fs::create_dir_all(&inbox).unwrap();
    for (name, body) in [("a.txt", "alpha"), ("b.txt", "bravo"), ("c.txt", "charlie")] {
        fs::write(inbox.join(name), body).unwrap();
    }

    let engine = OrganizeEngine::new(executing_config(tmp.path())).unwrap();
    let db = Database::open_in_memory().unwrap();
    let source = engine.walk_source().unwrap();

    let token = engine.cancel_token();
    let first = engine
        .organize(&db, &source, &CancelAfterFirst(token.clone()))
        .unwrap();
    assert_eq!(first.status, RunStatus::Cancelled);
    assert_eq!(db.get_run(first.run_id).unwrap().unwrap().status, "cancelled");
    assert_eq!(db.get_operations_for_run(first.run_id).unwrap().len(), 1);
    assert_eq!(files_under(&inbox).len(), 2);

    token.reset();
    let resumed = engine
        .resume(&db, first.run_id, &source, &SilentReporter)
        .unwrap();
    assert_eq!(resumed.run_id, first.run_id);
    assert_eq!(resumed.status, RunStatus::Completed);
    assert!(files_under(&inbox).is_empty());
    assert_eq!(db.get_operations_for_run(first.run_id).unwrap().len(), 3);

    // one log segment, one rollback
    let manager = RollbackManager::new(&db);
    let plan = manager.derive(first.run_id).unwrap().plan;
    assert_eq!(plan.entry_count, 3);
    assert_eq!(manager.apply(&plan).unwrap().restored, 3);
    assert_eq!(files_under(&inbox).len(), 3);
}

#[test]
fn test_resume_rejects_dry_runs_and_unknown_ids() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    let engine = OrganizeEngine::new(executing_config(tmp.path())).unwrap();
    let db = Database::open_in_memory().unwrap();
    let source = engine.walk_source().unwrap();

    let plan = engine.plan(&db, &source, &SilentReporter).unwrap();
    assert!(engine.resume(&db, plan.run_id, &source, &SilentReporter).is_err());
    assert!(matches!(
        engine.resume(&db, 999, &source, &SilentReporter),
        Err(steward_core::Error::UnknownRun(999))
    ));
}

#[test]
fn test_invalid_thresholds_are_rejected() {
    let config = AppConfig {
        thresholds: Thresholds {
            auto_execute: 0.5,
            review_execute: 0.7,
            propose_confirm: 0.2,
        },
        ..AppConfig::default()
    };
    assert!(OrganizeEngine::new(config).is_err());
}

struct HungClassifier;

impl Classifier for HungClassifier {
    fn classify(&self, _ctx: &FeatureContext) -> Result<f64, ClassifierError> {
        std::thread::sleep(Duration::from_millis(300));
        Ok(0.99)
    }
}

#[test]
fn test_hung_classifier_falls_back_to_neutral_scores() {
    let tmp = tempdir().unwrap();
    let inbox = tmp.path().join("inbox");
    fs::create_dir_all(&inbox).unwrap();
    for name in ["a.pdf", "bb.pdf", "ccc.mp3", "dddd.txt"] {
        fs::write(inbox.join(name), name).unwrap();
    }

    let mut config = executing_config(tmp.path());
    // every file lands in the confirmation band, so its features are stored
    config.thresholds = Thresholds {
        auto_execute: 0.999,
        review_execute: 0.998,
        propose_confirm: 0.01,
    };
    config.classifier.timeout_ms = 20;
    let engine = OrganizeEngine::new(config)
        .unwrap()
        .with_classifier(Arc::new(HungClassifier));
    let db = Database::open_in_memory().unwrap();
    let source = engine.walk_source().unwrap();
    let report = engine.plan(&db, &source, &SilentReporter).unwrap();

    let outages = report
        .errors
        .iter()
        .filter(|e| e.kind == IssueKind::ClassifierUnavailable)
        .count();
    assert_eq!(outages, 4);

    let stored = db.get_proposals_for_run(report.run_id).unwrap();
    assert_eq!(stored.len(), 4);
    for proposal in stored {
        let features: FeatureVector = serde_json::from_str(&proposal.features).unwrap();
        assert_eq!(features.get(Dimension::PredictiveFactor), NEUTRAL);
    }

    // a later run gets a fresh chance, and fails the same way
    let again = engine.plan(&db, &source, &SilentReporter).unwrap();
    assert_eq!(
        again
            .errors
            .iter()
            .filter(|e| e.kind == IssueKind::ClassifierUnavailable)
            .count(),
        4
    );
}

#[test]
fn test_find_duplicates_lists_groups_and_keepers() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    let engine = OrganizeEngine::new(executing_config(tmp.path())).unwrap();
    let source = engine.walk_source().unwrap();

    let found = engine.find_duplicates(&source, &SilentReporter);
    assert!(!found.cancelled);
    assert_eq!(found.files_scanned, 5);
    assert_eq!(found.groups.len(), 1);
    let group = &found.groups[0];
    assert_eq!(group.members.len(), 2);
    assert!(group.members.contains(&group.keeper));
    assert_eq!(group.file_size, "same bytes".len() as u64);
    assert_eq!(found.wasted_bytes, group.file_size);
}

#[cfg(unix)]
#[test]
fn test_non_utf8_names_are_left_in_place() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let tmp = tempdir().unwrap();
    let inbox = tmp.path().join("inbox");
    fs::create_dir_all(&inbox).unwrap();
    let odd = inbox.join(OsStr::from_bytes(b"r\xe9sum\xe9.txt"));
    fs::write(&odd, "curriculum").unwrap();
    fs::write(inbox.join("plain.txt"), "plain").unwrap();

    let engine = OrganizeEngine::new(executing_config(tmp.path())).unwrap();
    let db = Database::open_in_memory().unwrap();
    let source = engine.walk_source().unwrap();
    let report = engine.organize(&db, &source, &SilentReporter).unwrap();

    assert!(odd.exists());
    assert_eq!(report.count(ProposedAction::Skip), 1);
    assert!(report.errors.iter().any(|e| e.kind == IssueKind::ScanError));
    assert!(tmp.path().join("organized/Documents/plain.txt").exists());

    // only the plain file is in the log, so rollback restores it exactly
    let manager = RollbackManager::new(&db);
    let plan = manager.derive(report.run_id).unwrap().plan;
    assert_eq!(plan.entry_count, 1);
    assert_eq!(manager.apply(&plan).unwrap().restored, 1);
    assert!(odd.exists());
    assert!(inbox.join("plain.txt").exists());
}
