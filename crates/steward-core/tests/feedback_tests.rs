use std::fs;
use std::path::Path;
use tempfile::tempdir;

use chrono::Utc;
use steward_core::analysis::{ProposedAction, WeightVector};
use steward_core::config::{RiskConfig, Thresholds};
use steward_core::feedback::load_weights;
use steward_core::{
    AppConfig, Database, FeedbackStore, HumanDecision, OrganizeEngine, SilentReporter,
};

/// Every file lands in the confirmation band.
fn proposing_config(root: &Path) -> AppConfig {
    AppConfig {
        root_paths: vec![root.join("inbox").to_string_lossy().into_owned()],
        target_root: root.join("organized").to_string_lossy().into_owned(),
        thresholds: Thresholds {
            auto_execute: 0.999,
            review_execute: 0.998,
            propose_confirm: 0.01,
        },
        risk: RiskConfig {
            critical_reversibility: 0.1,
            critical_personal_data: 0.0,
        },
        ..AppConfig::default()
    }
}

#[test]
fn test_feedback_on_planned_proposals_updates_weights() {
    let tmp = tempdir().unwrap();
    let inbox = tmp.path().join("inbox");
    fs::create_dir_all(&inbox).unwrap();
    fs::write(inbox.join("report.pdf"), "quarterly numbers").unwrap();
    fs::write(inbox.join("song.mp3"), "la la la").unwrap();

    let config = proposing_config(tmp.path());
    let engine = OrganizeEngine::new(config.clone()).unwrap();
    let db = Database::open_in_memory().unwrap();
    let source = engine.walk_source().unwrap();
    let report = engine.plan(&db, &source, &SilentReporter).unwrap();

    assert_eq!(report.count(ProposedAction::ProposeConfirm), 2);
    let pending = db.get_pending_proposals(report.run_id).unwrap();
    assert_eq!(pending.len(), 2);
    assert!(report.proposals.iter().all(|p| p.proposal_id.is_some()));

    let (mut store, issues) =
        FeedbackStore::open(&db, config.learning, config.initial_weights()).unwrap();
    assert!(issues.is_empty());
    let accepted = store
        .decide_proposal(pending[0].id, HumanDecision::Accept, Utc::now())
        .unwrap();
    let rejected = store
        .decide_proposal(pending[1].id, HumanDecision::Reject, Utc::now())
        .unwrap();
    assert!(accepted.applied && rejected.applied);
    store.commit().unwrap();

    assert!(db.get_pending_proposals(report.run_id).unwrap().is_empty());
    assert_eq!(db.get_feedback().unwrap().len(), 2);

    let (persisted, issues) = load_weights(&db, WeightVector::default()).unwrap();
    assert!(issues.is_empty());
    assert_eq!(&persisted, store.weights());
    let sum: f64 = persisted.as_array().iter().sum();
    assert!((sum - 1.0).abs() < 1e-9);
    assert!(persisted.as_array().iter().all(|w| *w >= 0.0));
}

#[test]
fn test_uncommitted_updates_are_not_persisted() {
    let db = Database::open_in_memory().unwrap();
    let run_id = db.create_run(true).unwrap();
    let features = serde_json::to_string(&steward_core::analysis::FeatureVector::neutral()).unwrap();
    let id = db
        .insert_proposal(run_id, "/in/a.pdf", "/out/Documents/a.pdf", 0.6, "medium", &features)
        .unwrap();

    {
        let (mut store, _) =
            FeedbackStore::open(&db, Default::default(), WeightVector::default()).unwrap();
        store.decide_proposal(id, HumanDecision::Reject, Utc::now()).unwrap();
        // dropped without commit
    }

    assert!(db.load_weights_json().unwrap().is_none());
    let (weights, _) = load_weights(&db, WeightVector::default()).unwrap();
    assert_eq!(weights, WeightVector::default());
}
