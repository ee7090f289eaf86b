use crate::analysis::planner::destination_for;
use crate::analysis::{
    ActionPlanner, Classifier, ConfidenceScorer, Decision, DuplicateCatalog, DuplicateDetector,
    FeatureExtractor, FeatureVector, HeuristicClassifier, ProposedAction, RiskAssessment,
    RiskAssessor, TimeoutClassifier,
};
use crate::cancel::CancelToken;
use crate::config::{self, AppConfig};
use crate::error::{Error, Issue, IssueKind};
use crate::execution::{ExecutionOutcome, OperationExecutor, PlannedMove};
use crate::feedback;
use crate::progress::ProgressReporter;
use crate::report::{DuplicateGroupReport, DuplicateReport, ProposalReport, RunReport, RunStatus};
use crate::scanner::{DirectoryContext, FileRecord, FileSource, WalkSource};
use crate::storage::Database;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Drives a run end to end: scan, duplicates, evaluation, execution.
pub struct OrganizeEngine {
    config: AppConfig,
    classifier: Option<Arc<dyn Classifier>>,
    /// Set for injected classifiers; each run gets a fresh `TimeoutClassifier`.
    classifier_timeout: Option<Duration>,
    reference_time: Option<DateTime<Utc>>,
    cancel: CancelToken,
}

/// Everything the planner concluded about one file.
struct Evaluation {
    path: PathBuf,
    destination: PathBuf,
    features: FeatureVector,
    confidence: f64,
    risk: RiskAssessment,
    decision: Decision,
    issues: Vec<Issue>,
}

struct Scan {
    directories: DirectoryContext,
    duplicates: DuplicateCatalog,
    total_files: usize,
}

struct Pipeline<'a> {
    extractor: FeatureExtractor<'a>,
    duplicates: &'a DuplicateCatalog,
    scorer: ConfidenceScorer,
    assessor: RiskAssessor,
    planner: ActionPlanner,
    target_root: &'a Path,
}

impl Pipeline<'_> {
    fn evaluate(&self, record: &FileRecord) -> Evaluation {
        let extraction = self.extractor.extract(record);
        let confidence = self.scorer.score(&extraction.features);
        let risk = self.assessor.assess(&extraction.features);
        let mut decision = self
            .planner
            .decide(confidence, risk.level, extraction.features.degraded);
        decision.reasons.extend(risk.reasons.iter().cloned());

        let destination = destination_for(
            self.target_root,
            record.file_name(),
            extraction.category,
            self.duplicates.is_redundant(&record.path),
        );
        let mut issues = extraction.issues;
        if destination == record.path {
            decision.action = ProposedAction::Skip;
            decision.reasons.push("already at its destination".to_string());
        } else if record.path.to_str().is_none() || destination.to_str().is_none() {
            // The log stores text paths; a lossy name could not be rolled back.
            if decision.action != ProposedAction::Skip {
                decision.action = ProposedAction::Skip;
                decision.reasons.push("path is not valid UTF-8".to_string());
                issues.push(Issue::new(
                    &record.path,
                    IssueKind::ScanError,
                    "path is not valid UTF-8 and cannot be logged for rollback; left in place",
                ));
            }
        }

        Evaluation {
            path: record.path.clone(),
            destination,
            features: extraction.features,
            confidence,
            risk,
            decision,
            issues,
        }
    }
}

impl OrganizeEngine {
    pub fn new(config: AppConfig) -> Result<Self, Error> {
        config.validate()?;
        // The built-in heuristic reads nothing but the path; it needs no timeout.
        let classifier: Option<Arc<dyn Classifier>> = if config.classifier.enabled {
            Some(Arc::new(HeuristicClassifier))
        } else {
            None
        };
        Ok(Self {
            config,
            classifier,
            classifier_timeout: None,
            reference_time: None,
            cancel: CancelToken::new(),
        })
    }

    /// Replace the predictive classifier. Calls are bounded by
    /// `classifier.timeout_ms`.
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self.classifier_timeout = Some(Duration::from_millis(self.config.classifier.timeout_ms));
        self
    }

    /// Fix "now" for age and activity features. Defaults to the run start.
    pub fn with_reference_time(mut self, at: DateTime<Utc>) -> Self {
        self.reference_time = Some(at);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Token that stops the current run between files when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn target_root(&self) -> Result<PathBuf, Error> {
        Ok(config::resolve_path(&self.config.target_root)?)
    }

    /// Filesystem source over the configured roots. The target root and the
    /// database files are never scanned. Roots and exclusions are resolved the
    /// same way, so relative roots such as `.` are excluded correctly.
    pub fn walk_source(&self) -> Result<WalkSource, Error> {
        let roots = self
            .config
            .root_paths
            .iter()
            .map(config::resolve_path)
            .collect::<Result<Vec<_>, _>>()?;
        let roots = config::non_overlapping_directories(roots);
        info!("Processing directories: {:?}", roots);

        let database = config::resolve_path(&self.config.database_path)?;
        let mut source = WalkSource::new(&roots, &self.config.ignore_patterns)
            .exclude_dir(self.target_root()?)
            .exclude_dir(&database);
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = database.clone().into_os_string();
            sidecar.push(suffix);
            source = source.exclude_dir(PathBuf::from(sidecar));
        }
        Ok(source)
    }

    /// Evaluate everything, move nothing. `ProposeConfirm` decisions are still
    /// persisted so they can receive feedback.
    pub fn plan(
        &self,
        db: &Database,
        source: &dyn FileSource,
        reporter: &dyn ProgressReporter,
    ) -> Result<RunReport, Error> {
        let run_id = db.create_run(true)?;
        self.run(db, run_id, true, source, reporter)
    }

    pub fn organize(
        &self,
        db: &Database,
        source: &dyn FileSource,
        reporter: &dyn ProgressReporter,
    ) -> Result<RunReport, Error> {
        let run_id = db.create_run(false)?;
        self.run(db, run_id, false, source, reporter)
    }

    /// Continue an interrupted run. Moves already in its log are not repeated.
    pub fn resume(
        &self,
        db: &Database,
        run_id: i64,
        source: &dyn FileSource,
        reporter: &dyn ProgressReporter,
    ) -> Result<RunReport, Error> {
        let run = db.get_run(run_id)?.ok_or(Error::UnknownRun(run_id))?;
        if run.dry_run {
            return Err(Error::Other(format!("run {} was a dry run; nothing to resume", run_id)));
        }
        info!("Resuming run {} (last status: {})", run_id, run.status);
        self.run(db, run_id, false, source, reporter)
    }

    /// Scan for duplicates only; nothing is evaluated, recorded or moved.
    pub fn find_duplicates(
        &self,
        source: &dyn FileSource,
        reporter: &dyn ProgressReporter,
    ) -> DuplicateReport {
        match self.scan(source, reporter) {
            Some(scan) => DuplicateReport::from_catalog(scan.total_files, &scan.duplicates),
            None => DuplicateReport {
                cancelled: true,
                ..DuplicateReport::default()
            },
        }
    }

    /// Phases 1 and 2: directory context and duplicate candidates, then the
    /// hash tiers. `None` when cancelled.
    fn scan(&self, source: &dyn FileSource, reporter: &dyn ProgressReporter) -> Option<Scan> {
        info!("Scanning files...");
        reporter.on_scan_start();
        let scan_start = Instant::now();
        let directories = DirectoryContext::new();
        let detector = DuplicateDetector::new();
        let mut total_files = 0usize;
        for record in source.records() {
            if self.cancel.is_cancelled() {
                return None;
            }
            directories.observe(&record);
            detector.add(&record);
            total_files += 1;
            reporter.on_scan_progress(total_files, &record.path.to_string_lossy());
        }
        let scan_secs = scan_start.elapsed().as_secs_f64();
        reporter.on_scan_complete(total_files, scan_secs);
        debug!(
            "Scan completed in {:.2}s: {} files in {} directories",
            scan_secs,
            total_files,
            directories.directory_count()
        );

        info!("Building content hashes for possible duplicates...");
        reporter.on_hash_start(detector.candidate_count());
        let hash_start = Instant::now();
        let duplicates = detector.detect();
        let hash_secs = hash_start.elapsed().as_secs_f64();
        reporter.on_hash_complete(duplicates.groups().len(), hash_secs);
        debug!(
            "Hash completed in {:.2}s: {} duplicate groups, {} wasted bytes",
            hash_secs,
            duplicates.groups().len(),
            duplicates.wasted_bytes()
        );

        Some(Scan {
            directories,
            duplicates,
            total_files,
        })
    }

    fn run(
        &self,
        db: &Database,
        run_id: i64,
        dry_run: bool,
        source: &dyn FileSource,
        reporter: &dyn ProgressReporter,
    ) -> Result<RunReport, Error> {
        let reference_time = self.reference_time.unwrap_or_else(Utc::now);
        let target_root = self.target_root()?;
        let mut report = RunReport::new(run_id, dry_run);

        let (weights, weight_issues) = feedback::load_weights(db, self.config.initial_weights())?;
        report.errors.extend(weight_issues);

        let Some(Scan {
            directories,
            duplicates,
            total_files,
        }) = self.scan(source, reporter)
        else {
            return self.finish(db, report, true);
        };
        report.duplicate_groups = duplicates.groups().iter().map(DuplicateGroupReport::from).collect();
        report.wasted_bytes = duplicates.wasted_bytes();
        report.errors.extend(duplicates.issues().iter().cloned());

        // Phase 3: evaluate in batches, execute in order
        info!("Evaluating {} files...", total_files);
        reporter.on_evaluate_start(total_files);
        let eval_start = Instant::now();

        let bounded = match (&self.classifier, self.classifier_timeout) {
            (Some(inner), Some(timeout)) => Some(TimeoutClassifier::new(Arc::clone(inner), timeout)),
            _ => None,
        };
        let classifier: Option<&dyn Classifier> = match &bounded {
            Some(bounded) => Some(bounded),
            None => self.classifier.as_deref(),
        };
        let mut extractor = FeatureExtractor::new(reference_time, &directories, &duplicates);
        if let Some(classifier) = classifier {
            extractor = extractor.with_classifier(classifier);
        }
        let pipeline = Pipeline {
            extractor,
            duplicates: &duplicates,
            scorer: ConfidenceScorer::new(weights),
            assessor: RiskAssessor::new(self.config.risk),
            planner: ActionPlanner::new(self.config.thresholds),
            target_root: &target_root,
        };

        let mut executor = if dry_run {
            OperationExecutor::dry_run(db, run_id)
        } else {
            OperationExecutor::new(db, run_id)?
        };
        let already_proposed: HashSet<String> = db
            .get_proposals_for_run(run_id)?
            .into_iter()
            .map(|p| p.path)
            .collect();

        let mut records = source.records();
        let mut evaluated_count = 0usize;
        let mut moved = 0usize;
        loop {
            let batch: Vec<FileRecord> = records.by_ref().take(self.config.batch_size).collect();
            if batch.is_empty() {
                break;
            }
            let evaluations: Vec<Evaluation> =
                batch.par_iter().map(|record| pipeline.evaluate(record)).collect();

            for eval in evaluations {
                if self.cancel.is_cancelled() {
                    return self.finish(db, report, true);
                }
                let path = eval.path.to_string_lossy().into_owned();
                let destination = eval.destination.to_string_lossy().into_owned();

                let proposal_id = if eval.decision.action == ProposedAction::ProposeConfirm
                    && !already_proposed.contains(&path)
                {
                    Some(db.insert_proposal(
                        run_id,
                        &path,
                        &destination,
                        eval.confidence,
                        eval.risk.level.as_str(),
                        &serde_json::to_string(&eval.features)?,
                    )?)
                } else {
                    None
                };

                report.errors.extend(eval.issues);
                report.push(ProposalReport {
                    path,
                    destination,
                    action: eval.decision.action,
                    confidence: eval.confidence,
                    risk: eval.risk.level,
                    reasons: eval.decision.reasons,
                    proposal_id,
                });

                let planned = PlannedMove {
                    source: eval.path,
                    destination: eval.destination,
                    action: eval.decision.action,
                };
                match executor.execute(&planned)? {
                    ExecutionOutcome::Moved(_) => moved += 1,
                    ExecutionOutcome::Failed(_, issue) => report.errors.push(issue),
                    ExecutionOutcome::Collision(issue) | ExecutionOutcome::Refused(issue) => {
                        report.downgrade_last(issue.message.clone());
                        report.errors.push(issue);
                    }
                    ExecutionOutcome::AlreadyDone
                    | ExecutionOutcome::NotExecutable
                    | ExecutionOutcome::Planned => {}
                }

                evaluated_count += 1;
                reporter.on_evaluate_progress(evaluated_count, total_files);
            }
        }

        let eval_secs = eval_start.elapsed().as_secs_f64();
        reporter.on_evaluate_complete(moved, eval_secs);
        debug!(
            "Evaluation completed in {:.2}s: {} files, {} moved",
            eval_secs, evaluated_count, moved
        );

        self.finish(db, report, false)
    }

    fn finish(&self, db: &Database, mut report: RunReport, cancelled: bool) -> Result<RunReport, Error> {
        report.status = if cancelled {
            warn!("Run {} cancelled; resume it to continue", report.run_id);
            RunStatus::Cancelled
        } else if report.errors.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        };
        db.complete_run(report.run_id, report.status.as_str())?;

        info!(
            "Run {} {}: {} auto, {} review, {} proposed, {} skipped, {} issues",
            report.run_id,
            report.status,
            report.count(ProposedAction::AutoExecute),
            report.count(ProposedAction::ReviewExecute),
            report.count(ProposedAction::ProposeConfirm),
            report.count(ProposedAction::Skip),
            report.errors.len()
        );
        Ok(report)
    }
}
