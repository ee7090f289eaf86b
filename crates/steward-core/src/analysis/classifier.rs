use super::category::Category;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// What a classifier gets to see about a file.
#[derive(Debug, Clone)]
pub struct FeatureContext {
    pub path: PathBuf,
    pub extension: String,
    pub size: u64,
    pub age_days: Option<f64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    #[error("classifier returned out-of-range score {0}")]
    InvalidScore(f64),
}

/// Supplies the PredictiveFactor feature: how likely the file is to be
/// unneeded where it currently sits, in [0, 1].
pub trait Classifier: Send + Sync {
    fn classify(&self, ctx: &FeatureContext) -> Result<f64, ClassifierError>;
}

/// Local rule-of-thumb classifier, used when no model is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicClassifier;

impl Classifier for HeuristicClassifier {
    fn classify(&self, ctx: &FeatureContext) -> Result<f64, ClassifierError> {
        let name = ctx
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let mut score: f64 = match Category::from_extension(&ctx.extension) {
            Category::Archives | Category::Executables => 0.7,
            Category::System | Category::Code => 0.2,
            _ => 0.5,
        };
        // Browser and OS leftovers
        if name.starts_with("copy of ") || name.contains(" (1)") || name.ends_with(".part") {
            score += 0.2;
        }
        if let Some(age) = ctx.age_days {
            if age > 180.0 {
                score += 0.1;
            }
        }
        Ok(score.clamp(0.0, 1.0))
    }
}

/// Bounds every call to an inner classifier. A slow or failing classifier
/// costs at most `timeout` per file and never blocks the pipeline.
///
/// The first timeout trips the wrapper: later calls fail at once instead of
/// stacking more blocked threads behind a hung classifier. Build a fresh
/// wrapper per run to try the classifier again.
pub struct TimeoutClassifier {
    inner: Arc<dyn Classifier>,
    timeout: Duration,
    tripped: AtomicBool,
}

impl TimeoutClassifier {
    pub fn new(inner: Arc<dyn Classifier>, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            tripped: AtomicBool::new(false),
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

impl Classifier for TimeoutClassifier {
    fn classify(&self, ctx: &FeatureContext) -> Result<f64, ClassifierError> {
        if self.is_tripped() {
            return Err(ClassifierError::Unavailable(format!(
                "disabled after a call exceeded {:?}",
                self.timeout
            )));
        }

        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let ctx_owned = ctx.clone();
        thread::spawn(move || {
            // The receiver may be gone after a timeout; nothing to do then.
            let _ = tx.send(inner.classify(&ctx_owned));
        });

        let result = match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if !self.tripped.swap(true, Ordering::SeqCst) {
                    warn!(
                        "Classifier exceeded {:?}; using neutral scores for the rest of the run",
                        self.timeout
                    );
                }
                Err(ClassifierError::Timeout(self.timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ClassifierError::Unavailable(
                "classifier thread exited without answering".to_string(),
            )),
        };

        match result {
            Ok(score) if (0.0..=1.0).contains(&score) => Ok(score),
            Ok(score) => Err(ClassifierError::InvalidScore(score)),
            Err(e) => {
                warn!("Classifier failed for {}: {}", ctx.path.display(), e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow;
    impl Classifier for Slow {
        fn classify(&self, _ctx: &FeatureContext) -> Result<f64, ClassifierError> {
            thread::sleep(Duration::from_millis(500));
            Ok(0.9)
        }
    }

    struct OutOfRange;
    impl Classifier for OutOfRange {
        fn classify(&self, _ctx: &FeatureContext) -> Result<f64, ClassifierError> {
            Ok(1.5)
        }
    }

    fn ctx(path: &str, ext: &str) -> FeatureContext {
        FeatureContext {
            path: PathBuf::from(path),
            extension: ext.to_string(),
            size: 10,
            age_days: Some(1.0),
        }
    }

    #[test]
    fn test_timeout_falls_back_with_error() {
        let classifier = TimeoutClassifier::new(Arc::new(Slow), Duration::from_millis(20));
        let result = classifier.classify(&ctx("/a.txt", "txt"));
        assert!(matches!(result, Err(ClassifierError::Timeout(_))));
    }

    #[test]
    fn test_timeout_trips_and_later_calls_fail_fast() {
        let classifier = TimeoutClassifier::new(Arc::new(Slow), Duration::from_millis(20));
        assert!(classifier.classify(&ctx("/a.txt", "txt")).is_err());
        assert!(classifier.is_tripped());

        let started = std::time::Instant::now();
        let result = classifier.classify(&ctx("/b.txt", "txt"));
        assert!(matches!(result, Err(ClassifierError::Unavailable(_))));
        assert!(started.elapsed() < Duration::from_millis(20));
    }

    #[test]
    fn test_timeout_passes_fast_answers_through() {
        let classifier =
            TimeoutClassifier::new(Arc::new(HeuristicClassifier), Duration::from_secs(5));
        let score = classifier.classify(&ctx("/Copy of a.zip", "zip")).unwrap();
        assert!((score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_score_is_rejected() {
        let classifier = TimeoutClassifier::new(Arc::new(OutOfRange), Duration::from_secs(5));
        assert_eq!(
            classifier.classify(&ctx("/a", "")),
            Err(ClassifierError::InvalidScore(1.5))
        );
    }
}
