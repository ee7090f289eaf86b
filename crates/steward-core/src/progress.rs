/// Phase callbacks for a pipeline run.
///
/// The CLI implements this with indicatif bars. Every method defaults to a
/// no-op, and implementations must tolerate calls from the engine thread only.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self) {}
    fn on_scan_progress(&self, _files_found: usize, _current_path: &str) {}
    fn on_scan_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_hash_start(&self, _candidates: usize) {}
    fn on_hash_complete(&self, _duplicate_groups: usize, _duration_secs: f64) {}
    fn on_evaluate_start(&self, _total_files: usize) {}
    fn on_evaluate_progress(&self, _files_done: usize, _total_files: usize) {}
    fn on_evaluate_complete(&self, _moved: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
