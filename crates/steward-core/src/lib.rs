pub mod analysis;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod feedback;
pub mod hasher;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod storage;

pub use cancel::CancelToken;
pub use config::AppConfig;
pub use engine::OrganizeEngine;
pub use error::{Error, Issue, IssueKind};
pub use feedback::{FeedbackStore, HumanDecision};
pub use progress::{ProgressReporter, SilentReporter};
pub use report::{RunReport, RunStatus};
pub use storage::Database;
