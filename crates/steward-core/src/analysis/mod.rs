pub mod category;
pub mod classifier;
pub mod duplicates;
pub mod features;
pub mod planner;
pub mod risk;
pub mod scoring;

pub use category::Category;
pub use classifier::{Classifier, ClassifierError, FeatureContext, HeuristicClassifier, TimeoutClassifier};
pub use duplicates::{DuplicateCatalog, DuplicateDetector, DuplicateGroup};
pub use features::{Dimension, FeatureExtractor, FeatureVector, NEUTRAL};
pub use planner::{ActionPlanner, Decision, ProposedAction};
pub use risk::{RiskAssessment, RiskAssessor, RiskLevel};
pub use scoring::{ConfidenceScorer, WeightVector};
