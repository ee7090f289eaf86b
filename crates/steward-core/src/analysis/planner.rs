use super::category::Category;
use super::risk::RiskLevel;
use crate::config::Thresholds;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DUPLICATES_FOLDER: &str = "Duplicates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposedAction {
    AutoExecute,
    ReviewExecute,
    ProposeConfirm,
    Skip,
}

impl ProposedAction {
    pub const ALL: [ProposedAction; 4] = [
        ProposedAction::AutoExecute,
        ProposedAction::ReviewExecute,
        ProposedAction::ProposeConfirm,
        ProposedAction::Skip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposedAction::AutoExecute => "auto_execute",
            ProposedAction::ReviewExecute => "review_execute",
            ProposedAction::ProposeConfirm => "propose_confirm",
            ProposedAction::Skip => "skip",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }

    /// Whether the executor carries this action out.
    pub fn is_executable(&self) -> bool {
        matches!(self, ProposedAction::AutoExecute | ProposedAction::ReviewExecute)
    }
}

impl fmt::Display for ProposedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Band {
    Skip,
    Propose,
    Review,
    Auto,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: ProposedAction,
    pub reasons: Vec<String>,
}

/// Deterministic table over (confidence band, risk).
///
/// | confidence | risk <= Medium | High           | Critical       |
/// |------------|----------------|----------------|----------------|
/// | >= auto    | AutoExecute    | ReviewExecute  | ProposeConfirm |
/// | >= review  | ReviewExecute  | ReviewExecute  | ProposeConfirm |
/// | >= propose | ProposeConfirm | ProposeConfirm | Skip           |
/// | below      | Skip           | Skip           | Skip           |
#[derive(Debug, Clone, Copy)]
pub struct ActionPlanner {
    thresholds: Thresholds,
}

impl ActionPlanner {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    fn band(&self, confidence: f64) -> Band {
        let t = &self.thresholds;
        if confidence >= t.auto_execute {
            Band::Auto
        } else if confidence >= t.review_execute {
            Band::Review
        } else if confidence >= t.propose_confirm {
            Band::Propose
        } else {
            Band::Skip
        }
    }

    pub fn action_for(&self, confidence: f64, risk: RiskLevel) -> ProposedAction {
        use ProposedAction::*;
        match (self.band(confidence), risk) {
            (Band::Skip, _) => Skip,
            (Band::Propose, RiskLevel::Critical) => Skip,
            (Band::Propose, _) => ProposeConfirm,
            (Band::Review | Band::Auto, RiskLevel::Critical) => ProposeConfirm,
            (Band::Review, _) => ReviewExecute,
            (Band::Auto, RiskLevel::High) => ReviewExecute,
            (Band::Auto, RiskLevel::Low | RiskLevel::Medium) => AutoExecute,
        }
    }

    /// Full decision, including the degraded-input ceiling.
    pub fn decide(&self, confidence: f64, risk: RiskLevel, degraded: bool) -> Decision {
        let mut action = self.action_for(confidence, risk);
        let mut reasons = vec![format!("confidence {:.3}, risk {}", confidence, risk)];

        if degraded && action.is_executable() {
            action = ProposedAction::ProposeConfirm;
            reasons.push("features degraded; needs confirmation".to_string());
        }

        Decision { action, reasons }
    }
}

/// Where an organized file goes: redundant copies into `Duplicates/`,
/// everything else into a folder per category.
pub fn destination_for(
    target_root: &Path,
    file_name: impl AsRef<OsStr>,
    category: Category,
    redundant: bool,
) -> PathBuf {
    let folder = if redundant {
        DUPLICATES_FOLDER
    } else {
        category.folder_name()
    };
    target_root.join(folder).join(file_name.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn planner() -> ActionPlanner {
        ActionPlanner::new(Thresholds::default())
    }

    #[test]
    fn test_reference_scenarios() {
        let p = planner();
        assert_eq!(p.action_for(0.95, RiskLevel::Low), ProposedAction::AutoExecute);
        assert_eq!(p.action_for(0.6, RiskLevel::Medium), ProposedAction::ProposeConfirm);
        assert_eq!(p.action_for(0.8, RiskLevel::High), ProposedAction::ReviewExecute);
        assert_eq!(p.action_for(0.3, RiskLevel::Low), ProposedAction::Skip);
    }

    #[test]
    fn test_lower_bounds_are_inclusive() {
        let p = planner();
        assert_eq!(p.action_for(0.9, RiskLevel::Medium), ProposedAction::AutoExecute);
        assert_eq!(p.action_for(0.7, RiskLevel::Low), ProposedAction::ReviewExecute);
        assert_eq!(p.action_for(0.5, RiskLevel::High), ProposedAction::ProposeConfirm);
        assert_eq!(p.action_for(0.4999, RiskLevel::Low), ProposedAction::Skip);
    }

    #[test]
    fn test_critical_column() {
        let p = planner();
        assert_eq!(p.action_for(1.0, RiskLevel::Critical), ProposedAction::ProposeConfirm);
        assert_eq!(p.action_for(0.75, RiskLevel::Critical), ProposedAction::ProposeConfirm);
        assert_eq!(p.action_for(0.6, RiskLevel::Critical), ProposedAction::Skip);
        assert_eq!(p.action_for(0.1, RiskLevel::Critical), ProposedAction::Skip);
    }

    #[test]
    fn test_degraded_input_is_never_executed() {
        let d = planner().decide(0.99, RiskLevel::Low, true);
        assert_eq!(d.action, ProposedAction::ProposeConfirm);
        assert_eq!(d.reasons.len(), 2);
    }

    #[test]
    fn test_destination_layout() {
        let root = Path::new("/org");
        assert_eq!(
            destination_for(root, "a.jpg", Category::Images, false),
            PathBuf::from("/org/Images/a.jpg")
        );
        assert_eq!(
            destination_for(root, "a.jpg", Category::Images, true),
            PathBuf::from("/org/Duplicates/a.jpg")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_destination_keeps_raw_file_name() {
        use std::os::unix::ffi::OsStrExt;
        let name = OsStr::from_bytes(b"r\xe9sum\xe9.txt");
        let dest = destination_for(Path::new("/org"), name, Category::Documents, false);
        assert_eq!(dest.file_name(), Some(name));
    }

    #[test]
    fn test_action_names_round_trip() {
        for action in ProposedAction::ALL {
            assert_eq!(ProposedAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(ProposedAction::parse("delete"), None);
    }

    fn risk_level() -> impl Strategy<Value = RiskLevel> {
        prop_oneof![
            Just(RiskLevel::Low),
            Just(RiskLevel::Medium),
            Just(RiskLevel::High),
            Just(RiskLevel::Critical),
        ]
    }

    proptest! {
        #[test]
        fn critical_never_auto_executes(confidence in 0.0f64..=1.0, degraded in any::<bool>()) {
            let d = planner().decide(confidence, RiskLevel::Critical, degraded);
            prop_assert!(matches!(d.action, ProposedAction::ProposeConfirm | ProposedAction::Skip));
        }

        #[test]
        fn higher_risk_never_yields_a_more_automatic_action(
            confidence in 0.0f64..=1.0,
            a in risk_level(),
            b in risk_level(),
        ) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            let p = planner();
            // Enum order runs from most to least automatic.
            prop_assert!(p.action_for(confidence, low) <= p.action_for(confidence, high));
        }
    }
}
