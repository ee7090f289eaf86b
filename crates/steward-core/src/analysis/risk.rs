use super::features::{Dimension, FeatureVector};
use crate::config::RiskConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// One line per sub-signal that raised the level above Low.
    pub reasons: Vec<String>,
}

/// Rule table over (Reversibility, PersonalDataSignal, Size, Type).
///
/// Never looks at confidence. The result is the maximum of the per-signal
/// tiers, and crossing either critical threshold pins it to `Critical`.
#[derive(Debug, Clone, Copy)]
pub struct RiskAssessor {
    config: RiskConfig,
}

impl RiskAssessor {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn assess(&self, features: &FeatureVector) -> RiskAssessment {
        let reversibility = features.get(Dimension::Reversibility);
        let personal = features.get(Dimension::PersonalDataSignal);

        let mut level = RiskLevel::Low;
        let mut reasons = Vec::new();
        let mut raise = |tier: RiskLevel, reason: String| {
            if tier > RiskLevel::Low {
                level = level.max(tier);
                reasons.push(reason);
            }
        };

        if reversibility <= self.config.critical_reversibility {
            raise(
                RiskLevel::Critical,
                format!("reversibility {:.2} is at or below the critical threshold", reversibility),
            );
        }
        if personal <= self.config.critical_personal_data {
            raise(
                RiskLevel::Critical,
                format!("personal data signal {:.2} is at or below the critical threshold", personal),
            );
        }

        raise(
            banded(reversibility, 0.3, 0.6),
            format!("limited reversibility ({:.2})", reversibility),
        );
        raise(
            banded(personal, 0.3, 0.6),
            format!("possible personal data ({:.2})", personal),
        );

        let size = features.get(Dimension::Size);
        if size < 0.1 {
            raise(RiskLevel::Medium, format!("very large file (size score {:.2})", size));
        }

        let file_type = features.get(Dimension::Type);
        let type_tier = if file_type <= 0.15 {
            RiskLevel::High
        } else if file_type <= 0.35 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };
        raise(type_tier, format!("sensitive file type (type score {:.2})", file_type));

        RiskAssessment { level, reasons }
    }
}

fn banded(value: f64, high_below: f64, medium_below: f64) -> RiskLevel {
    if value < high_below {
        RiskLevel::High
    } else if value < medium_below {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
