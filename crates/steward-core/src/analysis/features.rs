//! Turns a `FileRecord` into the ten-dimensional `FeatureVector`.
//!
//! Every dimension is in [0, 1] and oriented so that a higher value favours
//! automatic handling. Anything that cannot be measured is `NEUTRAL`.

use super::category::Category;
use super::classifier::{Classifier, FeatureContext};
use super::duplicates::DuplicateCatalog;
use crate::error::{Issue, IssueKind};
use crate::scanner::{DirectoryContext, FileRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Component, Path};

pub const DIMENSIONS: usize = 10;

/// Value used for every dimension whose input is missing.
pub const NEUTRAL: f64 = 0.5;

pub const AGE_HORIZON_DAYS: f64 = 365.0;
pub const ACTIVITY_HORIZON_DAYS: f64 = 30.0;
pub const SIZE_HORIZON_BYTES: f64 = 4.0 * 1024.0 * 1024.0 * 1024.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Type,
    Location,
    Age,
    Size,
    ActivitySignal,
    Reversibility,
    PersonalDataSignal,
    Context,
    PredictiveFactor,
    DuplicateSignal,
}

impl Dimension {
    pub const ALL: [Dimension; DIMENSIONS] = [
        Dimension::Type,
        Dimension::Location,
        Dimension::Age,
        Dimension::Size,
        Dimension::ActivitySignal,
        Dimension::Reversibility,
        Dimension::PersonalDataSignal,
        Dimension::Context,
        Dimension::PredictiveFactor,
        Dimension::DuplicateSignal,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Dimension::Type => "type",
            Dimension::Location => "location",
            Dimension::Age => "age",
            Dimension::Size => "size",
            Dimension::ActivitySignal => "activity",
            Dimension::Reversibility => "reversibility",
            Dimension::PersonalDataSignal => "personal_data",
            Dimension::Context => "context",
            Dimension::PredictiveFactor => "predictive",
            Dimension::DuplicateSignal => "duplicate",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: [f64; DIMENSIONS],
    pub degraded: bool,
}

impl FeatureVector {
    pub fn neutral() -> Self {
        Self {
            values: [NEUTRAL; DIMENSIONS],
            degraded: false,
        }
    }

    /// Out-of-range and NaN inputs are clamped / replaced by `NEUTRAL`.
    pub fn from_values(values: [f64; DIMENSIONS]) -> Self {
        let mut vector = Self::neutral();
        for d in Dimension::ALL {
            vector.set(d, values[d.index()]);
        }
        vector
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        self.values[dimension.index()]
    }

    pub fn set(&mut self, dimension: Dimension, value: f64) {
        self.values[dimension.index()] = if value.is_nan() {
            NEUTRAL
        } else {
            value.clamp(0.0, 1.0)
        };
    }

    pub fn values(&self) -> &[f64; DIMENSIONS] {
        &self.values
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::neutral()
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub features: FeatureVector,
    pub category: Category,
    pub issues: Vec<Issue>,
}

/// Stateless apart from borrowed, read-only context; safe to share across
/// rayon workers.
pub struct FeatureExtractor<'a> {
    reference_time: DateTime<Utc>,
    directories: &'a DirectoryContext,
    duplicates: &'a DuplicateCatalog,
    classifier: Option<&'a dyn Classifier>,
}

impl<'a> FeatureExtractor<'a> {
    pub fn new(
        reference_time: DateTime<Utc>,
        directories: &'a DirectoryContext,
        duplicates: &'a DuplicateCatalog,
    ) -> Self {
        Self {
            reference_time,
            directories,
            duplicates,
            classifier: None,
        }
    }

    pub fn with_classifier(mut self, classifier: &'a dyn Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn extract(&self, record: &FileRecord) -> Extraction {
        let mut features = FeatureVector::neutral();
        let mut issues = Vec::new();
        let category = Category::from_extension(&record.extension());

        // Path-derived dimensions need no I/O and survive unreadable files.
        features.set(Dimension::Type, category.type_score());
        features.set(Dimension::Location, location_score(&record.path));
        features.set(Dimension::PersonalDataSignal, personal_data_score(&record.path));

        if !record.readable {
            features.degraded = true;
            issues.push(Issue::new(
                &record.path,
                IssueKind::ScanError,
                "file is not readable; metadata features left neutral",
            ));
            return Extraction {
                features,
                category,
                issues,
            };
        }

        let age_days = record.modified.map(|m| self.days_since(m));
        if let Some(days) = age_days {
            features.set(Dimension::Age, days / AGE_HORIZON_DAYS);
        }
        features.set(Dimension::Size, size_score(record.size));
        features.set(Dimension::Reversibility, reversibility_score(&record.path));

        if let Some(stats) = self.directories.stats(record.parent_dir()) {
            if let Some(newest) = stats.newest_modified {
                features.set(
                    Dimension::ActivitySignal,
                    self.days_since(newest) / ACTIVITY_HORIZON_DAYS,
                );
            }
            if stats.file_count > 1 {
                let same = stats.same_extension_count(&record.extension()).max(1);
                let odd_one_out = 1.0 - (same - 1) as f64 / (stats.file_count - 1) as f64;
                features.set(Dimension::Context, odd_one_out);
            }
        }

        if let Some(classifier) = self.classifier {
            let ctx = FeatureContext {
                path: record.path.clone(),
                extension: record.extension(),
                size: record.size,
                age_days,
            };
            match classifier.classify(&ctx) {
                Ok(score) => features.set(Dimension::PredictiveFactor, score),
                Err(e) => issues.push(Issue::new(
                    &record.path,
                    IssueKind::ClassifierUnavailable,
                    e.to_string(),
                )),
            }
        }

        features.set(Dimension::DuplicateSignal, self.duplicates.signal(&record.path));

        Extraction {
            features,
            category,
            issues,
        }
    }

    fn days_since(&self, then: DateTime<Utc>) -> f64 {
        let seconds = (self.reference_time - then).num_seconds().max(0);
        seconds as f64 / SECONDS_PER_DAY
    }
}

/// `1 - ln(1 + bytes) / ln(1 + 4 GiB)`, clamped. Huge files score low.
pub fn size_score(bytes: u64) -> f64 {
    let scaled = (1.0 + bytes as f64).ln() / (1.0 + SIZE_HORIZON_BYTES).ln();
    1.0 - scaled.clamp(0.0, 1.0)
}

const LOCATION_SCORES: &[(&str, f64)] = &[
    ("tmp", 0.9),
    ("temp", 0.9),
    ("downloads", 0.85),
    ("download", 0.85),
    ("desktop", 0.75),
    ("inbox", 0.75),
    ("documents", 0.5),
    ("home", 0.5),
    ("archive", 0.3),
    ("archives", 0.3),
    ("projects", 0.3),
    ("backup", 0.25),
    ("backups", 0.25),
    ("organized", 0.2),
    ("src", 0.2),
];

/// Score of the nearest ancestor directory with a known name.
pub fn location_score(path: &Path) -> f64 {
    let Some(parent) = path.parent() else {
        return NEUTRAL;
    };
    parent
        .components()
        .rev()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().to_lowercase()),
            _ => None,
        })
        .find_map(|name| {
            LOCATION_SCORES
                .iter()
                .find(|(keyword, _)| *keyword == name)
                .map(|(_, score)| *score)
        })
        .unwrap_or(NEUTRAL)
}

const STRONG_PERSONAL: &[&str] = &[
    "passport",
    "ssn",
    "password",
    "passwords",
    "credentials",
    "tax",
    "taxes",
    "medical",
    "diagnosis",
    "prescription",
    "bank",
    "banking",
    "payslip",
    "salary",
];

const WEAK_PERSONAL: &[&str] = &[
    "invoice",
    "invoices",
    "receipt",
    "receipts",
    "resume",
    "cv",
    "contract",
    "statement",
    "insurance",
    "lease",
    "personal",
];

/// 0.05 for strong indicators anywhere in the path, 0.4 for weak ones,
/// 0.9 when nothing suggests personal data.
pub fn personal_data_score(path: &Path) -> f64 {
    let lowered = path.to_string_lossy().to_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.iter().any(|t| STRONG_PERSONAL.contains(t)) {
        0.05
    } else if tokens.iter().any(|t| WEAK_PERSONAL.contains(t)) {
        0.4
    } else {
        0.9
    }
}

const VCS_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// 0.1 inside version-control metadata, 0.3 for read-only files, 0.9 otherwise.
pub fn reversibility_score(path: &Path) -> f64 {
    let in_vcs = path.components().any(|c| match c {
        Component::Normal(name) => VCS_DIRS.iter().any(|v| name == *v),
        _ => false,
    });
    if in_vcs {
        return 0.1;
    }
    match fs::metadata(path) {
        Ok(m) if m.permissions().readonly() => 0.3,
        Ok(_) => 0.9,
        Err(_) => NEUTRAL,
    }
}
