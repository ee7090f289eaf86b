use crate::analysis::scoring::WeightVector;
use crate::error::Error;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub root_paths: Vec<String>,
    pub ignore_patterns: Vec<String>,
    /// Directory that organized files are moved into.
    pub target_root: String,
    pub database_path: String,
    /// Number of records extracted per parallel batch.
    pub batch_size: usize,
    pub thresholds: Thresholds,
    pub risk: RiskConfig,
    /// Initial weights, used only when no weight vector has been persisted yet.
    pub weights: Option<WeightConfig>,
    pub learning: LearningConfig,
    pub classifier: ClassifierConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_paths: Vec::new(),
            ignore_patterns: Vec::new(),
            target_root: "organized".to_string(),
            database_path: "steward.db".to_string(),
            batch_size: 256,
            thresholds: Thresholds::default(),
            risk: RiskConfig::default(),
            weights: None,
            learning: LearningConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Lower bounds of the confidence bands used by the action planner.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub auto_execute: f64,
    pub review_execute: f64,
    pub propose_confirm: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            auto_execute: 0.9,
            review_execute: 0.7,
            propose_confirm: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Reversibility at or below this forces `Critical`.
    pub critical_reversibility: f64,
    /// PersonalDataSignal at or below this forces `Critical`.
    pub critical_personal_data: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            critical_reversibility: 0.1,
            critical_personal_data: 0.1,
        }
    }
}

/// Named form of the ten scorer weights, as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WeightConfig {
    pub file_type: f64,
    pub location: f64,
    pub age: f64,
    pub size: f64,
    pub activity: f64,
    pub reversibility: f64,
    pub personal_data: f64,
    pub context: f64,
    pub predictive: f64,
    pub duplicate: f64,
}

impl WeightConfig {
    pub fn to_array(&self) -> [f64; 10] {
        [
            self.file_type,
            self.location,
            self.age,
            self.size,
            self.activity,
            self.reversibility,
            self.personal_data,
            self.context,
            self.predictive,
            self.duplicate,
        ]
    }
}

/// Longest rate-limit window accepted for weight updates, one leap year.
pub const MAX_WINDOW_SECS: i64 = 366 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub learning_rate: f64,
    /// Largest change any single update may apply to one weight.
    pub max_delta: f64,
    pub max_updates_per_window: u32,
    pub window_secs: i64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.02,
            max_delta: 0.01,
            max_updates_per_window: 20,
            window_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 500,
        }
    }
}

impl AppConfig {
    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), Error> {
        let t = &self.thresholds;
        let ordered = t.auto_execute <= 1.0
            && t.auto_execute > t.review_execute
            && t.review_execute > t.propose_confirm
            && t.propose_confirm > 0.0;
        if !ordered {
            return Err(Error::InvalidConfig(format!(
                "thresholds must satisfy 1 >= auto_execute > review_execute > propose_confirm > 0, got {:?}",
                t
            )));
        }

        for (name, value) in [
            ("risk.critical_reversibility", self.risk.critical_reversibility),
            ("risk.critical_personal_data", self.risk.critical_personal_data),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidConfig(format!("{} must be in [0, 1], got {}", name, value)));
            }
        }

        let l = &self.learning;
        if !(l.learning_rate >= 0.0 && l.max_delta >= 0.0 && l.window_secs > 0) {
            return Err(Error::InvalidConfig(format!(
                "learning parameters must be non-negative with a positive window, got {:?}",
                l
            )));
        }
        if l.window_secs > MAX_WINDOW_SECS {
            return Err(Error::InvalidConfig(format!(
                "learning.window_secs must be at most {}, got {}",
                MAX_WINDOW_SECS, l.window_secs
            )));
        }

        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".to_string()));
        }

        if let Some(weights) = &self.weights {
            WeightVector::new(weights.to_array())?;
        }

        Ok(())
    }

    /// Weights to seed the scorer with when nothing is persisted.
    pub fn initial_weights(&self) -> WeightVector {
        self.weights
            .as_ref()
            .and_then(|w| WeightVector::new(w.to_array()).ok())
            .unwrap_or_default()
    }
}

/// Load `Steward.toml` (optional) with `STEWARD__*` environment overrides.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Steward").required(false))
        .add_source(
            Environment::with_prefix("STEWARD")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("root_paths")
                .with_list_parse_key("ignore_patterns"),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Drop directories nested inside another directory of the list. Compare
/// paths of one form only, e.g. everything through [`resolve_path`].
pub fn non_overlapping_directories<P: AsRef<Path>>(dirs: Vec<P>) -> Vec<P> {
    let mut sorted = dirs;
    sorted.sort_by_key(|d| d.as_ref().components().count());

    let mut result: Vec<P> = Vec::new();
    for dir in sorted {
        let covered = result
            .iter()
            .any(|kept| dir.as_ref().starts_with(kept.as_ref()));
        if !covered {
            result.push(dir);
        }
    }
    result
}

/// Absolute form of a configured path, with `.` and `..` folded away
/// lexically. Symlinks are left alone, so the result names the same entry
/// the walker will report.
pub fn resolve_path(path: impl AsRef<Path>) -> io::Result<PathBuf> {
    let path = path.as_ref();
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    Ok(resolved)
}
