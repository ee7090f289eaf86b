//! Human corrections and the weight updates they drive.
//!
//! Every accept or reject is stored. Weights move by a bounded step per
//! decision, at most `max_updates_per_window` times per window, and are
//! written back only at [`FeedbackStore::commit`].

use crate::analysis::features::{FeatureVector, DIMENSIONS};
use crate::analysis::{ProposedAction, WeightVector};
use crate::config::LearningConfig;
use crate::error::{Error, Issue, IssueKind};
use crate::storage::{timestamp, Database};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanDecision {
    Accept,
    Reject,
}

impl HumanDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            HumanDecision::Accept => "accept",
            HumanDecision::Reject => "reject",
        }
    }

    fn sign(&self) -> f64 {
        match self {
            HumanDecision::Accept => 1.0,
            HumanDecision::Reject => -1.0,
        }
    }
}

impl fmt::Display for HumanDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the human was shown and what they decided.
#[derive(Debug, Clone)]
pub struct Correction {
    pub proposal_id: Option<i64>,
    pub path: String,
    pub predicted_action: ProposedAction,
    pub features: FeatureVector,
    pub decision: HumanDecision,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRecord {
    pub id: i64,
    pub path: String,
    pub predicted_action: ProposedAction,
    pub decision: HumanDecision,
    pub weight_delta: [f64; DIMENSIONS],
    /// False when rate-limited or when the update was discarded.
    pub applied: bool,
    pub recorded_at: String,
}

/// One learning step.
///
/// `delta[i] = clamp(sign * learning_rate * feature[i], ±max_delta)`, each
/// weight is floored at 0, and the vector is renormalized. If renormalizing
/// would still move some weight by more than `max_delta`, the whole step is
/// scaled back toward the old vector until it does not. Returns `None` when
/// every weight would be 0.
pub fn update_weights(
    weights: &WeightVector,
    features: &FeatureVector,
    decision: HumanDecision,
    learning: &LearningConfig,
) -> Option<(WeightVector, [f64; DIMENSIONS])> {
    let old = weights.as_array();
    let cap = learning.max_delta;
    let sign = decision.sign();

    let raw: [f64; DIMENSIONS] = std::array::from_fn(|i| {
        let delta = (sign * learning.learning_rate * features.values()[i]).clamp(-cap, cap);
        (old[i] + delta).max(0.0)
    });
    let sum: f64 = raw.iter().sum();
    if sum <= 0.0 {
        return None;
    }
    let normalized = raw.map(|w| w / sum);

    let largest = old
        .iter()
        .zip(normalized.iter())
        .map(|(o, n)| (n - o).abs())
        .fold(0.0, f64::max);
    let step = if largest > cap { cap / largest } else { 1.0 };
    let blended: [f64; DIMENSIONS] = std::array::from_fn(|i| old[i] + step * (normalized[i] - old[i]));

    let (next, _) = WeightVector::renormalized(blended);
    let delta = std::array::from_fn(|i| next.as_array()[i] - old[i]);
    Some((next, delta))
}

/// Read the persisted weights, repairing them if needed.
///
/// A missing row yields `fallback` silently. Unparseable or invalid data is
/// repaired (or replaced by `fallback`) and reported as `WeightCorruption`.
pub fn load_weights(db: &Database, fallback: WeightVector) -> Result<(WeightVector, Vec<Issue>), Error> {
    let Some(json) = db.load_weights_json()? else {
        return Ok((fallback, Vec::new()));
    };

    let raw: [f64; DIMENSIONS] = match serde_json::from_str(&json) {
        Ok(raw) => raw,
        Err(e) => {
            let issue = Issue::new(
                "weight_vector",
                IssueKind::WeightCorruption,
                format!("stored weights unreadable ({}); using configured weights", e),
            );
            warn!("{}", issue.message);
            return Ok((fallback, vec![issue]));
        }
    };

    let (weights, problem) = WeightVector::renormalized(raw);
    let issues = match problem {
        Some(message) => {
            warn!("{}", message);
            vec![Issue::new("weight_vector", IssueKind::WeightCorruption, message)]
        }
        None => Vec::new(),
    };
    Ok((weights, issues))
}

pub struct FeedbackStore<'a> {
    db: &'a Database,
    learning: LearningConfig,
    weights: WeightVector,
    dirty: bool,
}

impl<'a> FeedbackStore<'a> {
    pub fn open(
        db: &'a Database,
        learning: LearningConfig,
        fallback: WeightVector,
    ) -> Result<(Self, Vec<Issue>), Error> {
        let (weights, issues) = load_weights(db, fallback)?;
        let store = Self {
            db,
            learning,
            weights,
            // repaired weights get written back at the next commit
            dirty: !issues.is_empty(),
        };
        Ok((store, issues))
    }

    /// Working weights, including uncommitted updates.
    pub fn weights(&self) -> &WeightVector {
        &self.weights
    }

    pub fn record(&mut self, correction: &Correction, at: DateTime<Utc>) -> Result<FeedbackRecord, Error> {
        let recorded_at = timestamp(at);
        let window_start = Duration::try_seconds(self.learning.window_secs)
            .and_then(|window| at.checked_sub_signed(window))
            .map(timestamp)
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "learning.window_secs {} reaches outside the supported time range",
                    self.learning.window_secs
                ))
            })?;
        let recent = self.db.count_applied_feedback_since(&window_start)?;

        let update = if recent >= self.learning.max_updates_per_window {
            debug!(
                "Rate limit reached ({} updates in {}s); recording without update",
                recent, self.learning.window_secs
            );
            None
        } else {
            let update = update_weights(
                &self.weights,
                &correction.features,
                correction.decision,
                &self.learning,
            );
            if update.is_none() {
                warn!("Discarded weight update for {}: all weights would be zero", correction.path);
            }
            update
        };

        let (applied, weight_delta) = match update {
            Some((next, delta)) => {
                self.weights = next;
                self.dirty = true;
                (true, delta)
            }
            None => (false, [0.0; DIMENSIONS]),
        };

        let id = self.db.insert_feedback(
            correction.proposal_id,
            &correction.path,
            correction.predicted_action.as_str(),
            correction.decision.as_str(),
            &serde_json::to_string(&weight_delta)?,
            applied,
            &recorded_at,
        )?;

        Ok(FeedbackRecord {
            id,
            path: correction.path.clone(),
            predicted_action: correction.predicted_action,
            decision: correction.decision,
            weight_delta,
            applied,
            recorded_at,
        })
    }

    /// Decide a persisted proposal and learn from it.
    pub fn decide_proposal(
        &mut self,
        proposal_id: i64,
        decision: HumanDecision,
        at: DateTime<Utc>,
    ) -> Result<FeedbackRecord, Error> {
        let proposal = self
            .db
            .get_proposal(proposal_id)?
            .ok_or_else(|| Error::Other(format!("unknown proposal {}", proposal_id)))?;
        if let Some(previous) = &proposal.decision {
            return Err(Error::Other(format!(
                "proposal {} was already decided ({})",
                proposal_id, previous
            )));
        }
        let features: FeatureVector = serde_json::from_str(&proposal.features)?;

        let record = self.record(
            &Correction {
                proposal_id: Some(proposal_id),
                path: proposal.path,
                predicted_action: ProposedAction::ProposeConfirm,
                features,
                decision,
            },
            at,
        )?;
        self.db.set_proposal_decision(proposal_id, decision.as_str())?;
        Ok(record)
    }

    /// Persist the working weights if anything changed since the last commit.
    pub fn commit(&mut self) -> Result<(), Error> {
        if !self.dirty {
            return Ok(());
        }
        self.db
            .save_weights_json(&serde_json::to_string(&self.weights)?)?;
        self.dirty = false;
        info!("Committed weight vector {:?}", self.weights.as_array());
        Ok(())
    }
}
