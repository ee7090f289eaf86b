use super::features::{Dimension, FeatureVector, DIMENSIONS};
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Allowed distance of the weight sum from 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Ten non-negative weights summing to 1. The constructor is the only way
/// in, so every value of this type satisfies the invariant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; DIMENSIONS]", into = "[f64; DIMENSIONS]")]
pub struct WeightVector {
    weights: [f64; DIMENSIONS],
}

impl WeightVector {
    pub fn new(weights: [f64; DIMENSIONS]) -> Result<Self, Error> {
        if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(Error::InvalidWeights(format!(
                "weights must be finite and non-negative, found {}",
                w
            )));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::InvalidWeights(format!(
                "weights must sum to 1, got {}",
                sum
            )));
        }
        Ok(Self { weights })
    }

    /// Repair a vector read back from storage. Negative and non-finite
    /// components become 0, then the rest is rescaled to sum to 1.
    /// Returns the repaired vector and a description of what was wrong, if
    /// anything. Falls back to the defaults when nothing usable is left.
    pub fn renormalized(raw: [f64; DIMENSIONS]) -> (Self, Option<String>) {
        if let Ok(valid) = Self::new(raw) {
            return (valid, None);
        }

        let cleaned: [f64; DIMENSIONS] =
            raw.map(|w| if w.is_finite() && w > 0.0 { w } else { 0.0 });
        let sum: f64 = cleaned.iter().sum();
        let raw_sum: f64 = raw.iter().sum();
        if sum <= 0.0 {
            return (
                Self::default(),
                Some(format!(
                    "stored weights had no positive component (sum {}); reset to defaults",
                    raw_sum
                )),
            );
        }
        let weights = cleaned.map(|w| w / sum);
        (
            Self { weights },
            Some(format!("stored weights summed to {}; renormalized", raw_sum)),
        )
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        self.weights[dimension.index()]
    }

    pub fn as_array(&self) -> &[f64; DIMENSIONS] {
        &self.weights
    }
}

impl Default for WeightVector {
    fn default() -> Self {
        // type, location, age, size, activity, reversibility, personal, context, predictive, duplicate
        Self {
            weights: [0.10, 0.10, 0.15, 0.05, 0.10, 0.10, 0.15, 0.05, 0.05, 0.15],
        }
    }
}

impl TryFrom<[f64; DIMENSIONS]> for WeightVector {
    type Error = Error;

    fn try_from(weights: [f64; DIMENSIONS]) -> Result<Self, Self::Error> {
        Self::new(weights)
    }
}

impl From<WeightVector> for [f64; DIMENSIONS] {
    fn from(w: WeightVector) -> Self {
        w.weights
    }
}

/// `confidence = Σ weight[i] * feature[i]`. Holds an immutable snapshot of the
/// weights for the duration of a run.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceScorer {
    weights: WeightVector,
}

impl ConfidenceScorer {
    pub fn new(weights: WeightVector) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &WeightVector {
        &self.weights
    }

    pub fn score(&self, features: &FeatureVector) -> f64 {
        let sum: f64 = Dimension::ALL
            .iter()
            .map(|d| self.weights.get(*d) * features.get(*d))
            .sum();
        sum.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_weights_are_valid() {
        let w = WeightVector::default();
        assert!(WeightVector::new(*w.as_array()).is_ok());
    }

    #[test]
    fn test_rejects_bad_sum_and_negatives() {
        assert!(WeightVector::new([0.1; DIMENSIONS]).is_ok());
        assert!(WeightVector::new([0.2; DIMENSIONS]).is_err());
        let mut negative = [0.1; DIMENSIONS];
        negative[0] = -0.1;
        negative[1] = 0.3;
        assert!(WeightVector::new(negative).is_err());
    }

    #[test]
    fn test_renormalize_repairs_and_reports() {
        let (w, warning) = WeightVector::renormalized([0.2; DIMENSIONS]);
        assert!(warning.is_some());
        for v in w.as_array() {
            assert!((v - 0.1).abs() < 1e-12);
        }

        let (w, warning) = WeightVector::renormalized([0.0; DIMENSIONS]);
        assert!(warning.is_some());
        assert_eq!(w, WeightVector::default());

        let (_, warning) = WeightVector::renormalized(*WeightVector::default().as_array());
        assert!(warning.is_none());
    }

    #[test]
    fn test_uniform_features_score_their_value() {
        let scorer = ConfidenceScorer::new(WeightVector::default());
        let features = FeatureVector::from_values([0.7; DIMENSIONS]);
        assert!((scorer.score(&features) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_serde_rejects_invalid_weights() {
        assert!(serde_json::from_str::<WeightVector>("[1,1,1,1,1,1,1,1,1,1]").is_err());
        let json = serde_json::to_string(&WeightVector::default()).unwrap();
        let back: WeightVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, WeightVector::default());
    }

    fn weight_vector() -> impl Strategy<Value = WeightVector> {
        prop::array::uniform10(0.0f64..1.0).prop_filter_map("all zero", |raw| {
            let sum: f64 = raw.iter().sum();
            (sum > 1e-6).then(|| WeightVector::renormalized(raw).0)
        })
    }

    proptest! {
        #[test]
        fn score_is_deterministic_and_bounded(
            weights in weight_vector(),
            values in prop::array::uniform10(0.0f64..=1.0),
        ) {
            let scorer = ConfidenceScorer::new(weights);
            let features = FeatureVector::from_values(values);
            let first = scorer.score(&features);
            let second = ConfidenceScorer::new(weights).score(&features);
            prop_assert_eq!(first.to_bits(), second.to_bits());
            prop_assert!((0.0..=1.0).contains(&first));
        }
    }
}
