//! Score aggregation for the SUOD ensemble

use crate::error::Result;
use crate::models::detectors::OutlierScorer;
use crate::types::dataset::FeatureMatrix;
use std::collections::HashMap;
use std::sync::Arc;

/// Combines per-model scores into a single outlier score.
pub struct ScoreAggregator {
    /// Model weights for weighted average
    weights: HashMap<String, f64>,
    /// Weight for models not in the weights map
    default_weight: f64,
}

impl ScoreAggregator {
    /// Create a new score aggregator with model weights.
    pub fn new(weights: HashMap<String, f64>) -> Self {
        Self {
            weights,
            default_weight: 0.1,
        }
    }

    /// Create aggregator with equal weights for all models.
    pub fn equal_weights() -> Self {
        Self {
            weights: HashMap::new(),
            default_weight: 1.0,
        }
    }

    /// Weighted average of one row's model scores, clamped to `[0, 1]`.
    ///
    /// Scores are summed in the order given, so equal input always yields a
    /// bit-identical result.
    pub fn aggregate(&self, model_scores: &[(&str, f64)]) -> f64 {
        if model_scores.is_empty() {
            return 0.0;
        }

        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for &(model_name, score) in model_scores {
            let weight = self.weight(model_name);
            weighted_sum += score * weight;
            total_weight += weight;
        }

        if total_weight > 0.0 {
            (weighted_sum / total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn weight(&self, model_name: &str) -> f64 {
        self.weights
            .get(model_name)
            .copied()
            .unwrap_or(self.default_weight)
    }
}

impl Default for ScoreAggregator {
    fn default() -> Self {
        Self::equal_weights()
    }
}

/// Rescale scores to `[0, 1]`; a constant vector maps to all zeros.
pub fn min_max_normalise(scores: &[f64]) -> Vec<f64> {
    let lo = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = hi - lo;
    if !(range > 0.0) {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| (s - lo) / range).collect()
}

/// Scalable unsupervised outlier detection: an ensemble of base scorers whose
/// normalised scores are averaged row by row.
pub struct Suod {
    base: Vec<(String, Arc<dyn OutlierScorer>)>,
    aggregator: ScoreAggregator,
}

impl Suod {
    pub fn new(base: Vec<(String, Arc<dyn OutlierScorer>)>, aggregator: ScoreAggregator) -> Self {
        Self { base, aggregator }
    }

    pub fn base_names(&self) -> Vec<&str> {
        self.base.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl OutlierScorer for Suod {
    fn decision_scores(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        let mut per_model = Vec::with_capacity(self.base.len());
        for (name, scorer) in &self.base {
            let scores = scorer.decision_scores(features)?;
            per_model.push((name, min_max_normalise(&scores)));
        }

        Ok((0..features.n_rows())
            .map(|row| {
                let row_scores: Vec<(&str, f64)> = per_model
                    .iter()
                    .map(|(name, scores)| (name.as_str(), scores[row]))
                    .collect();
                self.aggregator.aggregate(&row_scores)
            })
            .collect())
    }
}
