//! Built-in unsupervised outlier detectors
//!
//! Every detector here fits on the batch it is asked to score, produces one
//! outlier score per row (higher = more anomalous) and flags the rows whose
//! score lies above the `1 - contamination` percentile of the batch.

use crate::error::{Result, ReviewError};
use crate::models::registry::Detector;
use crate::types::dataset::FeatureMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Default expected fraction of outliers
pub const DEFAULT_CONTAMINATION: f64 = 0.1;

/// Produces a raw outlier score for every row.
pub trait OutlierScorer: Send + Sync {
    fn decision_scores(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;
}

impl<S: OutlierScorer + ?Sized> OutlierScorer for std::sync::Arc<S> {
    fn decision_scores(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        (**self).decision_scores(features)
    }
}

/// Turns an [`OutlierScorer`] into a [`Detector`] using a contamination threshold.
pub struct Thresholded<S> {
    scorer: S,
    contamination: f64,
}

impl<S: OutlierScorer> Thresholded<S> {
    pub fn new(scorer: S, contamination: f64) -> Result<Self> {
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(ReviewError::Configuration(format!(
                "contamination must be in (0, 0.5], got {}",
                contamination
            )));
        }
        Ok(Self {
            scorer,
            contamination,
        })
    }
}

impl<S: OutlierScorer> Detector for Thresholded<S> {
    fn detect(&self, features: &FeatureMatrix) -> Result<Vec<bool>> {
        let scores = self.scorer.decision_scores(features)?;
        let threshold = percentile(&scores, 1.0 - self.contamination);
        Ok(scores.iter().map(|&s| s > threshold).collect())
    }
}

/// Linear-interpolated quantile `q` in `[0, 1]`.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Per-cell negative log tail probabilities of one column.
struct TailScores {
    left: Vec<f64>,
    right: Vec<f64>,
    skew_sign: f64,
}

impl TailScores {
    fn from_column(column: &[f64]) -> Self {
        let n = column.len() as f64;
        let mut sorted = column.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let left = column
            .iter()
            .map(|&v| {
                let at_or_below = sorted.partition_point(|&s| s <= v) as f64;
                -(at_or_below / n).ln()
            })
            .collect();
        let right = column
            .iter()
            .map(|&v| {
                let at_or_above = sorted.len() as f64 - sorted.partition_point(|&s| s < v) as f64;
                -(at_or_above / n).ln()
            })
            .collect();

        Self {
            left,
            right,
            skew_sign: sign(skewness(column)),
        }
    }

    /// Left tail for negative skew, right tail for positive, both when symmetric.
    fn skew_corrected(&self, row: usize) -> f64 {
        let left_weight = if self.skew_sign > 0.0 { 0.0 } else { 1.0 };
        let right_weight = if self.skew_sign < 0.0 { 0.0 } else { 1.0 };
        self.left[row] * left_weight + self.right[row] * right_weight
    }
}

fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Fisher-Pearson sample skewness; 0 for constant columns.
fn skewness(column: &[f64]) -> f64 {
    if column.is_empty() {
        return 0.0;
    }
    let n = column.len() as f64;
    let mean = column.iter().sum::<f64>() / n;
    let m2 = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let m3 = column.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n;
    if m2 <= f64::EPSILON {
        0.0
    } else {
        m3 / m2.powf(1.5)
    }
}

fn tail_scores(features: &FeatureMatrix, combine: impl Fn(&TailScores, usize) -> f64) -> Vec<f64> {
    let tails: Vec<TailScores> = (0..features.n_cols())
        .map(|j| TailScores::from_column(&features.column(j)))
        .collect();

    (0..features.n_rows())
        .map(|i| tails.iter().map(|t| combine(t, i)).sum())
        .collect()
}

/// Empirical-CDF outlier detection.
#[derive(Debug, Clone, Default)]
pub struct Ecod;

impl OutlierScorer for Ecod {
    fn decision_scores(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(tail_scores(features, |t, i| {
            t.left[i].max(t.right[i]).max(t.skew_corrected(i))
        }))
    }
}

/// Copula-based outlier detection.
#[derive(Debug, Clone, Default)]
pub struct Copod;

impl OutlierScorer for Copod {
    fn decision_scores(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(tail_scores(features, |t, i| {
            t.skew_corrected(i).max((t.left[i] + t.right[i]) / 2.0)
        }))
    }
}

/// Lightweight on-line detector of anomalies: averaged histogram densities
/// over sparse random projections.
#[derive(Debug, Clone)]
pub struct Loda {
    pub projections: usize,
    pub bins: usize,
    pub seed: u64,
}

impl Loda {
    pub fn new(seed: u64) -> Self {
        Self {
            projections: 100,
            bins: 10,
            seed,
        }
    }

    fn random_projection(&self, rng: &mut StdRng, dims: usize) -> Vec<f64> {
        let mut weights: Vec<f64> = (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let non_zero = ((dims as f64).sqrt() as usize).max(1);
        let mut indices: Vec<usize> = (0..dims).collect();
        indices.shuffle(rng);
        for &j in &indices[non_zero.min(dims)..] {
            weights[j] = 0.0;
        }
        weights
    }
}

impl OutlierScorer for Loda {
    fn decision_scores(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        let n = features.n_rows();
        let dims = features.n_cols();
        let mut scores = vec![0.0; n];
        if n == 0 || dims == 0 || self.projections == 0 || self.bins == 0 {
            return Ok(scores);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        for _ in 0..self.projections {
            let weights = self.random_projection(&mut rng, dims);
            let projected: Vec<f64> = features
                .rows()
                .iter()
                .map(|row| row.iter().zip(&weights).map(|(x, w)| x * w).sum())
                .collect();

            let lo = projected.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = projected.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let width = (hi - lo) / self.bins as f64;

            let bin_of = |v: f64| -> usize {
                if width <= 0.0 {
                    0
                } else {
                    (((v - lo) / width) as usize).min(self.bins - 1)
                }
            };

            let mut counts = vec![0usize; self.bins];
            for &v in &projected {
                counts[bin_of(v)] += 1;
            }

            for (score, &v) in scores.iter_mut().zip(&projected) {
                let density = counts[bin_of(v)] as f64 / n as f64;
                *score += -(density + 1e-12).ln();
            }
        }

        let cuts = self.projections as f64;
        Ok(scores.into_iter().map(|s| s / cuts).collect())
    }
}
