//! Isolation forest

use crate::error::Result;
use crate::models::detectors::OutlierScorer;
use crate::types::dataset::FeatureMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Isolation forest scorer, seeded so repeated runs isolate the same way.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    pub trees: usize,
    pub max_samples: usize,
    pub seed: u64,
}

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl IsolationForest {
    pub fn new(seed: u64) -> Self {
        Self {
            trees: 100,
            max_samples: 256,
            seed,
        }
    }

    fn grow(
        rng: &mut StdRng,
        features: &FeatureMatrix,
        rows: &[usize],
        depth: usize,
        depth_limit: usize,
    ) -> Node {
        if depth >= depth_limit || rows.len() <= 1 {
            return Node::Leaf { size: rows.len() };
        }

        // only features that still separate something
        let splittable: Vec<(usize, f64, f64)> = (0..features.n_cols())
            .filter_map(|j| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = features.row(r)[j];
                    (lo.min(v), hi.max(v))
                });
                (hi > lo && lo.is_finite() && hi.is_finite()).then_some((j, lo, hi))
            })
            .collect();

        if splittable.is_empty() {
            return Node::Leaf { size: rows.len() };
        }

        let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
        // convex combination stays finite even when `hi - lo` overflows
        let u: f64 = rng.gen();
        let threshold = lo * (1.0 - u) + hi * u;
        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| features.row(r)[feature] < threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(Self::grow(rng, features, &left, depth + 1, depth_limit)),
            right: Box::new(Self::grow(rng, features, &right, depth + 1, depth_limit)),
        }
    }

    fn path_length(node: &Node, row: &[f64], depth: usize) -> f64 {
        match node {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] < *threshold {
                    Self::path_length(left, row, depth + 1)
                } else {
                    Self::path_length(right, row, depth + 1)
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

impl OutlierScorer for IsolationForest {
    fn decision_scores(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        let n = features.n_rows();
        if n < 2 || self.trees == 0 {
            return Ok(vec![0.0; n]);
        }

        let sample_size = self.max_samples.min(n).max(2);
        let depth_limit = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let forest: Vec<Node> = (0..self.trees)
            .map(|_| {
                let sample = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                Self::grow(&mut rng, features, &sample, 0, depth_limit)
            })
            .collect();

        let normaliser = average_path_length(sample_size);
        Ok(features
            .rows()
            .iter()
            .map(|row| {
                let mean_depth = forest
                    .iter()
                    .map(|tree| Self::path_length(tree, row, 0))
                    .sum::<f64>()
                    / forest.len() as f64;
                2f64.powf(-mean_depth / normaliser)
            })
            .collect())
    }
}
