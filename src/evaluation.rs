//! Benchmarks every registered model against labeled validation data

use crate::error::{DataError, Result};
use crate::models::registry::ModelRegistry;
use crate::types::dataset::FeatureMatrix;
use crate::types::performance::{round3, PerformanceRecord, PerformanceTable};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Counts of predicted vs actual fraud flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub tp: u64,
    pub fp: u64,
    pub tn: u64,
    pub fn_: u64,
}

impl ConfusionMatrix {
    pub fn from_predictions(predicted: &[bool], actual: &[bool]) -> Self {
        let mut matrix = ConfusionMatrix::default();
        for (&p, &a) in predicted.iter().zip(actual) {
            match (p, a) {
                (true, true) => matrix.tp += 1,
                (true, false) => matrix.fp += 1,
                (false, false) => matrix.tn += 1,
                (false, true) => matrix.fn_ += 1,
            }
        }
        matrix
    }
}

/// Classification quality, unrounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub mcc: f64,
}

/// `numerator / denominator`, or 0 when the ratio is undefined.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

impl ClassificationMetrics {
    /// Any metric with a zero denominator is 0.
    pub fn from_confusion(m: &ConfusionMatrix) -> Self {
        let (tp, fp, tn, fn_) = (m.tp as f64, m.fp as f64, m.tn as f64, m.fn_ as f64);

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = ratio(2.0 * precision * recall, precision + recall);
        let mcc = ratio(
            tp * tn - fp * fn_,
            ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt(),
        );

        Self {
            precision,
            recall,
            f1,
            mcc,
        }
    }
}

/// Precision, recall, F1 and MCC of `predicted` against `actual`.
pub fn compute_performance_metrics(predicted: &[bool], actual: &[bool]) -> ClassificationMetrics {
    ClassificationMetrics::from_confusion(&ConfusionMatrix::from_predictions(predicted, actual))
}

/// Source of the latency figures recorded per model.
pub trait Clock {
    fn time<T>(&self, f: impl FnOnce() -> T) -> (T, Duration);
}

/// Wall-clock timing
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl Clock for WallClock {
    fn time<T>(&self, f: impl FnOnce() -> T) -> (T, Duration) {
        let start = Instant::now();
        let value = f();
        (value, start.elapsed())
    }
}

/// Reports the same duration for every call.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Duration);

impl Clock for FixedClock {
    fn time<T>(&self, f: impl FnOnce() -> T) -> (T, Duration) {
        (f(), self.0)
    }
}

/// Evaluate every model in registry order using wall-clock latency.
pub fn evaluate(
    registry: &ModelRegistry,
    features: &FeatureMatrix,
    labels: &[bool],
) -> Result<PerformanceTable> {
    evaluate_with_clock(registry, features, labels, &WallClock)
}

/// Evaluate every model in registry order.
///
/// A failing model aborts the whole run. An empty registry yields an empty table.
pub fn evaluate_with_clock<C: Clock>(
    registry: &ModelRegistry,
    features: &FeatureMatrix,
    labels: &[bool],
    clock: &C,
) -> Result<PerformanceTable> {
    if labels.len() != features.n_rows() {
        return Err(DataError::LabelCountMismatch {
            labels: labels.len(),
            rows: features.n_rows(),
        }
        .into());
    }

    let mut table = PerformanceTable::new();
    for candidate in registry.candidates() {
        debug!(model = %candidate.name, rows = features.n_rows(), "Evaluating model");

        let (predicted, elapsed) = clock.time(|| candidate.detect(features));
        let predicted = predicted?;
        let metrics = compute_performance_metrics(&predicted, labels);

        let record = PerformanceRecord {
            precision: round3(metrics.precision),
            recall: round3(metrics.recall),
            f1: round3(metrics.f1),
            mcc: round3(metrics.mcc),
            latency_seconds: round3(elapsed.as_secs_f64()),
        };

        info!(
            model = %candidate.name,
            precision = record.precision,
            recall = record.recall,
            f1 = record.f1,
            mcc = record.mcc,
            time_s = record.latency_seconds,
            "Model evaluated"
        );

        table.insert(candidate.name.clone(), record);
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReviewError;
    use crate::models::registry::Detector;
    use std::sync::Arc;

    fn features(rows: usize) -> FeatureMatrix {
        FeatureMatrix::new(
            vec!["amount".to_string()],
            (0..rows).map(|i| vec![i as f64]).collect(),
        )
        .unwrap()
    }

    fn fixed(flags: Vec<bool>) -> Arc<dyn Detector> {
        Arc::new(move |_: &FeatureMatrix| -> Result<Vec<bool>> { Ok(flags.clone()) })
    }

    #[test]
    fn test_confusion_counts() {
        let m = ConfusionMatrix::from_predictions(
            &[true, true, false, false, true],
            &[true, false, false, true, true],
        );
        assert_eq!(m, ConfusionMatrix { tp: 2, fp: 1, tn: 1, fn_: 1 });
    }

    #[test]
    fn test_metrics_known_values() {
        // tp=2 fp=1 tn=1 fn=1
        let metrics = compute_performance_metrics(
            &[true, true, false, false, true],
            &[true, false, false, true, true],
        );
        assert!((metrics.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics.f1 - 2.0 / 3.0).abs() < 1e-12);
        // (2*1 - 1*1) / sqrt(3*3*2*2) = 1/6
        assert!((metrics.mcc - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_negative_predictions_score_zero() {
        let metrics = compute_performance_metrics(&[false; 4], &[true, false, true, false]);
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.recall, 0.0);
        assert_eq!(metrics.f1, 0.0);
        assert_eq!(metrics.mcc, 0.0);
    }

    #[test]
    fn test_no_positive_labels_scores_zero() {
        let metrics = compute_performance_metrics(&[true, false], &[false, false]);
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.recall, 0.0);
        assert_eq!(metrics.f1, 0.0);
        assert_eq!(metrics.mcc, 0.0);
    }

    #[test]
    fn test_perfect_predictions() {
        let labels = [true, false, true, false];
        let metrics = compute_performance_metrics(&labels, &labels);
        assert_eq!(metrics.f1, 1.0);
        assert_eq!(metrics.mcc, 1.0);
    }

    #[test]
    fn test_evaluate_in_registry_order_with_rounding() {
        let registry = ModelRegistry::new()
            .with("ECOD", fixed(vec![true, true, false, false, true]))
            .unwrap()
            .with("LODA", fixed(vec![false; 5]))
            .unwrap();
        let labels = [true, false, false, true, true];

        let table = evaluate_with_clock(
            &registry,
            &features(5),
            &labels,
            &FixedClock(Duration::from_micros(1_234_567)),
        )
        .unwrap();

        assert_eq!(table.names(), vec!["ECOD", "LODA"]);
        let ecod = table.get("ECOD").unwrap();
        assert_eq!(ecod.precision, 0.667);
        assert_eq!(ecod.mcc, 0.167);
        assert_eq!(ecod.latency_seconds, 1.235);
        assert_eq!(table.get("LODA").unwrap().f1, 0.0);
    }

    #[test]
    fn test_empty_registry_gives_empty_table() {
        let table = evaluate(&ModelRegistry::new(), &features(3), &[true, false, false]).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_failing_model_aborts_evaluation() {
        let failing: Arc<dyn Detector> = Arc::new(|_: &FeatureMatrix| -> Result<Vec<bool>> {
            Err(ReviewError::detection("BROKEN", "singular matrix"))
        });
        let registry = ModelRegistry::new()
            .with("ECOD", fixed(vec![false; 3]))
            .unwrap()
            .with("BROKEN", failing)
            .unwrap();

        let err = evaluate(&registry, &features(3), &[true, false, false]).unwrap_err();
        assert!(matches!(err, ReviewError::Detection { .. }));
    }

    #[test]
    fn test_label_count_mismatch() {
        let err = evaluate(&ModelRegistry::new(), &features(3), &[true]).unwrap_err();
        assert!(matches!(
            err,
            ReviewError::Data(DataError::LabelCountMismatch { labels: 1, rows: 3 })
        ));
    }

    #[test]
    fn test_repeated_runs_are_byte_identical() {
        let registry = ModelRegistry::new()
            .with("ECOD", fixed(vec![true, false, true, false]))
            .unwrap()
            .with("COPOD", fixed(vec![true, true, false, false]))
            .unwrap();
        let labels = [true, false, false, false];
        let clock = FixedClock(Duration::from_millis(20));

        let first = evaluate_with_clock(&registry, &features(4), &labels, &clock).unwrap();
        let second = evaluate_with_clock(&registry, &features(4), &labels, &clock).unwrap();
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }
}
