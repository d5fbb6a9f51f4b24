//! Best-model selection over the performance table

use crate::types::performance::PerformanceTable;
use tracing::debug;

/// Pick the best model with a majority-of-three heuristic.
///
/// Records are visited in table order. A record takes over as the running best
/// when it strictly beats it on at least two of: higher F1, higher MCC, lower
/// latency. This is not Pareto dominance, so the winner depends on table order
/// and may be worse than the previous leader on the third axis.
pub fn select_best(table: &PerformanceTable) -> Option<&str> {
    let mut best_f1 = -1.0;
    let mut best_mcc = -1.0;
    let mut best_time = f64::INFINITY;
    let mut best_name = None;

    for (name, record) in table.iter() {
        let improvements = [
            record.f1 > best_f1,
            record.mcc > best_mcc,
            record.latency_seconds < best_time,
        ]
        .iter()
        .filter(|&&better| better)
        .count();

        if improvements >= 2 {
            debug!(
                model = %name,
                improvements,
                previous = ?best_name,
                "New best model"
            );
            best_f1 = record.f1;
            best_mcc = record.mcc;
            best_time = record.latency_seconds;
            best_name = Some(name);
        }
    }

    best_name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::performance::PerformanceRecord;

    fn record(f1: f64, mcc: f64, time: f64) -> PerformanceRecord {
        PerformanceRecord {
            precision: 0.0,
            recall: 0.0,
            f1,
            mcc,
            latency_seconds: time,
        }
    }

    fn table(entries: &[(&str, f64, f64, f64)]) -> PerformanceTable {
        let mut table = PerformanceTable::new();
        for &(name, f1, mcc, time) in entries {
            table.insert(name, record(f1, mcc, time));
        }
        table
    }

    #[test]
    fn test_empty_table_selects_nothing() {
        assert_eq!(select_best(&PerformanceTable::new()), None);
    }

    #[test]
    fn test_single_record_wins_against_sentinels() {
        let t = table(&[("ECOD", 0.0, -0.5, 100.0)]);
        // f1 0 > -1 and time < inf
        assert_eq!(select_best(&t), Some("ECOD"));
    }

    #[test]
    fn test_majority_trace_picks_copod() {
        let t = table(&[
            ("LODA", 0.62, 0.30, 5.0),
            ("ECOD", 0.70, 0.25, 1.2),
            ("COPOD", 0.65, 0.40, 0.8),
        ]);
        assert_eq!(select_best(&t), Some("COPOD"));
    }

    #[test]
    fn test_order_changes_the_winner() {
        let forward = table(&[
            ("LODA", 0.90, 0.10, 1.0),
            ("ECOD", 0.50, 0.50, 0.5),
            ("COPOD", 0.80, 0.60, 2.0),
        ]);
        assert_eq!(select_best(&forward), Some("COPOD"));

        let reversed = table(&[
            ("COPOD", 0.80, 0.60, 2.0),
            ("ECOD", 0.50, 0.50, 0.5),
            ("LODA", 0.90, 0.10, 1.0),
        ]);
        assert_eq!(select_best(&reversed), Some("LODA"));
    }

    #[test]
    fn test_ties_never_count() {
        let t = table(&[("LODA", 0.5, 0.5, 1.0), ("ECOD", 0.5, 0.6, 1.0)]);
        // ECOD improves mcc only; equal f1 and time are not improvements
        assert_eq!(select_best(&t), Some("LODA"));
    }

    #[test]
    fn test_sentinel_needs_two_axes() {
        // mcc -1 and f1 -1 can never beat the sentinels, time alone is one axis
        let t = table(&[("BROKEN", -1.0, -1.0, 0.1)]);
        assert_eq!(select_best(&t), None);
    }
}
