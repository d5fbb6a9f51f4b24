//! Serving-side counters and timing for the review workflow.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for review sessions
pub struct ReviewMetrics {
    pub uploads: AtomicU64,
    pub scoring_runs: AtomicU64,
    pub exports: AtomicU64,
    /// Requests answered with a message instead of a result
    pub rejections: AtomicU64,
    pub rows_scored: AtomicU64,
    pub rows_flagged: AtomicU64,
    /// Detect times per model (in microseconds)
    model_times: RwLock<HashMap<String, Vec<u64>>>,
    start_time: Instant,
}

/// Per-model detect timing
#[derive(Debug)]
pub struct ModelStats {
    pub calls: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub max_us: u64,
}

impl ReviewMetrics {
    pub fn new() -> Self {
        Self {
            uploads: AtomicU64::new(0),
            scoring_runs: AtomicU64::new(0),
            exports: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            rows_scored: AtomicU64::new(0),
            rows_flagged: AtomicU64::new(0),
            model_times: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    pub fn record_upload(&self) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export(&self) {
        self.exports.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed scoring run
    pub fn record_scoring(
        &self,
        model_name: &str,
        rows: usize,
        flagged: usize,
        duration: Duration,
    ) {
        self.scoring_runs.fetch_add(1, Ordering::Relaxed);
        self.rows_scored.fetch_add(rows as u64, Ordering::Relaxed);
        self.rows_flagged.fetch_add(flagged as u64, Ordering::Relaxed);

        if let Ok(mut times) = self.model_times.write() {
            let model_times = times.entry(model_name.to_string()).or_default();
            model_times.push(duration.as_micros() as u64);
            // Keep only last 1000 per model
            if model_times.len() > 1000 {
                model_times.drain(0..500);
            }
        }
    }

    pub fn get_model_stats(&self) -> HashMap<String, ModelStats> {
        let Ok(times) = self.model_times.read() else {
            return HashMap::new();
        };

        times
            .iter()
            .filter(|(_, t)| !t.is_empty())
            .map(|(model, model_times)| {
                let mut sorted = model_times.clone();
                sorted.sort_unstable();
                let count = sorted.len();
                let sum: u64 = sorted.iter().sum();
                (
                    model.clone(),
                    ModelStats {
                        calls: count as u64,
                        mean_us: sum / count as u64,
                        p50_us: sorted[count / 2],
                        max_us: sorted[count - 1],
                    },
                )
            })
            .collect()
    }

    /// Share of scored rows that were flagged, in percent
    pub fn flag_rate(&self) -> f64 {
        let scored = self.rows_scored.load(Ordering::Relaxed);
        if scored == 0 {
            return 0.0;
        }
        self.rows_flagged.load(Ordering::Relaxed) as f64 * 100.0 / scored as f64
    }

    pub fn print_summary(&self) {
        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              CLAIM FRAUD REVIEW - SESSION SUMMARY            ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Uploads: {:>6}  Scoring runs: {:>6}  Exports: {:>6}          ║",
            self.uploads.load(Ordering::Relaxed),
            self.scoring_runs.load(Ordering::Relaxed),
            self.exports.load(Ordering::Relaxed)
        );
        info!(
            "║ Rows scored: {:>8}  Flagged: {:>8} ({:>5.1}%)              ║",
            self.rows_scored.load(Ordering::Relaxed),
            self.rows_flagged.load(Ordering::Relaxed),
            self.flag_rate()
        );
        info!(
            "║ Rejected requests: {:>6}  Uptime: {:>8.1}s                  ║",
            self.rejections.load(Ordering::Relaxed),
            self.start_time.elapsed().as_secs_f64()
        );
        info!("╚══════════════════════════════════════════════════════════════╝");

        let model_stats = self.get_model_stats();
        if !model_stats.is_empty() {
            info!("Model scoring times (μs):");
            for (model, stats) in &model_stats {
                info!(
                    "  {}: mean={} p50={} max={} (calls={})",
                    model, stats.mean_us, stats.p50_us, stats.max_us, stats.calls
                );
            }
        }
    }
}

impl Default for ReviewMetrics {
    fn default() -> Self {
        Self::new()
    }
}
