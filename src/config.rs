//! Configuration management for the review service

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub data: DataConfig,
    pub store: StoreConfig,
    pub models: ModelsConfig,
    pub review: ReviewConfig,
    pub logging: LoggingConfig,
}

/// Validation data used by the startup evaluation
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Labeled claims the registry is benchmarked against
    pub validation_path: PathBuf,
    /// Column holding the fraud label (0/1 or Yes/No)
    #[serde(default = "default_label_column")]
    pub label_column: String,
}

fn default_label_column() -> String {
    crate::types::DEFAULT_LABEL_COLUMN.to_string()
}

/// Performance store location
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// JSON file rewritten by every evaluation run
    pub path: PathBuf,
}

/// Model registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Built-in detectors to register, in evaluation order
    #[serde(default = "default_enabled_models")]
    pub enabled: Vec<String>,
    /// Expected fraction of fraudulent claims in a batch
    #[serde(default = "default_contamination")]
    pub contamination: f64,
    /// Seed for the randomised detectors (LODA, IFOREST)
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// SUOD member weights; members without a weight get an equal share
    #[serde(default)]
    pub suod_weights: HashMap<String, f64>,
    /// Directory with pre-trained ONNX scorers (only read with the `onnx` feature)
    #[serde(default)]
    pub onnx_dir: Option<PathBuf>,
    /// Fraud probability at or above which an ONNX scorer flags a claim
    #[serde(default = "default_onnx_threshold")]
    pub onnx_threshold: f64,
    /// Number of threads for ONNX inference per model
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_enabled_models() -> Vec<String> {
    ["LODA", "ECOD", "COPOD", "IFOREST", "SUOD"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_contamination() -> f64 {
    crate::models::detectors::DEFAULT_CONTAMINATION
}

fn default_seed() -> u64 {
    42
}

fn default_onnx_threshold() -> f64 {
    0.5
}

fn default_onnx_threads() -> usize {
    1
}

/// Serving-side configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewConfig {
    /// Root of the session-scoped upload directories
    pub upload_dir: PathBuf,
    /// Claim batches picked up by the batch driver
    pub inbox_dir: PathBuf,
    /// Where fraud-only exports are written
    pub outbox_dir: PathBuf,
    /// Number of uploads processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Idle time after which a session is discarded
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_session_ttl_secs() -> u64 {
    3600
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data: DataConfig {
                validation_path: PathBuf::from("data/validation.csv"),
                label_column: default_label_column(),
            },
            store: StoreConfig {
                path: PathBuf::from("json/models_performance.json"),
            },
            models: ModelsConfig {
                enabled: default_enabled_models(),
                contamination: default_contamination(),
                seed: default_seed(),
                suod_weights: HashMap::new(),
                onnx_dir: None,
                onnx_threshold: default_onnx_threshold(),
                onnx_threads: default_onnx_threads(),
            },
            review: ReviewConfig {
                upload_dir: PathBuf::from("uploads"),
                inbox_dir: PathBuf::from("inbox"),
                outbox_dir: PathBuf::from("outbox"),
                workers: default_workers(),
                session_ttl_secs: default_session_ttl_secs(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
