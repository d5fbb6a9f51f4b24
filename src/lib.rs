//! Claim Fraud Review Library
//!
//! Evaluates unsupervised outlier detectors on labeled validation claims,
//! picks one with a majority-of-three heuristic and scores uploaded claim
//! batches with it, exporting the rows it flags as fraudulent.

pub mod config;
pub mod error;
pub mod evaluation;
pub mod metrics;
pub mod models;
pub mod scoring;
pub mod selection;
pub mod session;
pub mod store;
pub mod types;
pub mod workflow;

pub use config::AppConfig;
pub use error::{DataError, Result, ReviewError};
pub use evaluation::{evaluate, evaluate_with_clock, Clock, FixedClock, WallClock};
pub use metrics::ReviewMetrics;
pub use models::{build_registry, ModelCandidate, ModelRegistry};
pub use scoring::{export, score, ExportArtifact, ScoringResult};
pub use selection::select_best;
pub use session::{SessionManager, SessionPhase, SessionState};
pub use store::{InMemoryStore, JsonFileStore, PerformanceStore};
pub use types::{Dataset, FeatureMatrix, PerformanceRecord, PerformanceTable};
pub use workflow::{Outcome, ReviewWorkflow, ScoreSummary, UploadReceipt};
