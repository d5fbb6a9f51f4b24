//! Type definitions for the review pipeline

pub mod dataset;
pub mod performance;

pub use dataset::{Dataset, FeatureMatrix, DEFAULT_LABEL_COLUMN};
pub use performance::{PerformanceRecord, PerformanceTable};
