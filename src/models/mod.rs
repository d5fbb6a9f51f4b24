//! Anomaly-detection models and the registry that names them

pub mod aggregator;
pub mod detectors;
pub mod iforest;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod registry;

pub use aggregator::{ScoreAggregator, Suod};
pub use detectors::{Copod, Ecod, Loda, OutlierScorer, Thresholded};
pub use iforest::IsolationForest;
pub use registry::{Detector, ModelCandidate, ModelRegistry};

use crate::config::ModelsConfig;
use crate::error::{Result, ReviewError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Names of the detectors that can be enabled from configuration.
pub const BUILTIN_MODELS: [&str; 5] = ["LODA", "ECOD", "COPOD", "IFOREST", "SUOD"];

fn builtin_scorer(name: &str, config: &ModelsConfig) -> Option<Arc<dyn OutlierScorer>> {
    let scorer: Arc<dyn OutlierScorer> = match name {
        "LODA" => Arc::new(Loda::new(config.seed)),
        "ECOD" => Arc::new(Ecod),
        "COPOD" => Arc::new(Copod),
        "IFOREST" => Arc::new(IsolationForest::new(config.seed)),
        "SUOD" => {
            let weights: HashMap<String, f64> = config
                .suod_weights
                .iter()
                .map(|(model, weight)| (model.to_uppercase(), *weight))
                .collect();
            let aggregator = if weights.is_empty() {
                ScoreAggregator::equal_weights()
            } else {
                ScoreAggregator::new(weights)
            };
            let members = ["LODA", "ECOD", "COPOD", "IFOREST"]
                .iter()
                .filter_map(|m| builtin_scorer(m, config).map(|s| (m.to_string(), s)))
                .collect();
            Arc::new(Suod::new(members, aggregator))
        }
        _ => return None,
    };
    Some(scorer)
}

/// Build the registry from configuration, in the configured order.
pub fn build_registry(config: &ModelsConfig) -> Result<ModelRegistry> {
    let mut registry = ModelRegistry::new();

    for name in &config.enabled {
        let canonical = name.to_uppercase();
        let scorer = builtin_scorer(&canonical, config).ok_or_else(|| {
            ReviewError::Configuration(format!(
                "unknown model {} (available: {})",
                name,
                BUILTIN_MODELS.join(", ")
            ))
        })?;
        let detector = Thresholded::new(scorer, config.contamination)?;
        registry.register(canonical, Arc::new(detector))?;
    }

    #[cfg(feature = "onnx")]
    if let Some(dir) = &config.onnx_dir {
        let loader = onnx::OnnxModelLoader::with_threads(config.onnx_threads)?;
        for model in loader.load_dir(dir, config.onnx_threshold)? {
            let name = model.name().to_string();
            registry.register(name, Arc::new(model))?;
        }
    }

    info!(
        models = ?registry.model_names(),
        contamination = config.contamination,
        "Model registry built"
    );

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_default_registry_order() {
        let config = AppConfig::default();
        let registry = build_registry(&config.models).unwrap();
        assert_eq!(registry.model_names(), BUILTIN_MODELS.to_vec());
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let mut config = AppConfig::default().models;
        config.enabled = vec!["copod".to_string(), "Ecod".to_string()];
        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.model_names(), vec!["COPOD", "ECOD"]);
    }

    #[test]
    fn test_unknown_model_is_configuration_error() {
        let mut config = AppConfig::default().models;
        config.enabled = vec!["KNN".to_string()];
        assert!(matches!(
            build_registry(&config),
            Err(ReviewError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_enabled_list_builds_empty_registry() {
        let mut config = AppConfig::default().models;
        config.enabled.clear();
        assert!(build_registry(&config).unwrap().is_empty());
    }
}
