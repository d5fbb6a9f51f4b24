//! Name -> detector registry

use crate::error::{Result, ReviewError};
use crate::types::dataset::FeatureMatrix;
use std::fmt;
use std::sync::Arc;

/// An anomaly-detection capability.
///
/// `detect` returns one flag per input row (`true` = fraudulent) and must not
/// depend on anything but its input.
pub trait Detector: Send + Sync {
    fn detect(&self, features: &FeatureMatrix) -> Result<Vec<bool>>;
}

impl<F> Detector for F
where
    F: Fn(&FeatureMatrix) -> Result<Vec<bool>> + Send + Sync,
{
    fn detect(&self, features: &FeatureMatrix) -> Result<Vec<bool>> {
        self(features)
    }
}

/// A registered model
#[derive(Clone)]
pub struct ModelCandidate {
    pub name: String,
    pub detector: Arc<dyn Detector>,
}

impl ModelCandidate {
    /// Run the detector and check it produced one flag per row.
    pub fn detect(&self, features: &FeatureMatrix) -> Result<Vec<bool>> {
        let flags = self.detector.detect(features)?;
        if flags.len() != features.n_rows() {
            return Err(ReviewError::detection(
                &self.name,
                format!(
                    "returned {} flags for {} rows",
                    flags.len(),
                    features.n_rows()
                ),
            ));
        }
        Ok(flags)
    }
}

impl fmt::Debug for ModelCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCandidate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Models in registration order; evaluation walks this order.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    candidates: Vec<ModelCandidate>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a detector under a unique name.
    pub fn register(&mut self, name: impl Into<String>, detector: Arc<dyn Detector>) -> Result<()> {
        let name = name.into();
        if self.resolve(&name).is_some() {
            return Err(ReviewError::Configuration(format!(
                "model {} registered twice",
                name
            )));
        }
        self.candidates.push(ModelCandidate { name, detector });
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, name: impl Into<String>, detector: Arc<dyn Detector>) -> Result<Self> {
        self.register(name, detector)?;
        Ok(self)
    }

    pub fn resolve(&self, name: &str) -> Option<&ModelCandidate> {
        self.candidates.iter().find(|c| c.name == name)
    }

    pub fn candidates(&self) -> &[ModelCandidate] {
        &self.candidates
    }

    pub fn model_names(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
