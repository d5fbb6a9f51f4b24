//! Pre-trained ONNX scorers registered as detectors

use crate::error::{Result, ReviewError};
use crate::models::registry::Detector;
use crate::types::dataset::FeatureMatrix;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Loaded ONNX model flagging claims by fraud probability
pub struct OnnxDetector {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    threshold: f64,
}

impl OnnxDetector {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn fraud_probability(&self, session: &mut Session, features: &[f64]) -> Result<f64> {
        let shape = vec![1_i64, features.len() as i64];
        let input: Vec<f32> = features.iter().map(|&v| v as f32).collect();
        let input_tensor = Tensor::from_array((shape, input))
            .map_err(|e| ReviewError::detection(&self.name, e.to_string()))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_tensor])
            .map_err(|e| ReviewError::detection(&self.name, e.to_string()))?;

        let output = outputs.get(&self.output_name).ok_or_else(|| {
            ReviewError::detection(&self.name, format!("missing output {}", self.output_name))
        })?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ReviewError::detection(&self.name, e.to_string()))?;

        Ok(fraud_prob_from_tensor(&shape.iter().copied().collect::<Vec<i64>>(), data))
    }
}

/// Fraud-class probability from a `[batch, classes]`, `[classes]` or scalar-like output.
fn fraud_prob_from_tensor(dims: &[i64], data: &[f32]) -> f64 {
    let classes = dims.last().copied().unwrap_or(1);
    if classes >= 2 && data.len() >= 2 {
        data[1] as f64
    } else {
        data.first().map(|&v| v as f64).unwrap_or(0.0)
    }
}

impl Detector for OnnxDetector {
    fn detect(&self, features: &FeatureMatrix) -> Result<Vec<bool>> {
        let mut session = self
            .session
            .lock()
            .map_err(|e| ReviewError::detection(&self.name, format!("lock error: {}", e)))?;

        let mut flags = Vec::with_capacity(features.n_rows());
        for row in features.rows() {
            let prob = self.fraud_probability(&mut session, row)?;
            flags.push(prob >= self.threshold);
        }

        debug!(
            model = %self.name,
            rows = flags.len(),
            flagged = flags.iter().filter(|&&f| f).count(),
            "ONNX detection complete"
        );
        Ok(flags)
    }
}

/// Loader for ONNX models
pub struct OnnxModelLoader {
    onnx_threads: usize,
}

impl OnnxModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init()
            .commit()
            .map_err(|e| ReviewError::Configuration(format!("ONNX Runtime init failed: {}", e)))?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    fn open_session(&self, path: &Path) -> std::result::Result<Session, String> {
        Session::builder()
            .map_err(|e| e.to_string())?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| e.to_string())?
            .with_intra_threads(self.onnx_threads)
            .map_err(|e| e.to_string())?
            .commit_from_file(path)
            .map_err(|e| e.to_string())
    }

    /// Load a single ONNX model from file
    pub fn load_model<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
        threshold: f64,
    ) -> Result<OnnxDetector> {
        let path = path.as_ref();
        info!(
            model = %name,
            path = %path.display(),
            threads = self.onnx_threads,
            "Loading ONNX model"
        );

        let session = self.open_session(path).map_err(|reason| {
            ReviewError::Configuration(format!("failed to load {}: {}", path.display(), reason))
        })?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(OnnxDetector {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
            threshold,
        })
    }

    /// Load every `*.onnx` file in `dir`, named after the upper-cased file stem.
    pub fn load_dir<P: AsRef<Path>>(&self, dir: P, threshold: f64) -> Result<Vec<OnnxDetector>> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            ReviewError::Configuration(format!("cannot read {}: {}", dir.display(), e))
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "onnx"))
            .collect();
        paths.sort();

        let mut models = Vec::new();
        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let name = stem.to_uppercase();
            match self.load_model(&path, &name, threshold) {
                Ok(model) => models.push(model),
                Err(e) => warn!(model = %name, error = %e, "Failed to load model, skipping"),
            }
        }

        info!(count = models.len(), dir = %dir.display(), "ONNX models loaded");
        Ok(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraud_prob_from_tensor() {
        assert_eq!(fraud_prob_from_tensor(&[1, 2], &[0.25, 0.75]), 0.75);
        assert_eq!(fraud_prob_from_tensor(&[1, 1], &[0.5]), 0.5);
        assert_eq!(fraud_prob_from_tensor(&[2], &[0.9, 0.1]), 0.10000000149011612);
        assert_eq!(fraud_prob_from_tensor(&[0], &[]), 0.0);
    }
}
