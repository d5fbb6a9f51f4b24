//! Scores uploaded claims with a named model and builds the fraud-only export

use crate::error::{Result, ReviewError};
use crate::models::registry::ModelRegistry;
use crate::types::dataset::Dataset;
use tracing::debug;

/// File name offered for download
pub const EXPORT_FILE_NAME: &str = "fraudulent_claims.csv";
/// Content type of the export
pub const EXPORT_CONTENT_TYPE: &str = "text/csv";

/// Output of one scoring run
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringResult {
    /// Model that produced the flags
    pub model_name: String,
    /// Every uploaded row with the 0/1 fraud flag written into the label column
    pub augmented_dataset: Dataset,
    /// Flagged rows only, in upload order
    pub flagged_subset: Dataset,
}

impl ScoringResult {
    pub fn flagged_count(&self) -> usize {
        self.flagged_subset.len()
    }
}

/// Serialized export plus the attachment metadata the HTTP layer needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Score `dataset` with `model_name`.
///
/// The model is resolved before the dataset is touched; an unknown or missing
/// name fails with [`ReviewError::ModelNotResolved`]. The caller's dataset is
/// never modified.
pub fn score(
    registry: &ModelRegistry,
    model_name: Option<&str>,
    dataset: &Dataset,
    label_column: &str,
) -> Result<ScoringResult> {
    let candidate = model_name
        .and_then(|name| registry.resolve(name))
        .ok_or_else(|| ReviewError::ModelNotResolved {
            name: model_name.map(str::to_string),
        })?;

    let features = dataset.feature_matrix(label_column)?;
    let flags = candidate.detect(&features)?;

    let augmented_dataset = dataset.with_flag_column(label_column, &flags);
    let flagged_subset = augmented_dataset.filter_rows(&flags);

    debug!(
        model = %candidate.name,
        rows = dataset.len(),
        flagged = flagged_subset.len(),
        "Dataset scored"
    );

    Ok(ScoringResult {
        model_name: candidate.name.clone(),
        augmented_dataset,
        flagged_subset,
    })
}

/// Comma-separated UTF-8 bytes of `flagged_subset`, header first.
pub fn export(flagged_subset: &Dataset) -> Result<Vec<u8>> {
    Ok(flagged_subset.to_csv_bytes()?)
}

/// [`export`] wrapped with download metadata.
pub fn export_artifact(flagged_subset: &Dataset) -> Result<ExportArtifact> {
    Ok(ExportArtifact {
        file_name: EXPORT_FILE_NAME.to_string(),
        content_type: EXPORT_CONTENT_TYPE.to_string(),
        bytes: export(flagged_subset)?,
    })
}
