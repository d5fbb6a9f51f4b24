//! Upload -> score -> export workflow for review sessions
//!
//! Every transition works on an explicit [`SessionState`]. The session-id
//! entry points load that state from the [`SessionManager`], run the
//! transition and write the state back. Data and model-resolution problems
//! become a user-facing [`Outcome::Rejected`] and put the session into the
//! `Error` phase; model failures are returned as errors.

use crate::error::{DataError, Result, ReviewError};
use crate::metrics::ReviewMetrics;
use crate::models::registry::ModelRegistry;
use crate::scoring::{self, ExportArtifact, ScoringResult};
use crate::selection::select_best;
use crate::session::{SessionManager, SessionPhase, SessionState};
use crate::store::PerformanceStore;
use crate::types::dataset::{Dataset, DEFAULT_LABEL_COLUMN};
use crate::types::performance::PerformanceTable;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const UPLOAD_FILE_NAME: &str = "upload.csv";

/// Result of a workflow request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Completed(T),
    /// The request could not be served; `message` is meant for the operator.
    Rejected { message: String },
}

impl<T> Outcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Rejected { .. } => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }
}

/// What an upload stored and which model it will be scored with.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub path: PathBuf,
    pub rows: usize,
    pub selected_model_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSummary {
    pub model_name: String,
    pub rows: usize,
    pub flagged: usize,
}

/// Drives review sessions against a fixed registry and performance store.
pub struct ReviewWorkflow {
    registry: Arc<ModelRegistry>,
    store: Arc<dyn PerformanceStore>,
    sessions: SessionManager,
    upload_dir: PathBuf,
    label_column: String,
    metrics: Arc<ReviewMetrics>,
}

impl ReviewWorkflow {
    pub fn new(
        registry: Arc<ModelRegistry>,
        store: Arc<dyn PerformanceStore>,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            store,
            sessions: SessionManager::new(),
            upload_dir: upload_dir.into(),
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
            metrics: Arc::new(ReviewMetrics::new()),
        }
    }

    pub fn with_label_column(mut self, label_column: impl Into<String>) -> Self {
        self.label_column = label_column.into();
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ReviewMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<ReviewMetrics> {
        &self.metrics
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Snapshot of a session's state
    pub fn session(&self, session_id: &str) -> Option<SessionState> {
        self.sessions.get_session(session_id)
    }

    /// Store an upload for `session_id`, creating the session if needed.
    pub fn upload(&self, session_id: &str, file_bytes: &[u8]) -> Result<Outcome<UploadReceipt>> {
        self.metrics.record_upload();
        self.sessions.with_session_lock(session_id, || {
            let state = self.sessions.get_or_create(session_id);
            self.transition(state, |state| self.upload_into(state, file_bytes))
        })
    }

    /// Score the session's upload with its selected model.
    pub fn run_score(&self, session_id: &str) -> Result<Outcome<ScoreSummary>> {
        self.existing_transition(session_id, |state| self.score_session(state))
    }

    /// Export the fraud-only rows of the session's upload.
    pub fn run_export(&self, session_id: &str) -> Result<Outcome<ExportArtifact>> {
        self.existing_transition(session_id, |state| self.export_session(state))
    }

    /// Drop sessions idle longer than `ttl` and delete their uploads.
    ///
    /// Sessions with a request in flight are left alone.
    pub fn expire_sessions(&self, ttl: chrono::Duration) -> usize {
        let expired = self.sessions.take_expired_with(ttl, |state| {
            let dir = self.session_dir(&state.session_id);
            if dir.exists() {
                if let Err(e) = std::fs::remove_dir_all(&dir) {
                    warn!(
                        session = %state.session_id,
                        error = %e,
                        "Failed to remove session uploads"
                    );
                }
            }
            debug!(session = %state.session_id, "Session expired");
        });
        expired.len()
    }

    fn existing_transition<T>(
        &self,
        session_id: &str,
        step: impl FnOnce(&mut SessionState) -> Result<T>,
    ) -> Result<Outcome<T>> {
        if self.sessions.get_session(session_id).is_none() {
            return Ok(self.unknown_session(session_id));
        }
        self.sessions.with_session_lock(session_id, || {
            match self.sessions.get_session(session_id) {
                Some(state) => self.transition(state, step),
                None => Ok(self.unknown_session(session_id)),
            }
        })
    }

    fn unknown_session<T>(&self, session_id: &str) -> Outcome<T> {
        self.metrics.record_rejection();
        warn!(session = %session_id, "Request for unknown session");
        Outcome::Rejected {
            message: "No file uploaded for this session".to_string(),
        }
    }

    /// Run one step on a snapshot and write it back; callers hold the session lock.
    fn transition<T>(
        &self,
        mut state: SessionState,
        step: impl FnOnce(&mut SessionState) -> Result<T>,
    ) -> Result<Outcome<T>> {
        state.touch();
        state.message = None;

        let outcome = match step(&mut state) {
            Ok(value) => Ok(Outcome::Completed(value)),
            Err(e) if e.is_recoverable() => {
                let message = user_message(&e);
                warn!(session = %state.session_id, error = %e, "Request rejected");
                self.metrics.record_rejection();
                state.fail(message.clone());
                Ok(Outcome::Rejected { message })
            }
            Err(e) => {
                error!(session = %state.session_id, error = %e, "Request failed");
                state.fail(e.to_string());
                Err(e)
            }
        };

        self.sessions.update_session(state);
        outcome
    }

    /// `NoUpload | any -> Uploaded`
    pub fn upload_into(
        &self,
        state: &mut SessionState,
        file_bytes: &[u8],
    ) -> Result<UploadReceipt> {
        state.scoring = None;
        state.uploaded_path = None;

        let dataset = Dataset::from_csv_bytes(file_bytes)?;
        let path = self.store_upload(&state.session_id, file_bytes)?;

        let table = self.load_performance_table();
        let selected = match state.selected_model_name.take() {
            Some(previous) if table.contains(&previous) => Some(previous),
            _ => select_best(&table).map(str::to_string),
        };

        if selected.is_none() {
            warn!(
                session = %state.session_id,
                "No model selected; scoring unavailable for this upload"
            );
            state.message = Some("No evaluated model is available for scoring".to_string());
        }

        info!(
            session = %state.session_id,
            rows = dataset.len(),
            model = ?selected,
            "Upload stored"
        );

        state.uploaded_path = Some(path.clone());
        state.selected_model_name = selected.clone();
        state.performance_table = table;
        state.phase = SessionPhase::Uploaded;

        Ok(UploadReceipt {
            path,
            rows: dataset.len(),
            selected_model_name: selected,
        })
    }

    /// `Uploaded | Scored | Exported -> Scored`
    pub fn score_session(&self, state: &mut SessionState) -> Result<ScoreSummary> {
        let result = self.compute_scoring(state)?;
        let summary = ScoreSummary {
            model_name: result.model_name.clone(),
            rows: result.augmented_dataset.len(),
            flagged: result.flagged_count(),
        };
        state.scoring = Some(result);
        state.phase = SessionPhase::Scored;
        Ok(summary)
    }

    /// `Uploaded | Scored | Exported -> Exported`, scoring first when nothing is cached.
    pub fn export_session(&self, state: &mut SessionState) -> Result<ExportArtifact> {
        let path = self.existing_upload(state)?;

        let cached = state
            .scoring
            .take()
            .filter(|r| Some(r.model_name.as_str()) == state.selected_model_name.as_deref());
        let result = match cached {
            Some(result) => result,
            None => {
                debug!(
                    session = %state.session_id,
                    path = %path.display(),
                    "Scoring lazily for export"
                );
                self.compute_scoring(state)?
            }
        };

        let artifact = scoring::export_artifact(&result.flagged_subset)?;
        state.scoring = Some(result);
        state.phase = SessionPhase::Exported;
        self.metrics.record_export();

        info!(
            session = %state.session_id,
            bytes = artifact.bytes.len(),
            "Fraudulent claims exported"
        );
        Ok(artifact)
    }

    fn compute_scoring(&self, state: &SessionState) -> Result<ScoringResult> {
        let path = self.existing_upload(state)?;
        let model_name = state
            .selected_model_name
            .as_deref()
            .ok_or(ReviewError::ModelNotResolved { name: None })?;

        let dataset = Dataset::from_path(&path)?;
        let started = Instant::now();
        let result = scoring::score(
            &self.registry,
            Some(model_name),
            &dataset,
            &self.label_column,
        )?;

        self.metrics.record_scoring(
            &result.model_name,
            dataset.len(),
            result.flagged_count(),
            started.elapsed(),
        );
        info!(
            session = %state.session_id,
            model = %result.model_name,
            rows = dataset.len(),
            flagged = result.flagged_count(),
            "Upload scored"
        );
        Ok(result)
    }

    fn existing_upload(&self, state: &SessionState) -> Result<PathBuf> {
        let path = state.uploaded_path.clone().ok_or(DataError::NoUpload)?;
        if !path.exists() {
            return Err(DataError::NotFound { path }.into());
        }
        Ok(path)
    }

    fn load_performance_table(&self) -> PerformanceTable {
        match self.store.load() {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "Performance table unavailable");
                PerformanceTable::new()
            }
        }
    }

    /// Directory holding one session's upload.
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.upload_dir.join(session_dir_name(session_id))
    }

    /// Write the upload next to its final name and rename it into place.
    fn store_upload(&self, session_id: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.session_dir(session_id);
        let path = dir.join(UPLOAD_FILE_NAME);
        write_atomically(&dir, &path, bytes).map_err(|e| DataError::Unreadable {
            reason: format!("cannot store upload at {}: {}", path.display(), e),
        })?;
        Ok(path)
    }
}

fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let tmp = dir.join(format!(".upload-{}.tmp", uuid::Uuid::new_v4().simple()));
    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp, path)
}

/// Injective, filesystem-safe directory name for a session id.
fn session_dir_name(session_id: &str) -> String {
    let safe = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if safe {
        format!("s-{}", session_id)
    } else {
        let hex: String = session_id.bytes().map(|b| format!("{:02x}", b)).collect();
        format!("x-{}", hex)
    }
}

fn user_message(error: &ReviewError) -> String {
    match error {
        ReviewError::Data(DataError::NotFound { .. }) => "File not found".to_string(),
        ReviewError::Data(DataError::NoUpload) => "No file uploaded for this session".to_string(),
        ReviewError::ModelNotResolved { name: None } => {
            "No model selected for scoring".to_string()
        }
        other => other.to_string(),
    }
}
