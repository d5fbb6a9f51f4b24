//! Claim Fraud Review - Main Entry Point
//!
//! Benchmarks the configured detectors on labeled validation claims, persists
//! the performance table, then scores every claim batch in the inbox with the
//! selected model and writes the fraud-only exports to the outbox.

use anyhow::{Context, Result};
use claim_fraud_review::{
    build_registry, config::AppConfig, evaluate, select_best, Dataset, JsonFileStore, Outcome,
    PerformanceStore, ReviewError, ReviewMetrics, ReviewWorkflow,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/config.toml".to_string());
    let config = AppConfig::load_from_path(&config_path)?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("claim_fraud_review={}", config.logging.level).parse()?);
    if config.logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting Claim Fraud Review");
    info!(path = %config_path, "Configuration loaded successfully");

    let registry = build_registry(&config.models)?;
    if registry.is_empty() {
        return Err(ReviewError::Configuration("no detectors enabled".to_string()).into());
    }
    let registry = Arc::new(registry);
    info!(
        "Model registry initialized with {} models: {:?}",
        registry.len(),
        registry.model_names()
    );

    // Evaluate once per start; the table is complete before any upload is served
    let label_column = config.data.label_column.clone();
    let validation = Dataset::from_path(&config.data.validation_path).with_context(|| {
        format!(
            "Failed to load validation data from {}",
            config.data.validation_path.display()
        )
    })?;
    let features = validation.feature_matrix(&label_column)?;
    let labels = validation.labels(&label_column)?;
    info!(
        rows = features.n_rows(),
        features = features.n_cols(),
        "Validation data loaded"
    );

    let started = Instant::now();
    let table = evaluate(&registry, &features, &labels)?;
    let store = Arc::new(JsonFileStore::new(&config.store.path));
    store.save(&table)?;
    info!(
        models = table.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        selected = ?select_best(&table),
        "Evaluation complete"
    );

    let metrics = Arc::new(ReviewMetrics::new());
    let workflow = Arc::new(
        ReviewWorkflow::new(registry, store, &config.review.upload_dir)
            .with_label_column(label_column)
            .with_metrics(metrics.clone()),
    );

    let batches = list_batches(&config.review.inbox_dir)?;
    if batches.is_empty() {
        info!(inbox = %config.review.inbox_dir.display(), "No claim batches to review");
    } else {
        std::fs::create_dir_all(&config.review.outbox_dir).with_context(|| {
            format!(
                "Failed to create outbox {}",
                config.review.outbox_dir.display()
            )
        })?;
    }

    let num_workers = config.review.workers.max(1);
    info!(
        batches = batches.len(),
        workers = num_workers,
        "Reviewing claim batches"
    );

    // Semaphore to limit concurrent reviews
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let outbox = Arc::new(config.review.outbox_dir.clone());
    let mut handles = Vec::with_capacity(batches.len());

    for path in batches {
        let permit = semaphore.clone().acquire_owned().await?;
        let workflow = workflow.clone();
        let outbox = outbox.clone();

        handles.push(tokio::spawn(async move {
            let batch_name = path.display().to_string();
            let result =
                tokio::task::spawn_blocking(move || review_batch(&workflow, &path, &outbox)).await;
            drop(permit);

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(batch = %batch_name, error = %e, "Review failed"),
                Err(e) => error!(batch = %batch_name, error = %e, "Review task panicked"),
            }
        }));
    }

    for handle in futures::future::join_all(handles).await {
        if let Err(e) = handle {
            error!(error = %e, "Review task failed to join");
        }
    }

    let expired =
        workflow.expire_sessions(chrono::Duration::seconds(config.review.session_ttl_secs as i64));
    if expired > 0 {
        info!(expired, "Idle sessions discarded");
    }

    info!("Review run finished");
    metrics.print_summary();

    Ok(())
}

/// CSV files in the inbox, sorted by name.
fn list_batches(inbox: &Path) -> Result<Vec<PathBuf>> {
    if !inbox.exists() {
        return Ok(Vec::new());
    }

    let mut batches: Vec<PathBuf> = std::fs::read_dir(inbox)
        .with_context(|| format!("Failed to read inbox {}", inbox.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("csv"))
        .collect();
    batches.sort();
    Ok(batches)
}

/// One batch is one session: upload, score, export.
fn review_batch(workflow: &ReviewWorkflow, path: &Path, outbox: &Path) -> Result<()> {
    let session_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("batch")
        .to_string();
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    match workflow.upload(&session_id, &bytes)? {
        Outcome::Completed(receipt) => info!(
            session = %session_id,
            rows = receipt.rows,
            model = ?receipt.selected_model_name,
            "Batch uploaded"
        ),
        Outcome::Rejected { message } => {
            warn!(session = %session_id, %message, "Batch rejected");
            return Ok(());
        }
    }

    match workflow.run_score(&session_id)? {
        Outcome::Completed(summary) => info!(
            session = %session_id,
            model = %summary.model_name,
            rows = summary.rows,
            flagged = summary.flagged,
            "Batch scored"
        ),
        Outcome::Rejected { message } => {
            warn!(session = %session_id, %message, "Scoring rejected");
            return Ok(());
        }
    }

    match workflow.run_export(&session_id)? {
        Outcome::Completed(artifact) => {
            let target = outbox.join(format!("{}_{}", session_id, artifact.file_name));
            std::fs::write(&target, &artifact.bytes)
                .with_context(|| format!("Failed to write {}", target.display()))?;
            info!(
                session = %session_id,
                path = %target.display(),
                bytes = artifact.bytes.len(),
                "Export written"
            );
        }
        Outcome::Rejected { message } => {
            warn!(session = %session_id, %message, "Export rejected");
        }
    }

    Ok(())
}
