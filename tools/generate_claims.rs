//! Synthetic Claim Generator
//!
//! Writes a labeled validation set and an unlabeled claim batch for local
//! runs of the review service.

use anyhow::Context;
use rand::Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// One provider claim row; `potential_fraud` is empty in unlabeled batches
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Claim {
    insc_claim_amt_reimbursed: f64,
    deductible_amt_paid: f64,
    claim_duration_days: u32,
    admission_days: u32,
    num_diagnosis_codes: u32,
    num_procedure_codes: u32,
    patient_age: u32,
    chronic_conditions: u32,
    physician_claim_count: u32,
    potential_fraud: Option<u8>,
}

/// Claim generator for testing
struct ClaimGenerator {
    rng: rand::rngs::ThreadRng,
}

impl ClaimGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    fn generate_legitimate(&mut self) -> Claim {
        let admitted = self.rng.gen_bool(0.15);
        Claim {
            insc_claim_amt_reimbursed: round2(self.rng.gen_range(50.0..4000.0)),
            deductible_amt_paid: round2(self.rng.gen_range(0.0..100.0)),
            claim_duration_days: self.rng.gen_range(0..5),
            admission_days: if admitted { self.rng.gen_range(1..6) } else { 0 },
            num_diagnosis_codes: self.rng.gen_range(1..5),
            num_procedure_codes: self.rng.gen_range(0..2),
            patient_age: self.rng.gen_range(25..90),
            chronic_conditions: self.rng.gen_range(0..4),
            physician_claim_count: self.rng.gen_range(1..40),
            potential_fraud: Some(0),
        }
    }

    /// Inflated amounts, long stays and busy physicians
    fn generate_suspicious(&mut self) -> Claim {
        Claim {
            insc_claim_amt_reimbursed: round2(self.rng.gen_range(15000.0..60000.0)),
            deductible_amt_paid: round2(self.rng.gen_range(500.0..1100.0)),
            claim_duration_days: self.rng.gen_range(10..35),
            admission_days: self.rng.gen_range(8..30),
            num_diagnosis_codes: self.rng.gen_range(8..11),
            num_procedure_codes: self.rng.gen_range(3..6),
            patient_age: self.rng.gen_range(25..90),
            chronic_conditions: self.rng.gen_range(4..11),
            physician_claim_count: self.rng.gen_range(150..400),
            potential_fraud: Some(1),
        }
    }

    fn generate(&mut self, fraud_rate: f64) -> Claim {
        if self.rng.gen_bool(fraud_rate) {
            self.generate_suspicious()
        } else {
            self.generate_legitimate()
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn write_claims(path: &Path, claims: &[Claim]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for claim in claims {
        writer.serialize(claim)?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_claims=info".parse()?),
        )
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let validation_path =
        PathBuf::from(args.get(1).map(|s| s.as_str()).unwrap_or("data/validation.csv"));
    let batch_path = PathBuf::from(args.get(2).map(|s| s.as_str()).unwrap_or("inbox/claims.csv"));
    let count: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(1000);
    let fraud_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.1);

    info!(
        validation = %validation_path.display(),
        batch = %batch_path.display(),
        count,
        fraud_rate,
        "Generating claims"
    );

    let mut generator = ClaimGenerator::new();

    let validation: Vec<Claim> = (0..count).map(|_| generator.generate(fraud_rate)).collect();
    let fraudulent = validation
        .iter()
        .filter(|c| c.potential_fraud == Some(1))
        .count();
    write_claims(&validation_path, &validation)?;
    info!(rows = validation.len(), fraudulent, "Validation set written");

    let batch: Vec<Claim> = (0..count)
        .map(|_| Claim {
            potential_fraud: None,
            ..generator.generate(fraud_rate)
        })
        .collect();
    write_claims(&batch_path, &batch)?;
    info!(rows = batch.len(), "Unlabeled batch written");

    Ok(())
}
