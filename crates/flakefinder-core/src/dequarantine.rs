//! Releasing quarantined tests that have become stable.
//!
//! A quarantine record matches every test whose name contains the record's
//! `id`. A record is released only if it matched at least one test and
//! every matching test passed often enough without a single failure.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{FinderError, FinderResult};
use crate::model::ReportMatrix;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub id: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// No test in the report matches the record.
    NoData,
    Failing { test: String, failures: u64 },
    InsufficientRuns { test: String, passed: u64, required: u64 },
    Stable { tests: usize },
}

impl Verdict {
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Stable { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub record: QuarantineRecord,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Judge every record against the report matrix.
pub fn evaluate(
    records: &[QuarantineRecord],
    matrix: &ReportMatrix,
    minimum_passed_runs: u32,
) -> FinderResult<Vec<Evaluation>> {
    if records.is_empty() {
        return Err(FinderError::Config {
            message: "no quarantine records to evaluate".to_string(),
        });
    }

    Ok(records
        .iter()
        .map(|record| Evaluation {
            record: record.clone(),
            verdict: judge(record, matrix, u64::from(minimum_passed_runs)),
        })
        .collect())
}

fn judge(record: &QuarantineRecord, matrix: &ReportMatrix, required: u64) -> Verdict {
    let mut matched = 0;
    for (test, lanes) in matrix.iter().filter(|(name, _)| name.contains(&record.id)) {
        matched += 1;
        let failures: u64 = lanes.values().map(|cell| cell.failed()).sum();
        if failures > 0 {
            warn!(record_id = %record.id, test, failures, "test set stays in quarantine");
            return Verdict::Failing {
                test: test.to_string(),
                failures,
            };
        }
        let passed: u64 = lanes.values().map(|cell| cell.succeeded()).sum();
        if passed < required {
            warn!(
                record_id = %record.id,
                test,
                passed,
                required,
                "test set stays in quarantine, not enough passed runs"
            );
            return Verdict::InsufficientRuns {
                test: test.to_string(),
                passed,
                required,
            };
        }
        info!(record_id = %record.id, test, passed, "test is stable");
    }

    if matched == 0 {
        warn!(record_id = %record.id, "no matching test names in runs found");
        Verdict::NoData
    } else {
        Verdict::Stable { tests: matched }
    }
}

/// Records that stay quarantined.
pub fn remaining(evaluations: &[Evaluation]) -> Vec<QuarantineRecord> {
    evaluations
        .iter()
        .filter(|e| !e.verdict.is_stable())
        .map(|e| e.record.clone())
        .collect()
}

pub fn read_records(path: &Path) -> FinderResult<Vec<QuarantineRecord>> {
    let body = std::fs::read(path).map_err(|e| FinderError::io(path, e))?;
    serde_json::from_slice(&body).map_err(|e| FinderError::Config {
        message: format!("{} is not a list of quarantine records: {e}", path.display()),
    })
}

pub fn write_records(records: &[QuarantineRecord], path: &Path) -> FinderResult<()> {
    let body = serde_json::to_string_pretty(records).map_err(|e| FinderError::Config {
        message: format!("failed to encode quarantine records: {e}"),
    })?;
    std::fs::write(path, body).map_err(|e| FinderError::io(path, e))
}
