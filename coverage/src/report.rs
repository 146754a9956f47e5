//! Coverage artifacts written to the output directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::requirements::{Coverage, MissingEvidence};

pub const COVERAGE_CSV: &str = "coverage_report.csv";
pub const MISSING_EVIDENCE_CSV: &str = "missing_evidence.csv";
pub const SUMMARY_JSON: &str = "coverage_summary.json";

#[derive(Serialize)]
struct CoverageRow<'a> {
    #[serde(rename = "Requirement")]
    requirement: &'a str,
    #[serde(rename = "Covered")]
    covered: &'static str,
    #[serde(rename = "Count")]
    count: usize,
    #[serde(rename = "QuestionIDs")]
    question_ids: String,
    #[serde(rename = "ProposedAddIfGap")]
    proposed_add_if_gap: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementCount {
    pub requirement: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifacts {
    pub coverage_csv: PathBuf,
    pub missing_evidence_csv: PathBuf,
    pub summary_json: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_questions: usize,
    pub requirements: Vec<RequirementCount>,
    pub gaps: Vec<String>,
    pub missing_evidence_count: usize,
    pub artifacts: Artifacts,
}

/// Write the three artifacts into `out_dir` (created if needed).
#[instrument(skip_all, fields(out_dir = %out_dir.display()))]
pub fn write_reports(
    out_dir: &Path,
    total_questions: usize,
    coverage: &Coverage,
    missing: &[MissingEvidence],
) -> Result<Summary> {
    fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    let artifacts = Artifacts {
        coverage_csv: out_dir.join(COVERAGE_CSV),
        missing_evidence_csv: out_dir.join(MISSING_EVIDENCE_CSV),
        summary_json: out_dir.join(SUMMARY_JSON),
    };

    write_coverage_csv(&artifacts.coverage_csv, coverage)?;
    write_missing_evidence_csv(&artifacts.missing_evidence_csv, missing)?;

    let summary = Summary {
        total_questions,
        requirements: coverage
            .entries
            .iter()
            .map(|entry| RequirementCount {
                requirement: entry.requirement.clone(),
                count: entry.question_ids.len(),
            })
            .collect(),
        gaps: coverage.gaps().into_iter().map(str::to_string).collect(),
        missing_evidence_count: missing.len(),
        artifacts,
    };
    let json = serde_json::to_string_pretty(&summary).context("serialize coverage summary")?;
    fs::write(&summary.artifacts.summary_json, format!("{json}\n"))
        .with_context(|| format!("write {}", summary.artifacts.summary_json.display()))?;
    debug!("coverage artifacts written");
    Ok(summary)
}

fn write_coverage_csv(path: &Path, coverage: &Coverage) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for entry in &coverage.entries {
        writer
            .serialize(CoverageRow {
                requirement: &entry.requirement,
                covered: if entry.is_covered() { "Y" } else { "N" },
                count: entry.question_ids.len(),
                question_ids: entry.question_ids.join(";"),
                proposed_add_if_gap: if entry.is_covered() {
                    String::new()
                } else {
                    format!("ADD_{}_QUESTION", entry.requirement)
                },
            })
            .with_context(|| format!("write {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))
}

fn write_missing_evidence_csv(path: &Path, missing: &[MissingEvidence]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    // Header first: an empty list still yields a valid CSV.
    writer
        .write_record(["id", "tags"])
        .with_context(|| format!("write {}", path.display()))?;
    for row in missing {
        writer
            .write_record([row.id.as_str(), row.tags.as_str()])
            .with_context(|| format!("write {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))
}
