//! CLI command implementations.

use std::path::Path;

use anyhow::Result;
use opscheck::exit_codes;
use tracing::info;

use crate::questions::load_questions;
use crate::report::write_reports;
use crate::requirements::{compute, missing_evidence};

pub struct ReportOptions<'a> {
    pub questions: &'a Path,
    pub out_dir: &'a Path,
    pub text_fallback: bool,
    /// Exit non-zero when a requirement is uncovered.
    pub strict: bool,
}

/// Build the coverage artifacts and return the exit code.
pub fn report(options: &ReportOptions<'_>) -> Result<i32> {
    let questions = load_questions(options.questions)?;
    info!(questions = questions.len(), "questions loaded");

    let coverage = compute(&questions, options.text_fallback);
    let missing = missing_evidence(&questions);
    let summary = write_reports(options.out_dir, questions.len(), &coverage, &missing)?;

    println!(
        "OK: {} questions -> {}, {}, {}",
        summary.total_questions,
        summary.artifacts.coverage_csv.display(),
        summary.artifacts.missing_evidence_csv.display(),
        summary.artifacts.summary_json.display()
    );
    if summary.missing_evidence_count > 0 {
        println!("MISSING EVIDENCE: {}", summary.missing_evidence_count);
    }
    if summary.gaps.is_empty() {
        return Ok(exit_codes::OK);
    }
    println!("GAPS: {}", summary.gaps.join(", "));
    Ok(if options.strict {
        exit_codes::CRITICAL_FAILED
    } else {
        exit_codes::OK
    })
}
