//! Run report persistence and history aggregation.
//!
//! Each run of a checklist (or other command) is written to
//! `<results_dir>/<scope>/<run_id>/report.json` for later comparison.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::core::record::{CheckStatus, ResultRecord};
use crate::core::tally::{self, RateRounding, Tally};

/// Machine-readable report of one run. Also the `--json` output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    /// Checklist id or command name.
    pub scope: String,
    pub title: String,
    /// SHA-256 of the checklist file, when the run came from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub tally: Tally,
    pub success_rate: u32,
    pub exit_code: i32,
    pub records: Vec<ResultRecord>,
}

impl RunReport {
    pub fn new(
        scope: &str,
        title: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        records: Vec<ResultRecord>,
        rounding: RateRounding,
    ) -> Self {
        let tally = Tally::from_records(&records);
        Self {
            run_id: new_run_id(started_at),
            scope: scope.to_string(),
            title: title.to_string(),
            source_hash: None,
            start_time: started_at.to_rfc3339(),
            end_time: finished_at.to_rfc3339(),
            success_rate: tally.success_rate(rounding),
            exit_code: tally::exit_code(&tally),
            tally,
            records,
        }
    }

    pub fn with_source_hash(mut self, hash: String) -> Self {
        self.source_hash = Some(hash);
        self
    }
}

/// `run-<timestamp>-<6 random chars>`; sorts chronologically.
pub fn new_run_id(started_at: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    format!("run-{}-{}", started_at.format("%Y%m%d_%H%M%S"), suffix)
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    Ok(hex::encode(hasher.finalize()))
}

/// Checklist ids and result scopes become directory names, so only
/// `[a-z0-9_-]+` is accepted.
pub fn validate_slug(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} must be non-empty");
    }
    if value.contains('/') || value.contains('\\') {
        bail!("{field} must not contain path separators");
    }
    if value.contains("..") {
        bail!("{field} must not contain '..'");
    }
    if !value
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("{field} must use [a-z0-9_-] only");
    }
    Ok(())
}

pub fn run_dir(results_dir: &Path, scope: &str, run_id: &str) -> PathBuf {
    results_dir.join(scope).join(run_id)
}

#[instrument(skip_all, fields(scope = %report.scope, run_id = %report.run_id))]
pub fn write_run_report(results_dir: &Path, report: &RunReport) -> Result<PathBuf> {
    validate_slug("scope", &report.scope)?;
    let dir = run_dir(results_dir, &report.scope, &report.run_id);
    fs::create_dir_all(&dir).with_context(|| format!("create results dir {}", dir.display()))?;
    let path = dir.join("report.json");
    let contents = serde_json::to_string_pretty(report).context("serialize run report")?;
    fs::write(&path, format!("{contents}\n"))
        .with_context(|| format!("write {}", path.display()))?;
    debug!(path = %path.display(), "run report written");
    Ok(path)
}

/// Aggregate over every persisted run of one scope.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct History {
    pub runs: usize,
    /// Runs whose exit code was 0.
    pub clean_runs: usize,
    /// Per check name: (passed, total).
    pub check_pass_rates: BTreeMap<String, (usize, usize)>,
    pub last_run_id: Option<String>,
}

/// Read all run reports of `scope`, skipping unreadable ones with a warning.
pub fn load_history(results_dir: &Path, scope: &str) -> Result<(History, Vec<String>)> {
    validate_slug("scope", scope)?;
    let scope_dir = results_dir.join(scope);
    let mut history = History::default();
    let mut warnings = Vec::new();
    if !scope_dir.exists() {
        return Ok((history, warnings));
    }

    let mut dirs = Vec::new();
    for entry in
        fs::read_dir(&scope_dir).with_context(|| format!("read {}", scope_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();

    for dir in dirs {
        let path = dir.join("report.json");
        let report: RunReport = match fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))
            .and_then(|contents| serde_json::from_str(&contents).context("parse report"))
        {
            Ok(report) => report,
            Err(err) => {
                warnings.push(format!("skip {}: {err:#}", dir.display()));
                continue;
            }
        };
        history.runs += 1;
        if report.exit_code == 0 {
            history.clean_runs += 1;
        }
        for record in &report.records {
            let entry = history
                .check_pass_rates
                .entry(record.name.clone())
                .or_insert((0, 0));
            if record.status == CheckStatus::Pass {
                entry.0 += 1;
            }
            entry.1 += 1;
        }
        history.last_run_id = Some(report.run_id);
    }
    Ok((history, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn report(run: &str, records: Vec<ResultRecord>) -> RunReport {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let mut report = RunReport::new("phase-3", "Phase 3", at, at, records, RateRounding::Round);
        report.run_id = run.to_string();
        report
    }

    #[test]
    fn run_ids_embed_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 5).unwrap();
        let id = new_run_id(at);
        assert!(id.starts_with("run-20261019_083005-"));
        assert_eq!(id.len(), "run-20261019_083005-".len() + 6);
    }

    #[test]
    fn report_carries_tally_and_exit_code() {
        let report = report(
            "run-1",
            vec![ResultRecord::pass("a"), ResultRecord::fail("b")],
        );
        assert_eq!(report.tally.total, 2);
        assert_eq!(report.success_rate, 50);
        assert_eq!(report.exit_code, crate::exit_codes::CRITICAL_FAILED);
    }

    #[test]
    fn history_aggregates_runs_and_skips_broken() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_run_report(
            temp.path(),
            &report("run-1", vec![ResultRecord::pass("a"), ResultRecord::fail("b")]),
        )
        .expect("write");
        write_run_report(
            temp.path(),
            &report("run-2", vec![ResultRecord::pass("a"), ResultRecord::pass("b")]),
        )
        .expect("write");
        let broken = temp.path().join("phase-3/run-3");
        fs::create_dir_all(&broken).expect("dir");
        fs::write(broken.join("report.json"), "{").expect("write");

        let (history, warnings) = load_history(temp.path(), "phase-3").expect("history");
        assert_eq!(history.runs, 2);
        assert_eq!(history.clean_runs, 1);
        assert_eq!(history.check_pass_rates.get("a"), Some(&(2, 2)));
        assert_eq!(history.check_pass_rates.get("b"), Some(&(1, 2)));
        assert_eq!(history.last_run_id.as_deref(), Some("run-2"));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn history_rejects_scopes_outside_results_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let results = temp.path().join("results");
        fs::create_dir_all(&results).expect("dir");
        for scope in ["..", "../results", "a/b", "Phase3", ""] {
            let err = load_history(&results, scope).expect_err(scope);
            assert!(err.to_string().starts_with("scope must"), "{scope}: {err}");
        }
    }

    #[test]
    fn sha256_of_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("c.toml");
        fs::write(&path, "abc").expect("write");
        assert_eq!(
            file_sha256(&path).expect("hash"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
