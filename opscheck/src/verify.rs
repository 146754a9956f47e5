//! Checklist execution for `opscheck verify`.
//!
//! Every check that starts yields exactly one record. Errors raised while
//! running a check become a failed record carrying the error chain; they never
//! abort the remaining checks.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::matcher;
use crate::core::record::ResultRecord;
use crate::io::checklist::{CheckKind, CheckSpec, ChecklistFile};
use crate::io::db::Database;
use crate::io::http::HttpProbe;
use crate::io::process::{CommandLimits, run_command};

/// An external dependency that may have failed to initialize.
///
/// Only the checks that need an unavailable collaborator fail; the rest of the
/// checklist still runs.
#[derive(Debug)]
pub enum Collaborator<T> {
    Ready(T),
    Unavailable(String),
}

impl<T> Collaborator<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Collaborator::Ready(value),
            Err(err) => Collaborator::Unavailable(format!("{err:#}")),
        }
    }

    pub fn get(&self, what: &str) -> Result<&T> {
        match self {
            Collaborator::Ready(value) => Ok(value),
            Collaborator::Unavailable(reason) => Err(anyhow!("{what} unavailable: {reason}")),
        }
    }
}

/// Everything a check may touch.
#[derive(Debug)]
pub struct CheckContext {
    /// Project root; file paths and commands resolve against it.
    pub root: PathBuf,
    pub http: Collaborator<HttpProbe>,
    pub db: Collaborator<Database>,
    pub limits: CommandLimits,
}

/// Pass/fail decision of one check before severity is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub ok: bool,
    pub detail: String,
}

impl Verdict {
    fn new(ok: bool, detail: impl Into<String>) -> Self {
        Self {
            ok,
            detail: detail.into(),
        }
    }
}

/// Run every check of `checklist` in order.
#[instrument(skip_all, fields(checklist = %checklist.checklist.id, checks = checklist.checks.len()))]
pub fn run_checklist(checklist: &ChecklistFile, ctx: &CheckContext) -> Vec<ResultRecord> {
    info!("checklist started");
    let records: Vec<ResultRecord> = checklist
        .checks
        .iter()
        .map(|check| run_recorded(check, ctx))
        .collect();
    info!("checklist finished");
    records
}

/// Run one check and convert its outcome into a record.
pub fn run_recorded(check: &CheckSpec, ctx: &CheckContext) -> ResultRecord {
    let started = Instant::now();
    let outcome = run_check(check, ctx);
    let record = match outcome {
        Ok(verdict) if verdict.ok => ResultRecord::pass(&check.name).with_detail(verdict.detail),
        Ok(verdict) if check.warn_only => {
            ResultRecord::warn(&check.name).with_detail(verdict.detail)
        }
        Ok(verdict) => ResultRecord::fail(&check.name).with_detail(verdict.detail),
        Err(err) => {
            warn!(check = %check.name, err = %format!("{err:#}"), "check errored");
            ResultRecord::fail(&check.name).with_detail(format!("{err:#}"))
        }
    };
    let record = record
        .critical(check.critical)
        .with_duration(started.elapsed());
    debug!(check = %record.name, status = ?record.status, "check result");
    record
}

pub fn run_check(check: &CheckSpec, ctx: &CheckContext) -> Result<Verdict> {
    match &check.kind {
        CheckKind::Command {
            cmd,
            expect_exit,
            stdout_contains,
        } => command_check(cmd, *expect_exit, stdout_contains.as_deref(), ctx),
        CheckKind::Http {
            method,
            path,
            body,
            expect_status,
        } => {
            let probe = ctx.http.get("http server")?;
            let body = body
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()
                .context("parse request body")?;
            let response = probe.request(*method, path, body.as_ref())?;
            let ok = expect_status.contains(&response.status);
            let detail = if ok {
                format!("{method} {path} -> {}", response.status)
            } else {
                format!(
                    "{method} {path} -> {} (expected one of {:?})",
                    response.status, expect_status
                )
            };
            Ok(Verdict::new(ok, detail))
        }
        CheckKind::SqlExists { query } => {
            let db = ctx.db.get("database")?;
            let ok = db.query_exists(query)?;
            Ok(Verdict::new(
                ok,
                if ok { "query returned rows" } else { "query returned no rows" },
            ))
        }
        CheckKind::TableExists { table } => {
            let db = ctx.db.get("database")?;
            let ok = db.table_exists(table)?;
            Ok(Verdict::new(
                ok,
                if ok {
                    format!("table {table} present")
                } else {
                    format!("table {table} missing")
                },
            ))
        }
        CheckKind::ColumnExists { table, column } => {
            let db = ctx.db.get("database")?;
            let ok = db.column_exists(table, column)?;
            Ok(Verdict::new(
                ok,
                if ok {
                    format!("column {table}.{column} present")
                } else {
                    format!("column {table}.{column} missing")
                },
            ))
        }
        CheckKind::FileExists { path } => {
            let full = ctx.root.join(path);
            let ok = full.exists();
            Ok(Verdict::new(
                ok,
                if ok {
                    format!("{} present", path.display())
                } else {
                    format!("{} missing", path.display())
                },
            ))
        }
        CheckKind::FileContent { path, .. } => {
            let rule = check.content_rule()?;
            let text = read_text(&ctx.root, path)?;
            let outcome = matcher::evaluate(&rule, &text)?;
            Ok(Verdict::new(
                outcome.ok,
                format!("{}: {}", path.display(), outcome.detail),
            ))
        }
    }
}

fn command_check(
    cmd: &[String],
    expect_exit: i32,
    stdout_contains: Option<&str>,
    ctx: &CheckContext,
) -> Result<Verdict> {
    let output = run_command(cmd, &ctx.root, ctx.limits)?;
    if output.timed_out {
        return Ok(Verdict::new(
            false,
            format!("timed out after {}s", ctx.limits.timeout.as_secs()),
        ));
    }
    let code = output.exit_code();
    if code != Some(expect_exit) {
        let code = code.map_or_else(|| "signal".to_string(), |code| code.to_string());
        let tail = output.tail_line().unwrap_or_default();
        return Ok(Verdict::new(
            false,
            format!("exit {code} (expected {expect_exit}) {tail}").trim_end().to_string(),
        ));
    }
    if let Some(needle) = stdout_contains
        && !output.stdout_text().contains(needle)
    {
        return Ok(Verdict::new(false, format!("stdout missing {needle:?}")));
    }
    Ok(Verdict::new(true, format!("exit {expect_exit}")))
}

fn read_text(root: &Path, path: &Path) -> Result<String> {
    let full = root.join(path);
    fs::read_to_string(&full).with_context(|| format!("read {}", full.display()))
}
