//! Checklist file parsing and validation.
//!
//! A checklist is a TOML file asserting that earlier changes are in place:
//! files contain expected code, the database has expected tables, endpoints
//! answer, commands succeed.
//!
//! ```toml
//! [checklist]
//! id = "phase-3"
//! title = "REC mapping rollout"
//!
//! [[checks]]
//! name = "intake form stores REC categories"
//! type = "column_exists"
//! table = "intake_forms"
//! column = "rec_categories"
//!
//! [[checks]]
//! name = "mapping helper is wired"
//! type = "file_content"
//! path = "server/rec-mapping.ts"
//! contains = "determineRecCategories"
//! critical = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

use crate::core::matcher::ContentRule;
use crate::io::http::HttpMethod;
use crate::io::results::validate_slug;

/// A parsed checklist file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ChecklistFile {
    pub checklist: ChecklistMeta,
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ChecklistMeta {
    /// Unique identifier (slug format: `[a-z0-9_-]+`).
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// One entry of `[[checks]]`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CheckSpec {
    pub name: String,
    /// A critical failure makes the run exit non-zero.
    #[serde(default = "default_true")]
    pub critical: bool,
    /// Report a mismatch as a warning instead of a failure.
    #[serde(default)]
    pub warn_only: bool,
    #[serde(flatten)]
    pub kind: CheckKind,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckKind {
    /// Run a command; pass on the expected exit code.
    Command {
        cmd: Vec<String>,
        #[serde(default)]
        expect_exit: i32,
        #[serde(default)]
        stdout_contains: Option<String>,
    },
    /// Request an endpoint on the configured server.
    Http {
        #[serde(default)]
        method: HttpMethod,
        path: String,
        #[serde(default)]
        body: Option<String>,
        #[serde(default = "default_expect_status")]
        expect_status: Vec<u16>,
    },
    /// A read-only query returns at least one row.
    SqlExists { query: String },
    TableExists { table: String },
    ColumnExists { table: String, column: String },
    FileExists { path: PathBuf },
    /// Exactly one of the four content fields must be set.
    FileContent {
        path: PathBuf,
        #[serde(default)]
        contains: Option<String>,
        #[serde(default)]
        not_contains: Option<String>,
        #[serde(default)]
        matches: Option<String>,
        #[serde(default)]
        not_matches: Option<String>,
    },
}

fn default_true() -> bool {
    true
}

fn default_expect_status() -> Vec<u16> {
    vec![200]
}

impl ChecklistFile {
    /// Load and validate a checklist file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read checklist {}", path.display()))?;
        Self::parse_str(&contents).with_context(|| format!("load checklist {}", path.display()))
    }

    pub fn parse_str(contents: &str) -> Result<Self> {
        let checklist: ChecklistFile = toml::from_str(contents).context("parse checklist")?;
        checklist.validate()?;
        Ok(checklist)
    }

    fn validate(&self) -> Result<()> {
        validate_slug("checklist.id", &self.checklist.id)?;
        if self.checks.is_empty() {
            bail!("checks must be a non-empty array");
        }
        for (index, check) in self.checks.iter().enumerate() {
            check
                .validate()
                .with_context(|| format!("checks[{}] invalid", index))?;
        }
        Ok(())
    }
}

impl CheckSpec {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("name must be non-empty");
        }
        match &self.kind {
            CheckKind::Command { cmd, .. } => {
                if cmd.is_empty() || cmd[0].trim().is_empty() {
                    bail!("command.cmd must be a non-empty array");
                }
            }
            CheckKind::Http {
                path,
                expect_status,
                body,
                ..
            } => {
                if !path.starts_with('/') {
                    bail!("http.path must start with '/'");
                }
                if expect_status.is_empty() {
                    bail!("http.expect_status must be a non-empty array");
                }
                if let Some(body) = body {
                    serde_json::from_str::<serde_json::Value>(body)
                        .context("http.body must be valid json")?;
                }
            }
            CheckKind::SqlExists { query } => {
                if query.trim().is_empty() {
                    bail!("sql_exists.query must be non-empty");
                }
            }
            CheckKind::TableExists { table } => {
                crate::io::db::validate_identifier(table)?;
            }
            CheckKind::ColumnExists { table, column } => {
                crate::io::db::validate_identifier(table)?;
                crate::io::db::validate_identifier(column)?;
            }
            CheckKind::FileExists { path } => {
                if path.as_os_str().is_empty() {
                    bail!("file_exists.path must be non-empty");
                }
            }
            CheckKind::FileContent { path, .. } => {
                if path.as_os_str().is_empty() {
                    bail!("file_content.path must be non-empty");
                }
                self.content_rule()?;
            }
        }
        Ok(())
    }

    /// The single content rule of a `file_content` check.
    pub fn content_rule(&self) -> Result<ContentRule> {
        let CheckKind::FileContent {
            contains,
            not_contains,
            matches,
            not_matches,
            ..
        } = &self.kind
        else {
            bail!("{} is not a file_content check", self.name);
        };
        let mut rules = Vec::new();
        if let Some(value) = contains {
            rules.push(ContentRule::Contains(value.clone()));
        }
        if let Some(value) = not_contains {
            rules.push(ContentRule::NotContains(value.clone()));
        }
        if let Some(value) = matches {
            regex::Regex::new(value).context("file_content.matches is not a valid regex")?;
            rules.push(ContentRule::Matches(value.clone()));
        }
        if let Some(value) = not_matches {
            regex::Regex::new(value).context("file_content.not_matches is not a valid regex")?;
            rules.push(ContentRule::NotMatches(value.clone()));
        }
        match rules.len() {
            1 => Ok(rules.remove(0)),
            0 => Err(anyhow!(
                "file_content needs one of contains, not_contains, matches, not_matches"
            )),
            _ => Err(anyhow!("file_content accepts only one content rule")),
        }
    }
}

/// Discover and load all checklist files from a directory.
///
/// Returns checklists sorted by id, paired with their source path. Errors if
/// duplicate ids are found.
pub fn discover_checklists(dir: &Path) -> Result<Vec<(PathBuf, ChecklistFile)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut checklists = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("read checklists dir {}", dir.display()))?
    {
        let entry = entry.context("read checklist entry")?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        let checklist = ChecklistFile::load(&path)?;
        checklists.push((path, checklist));
    }
    checklists.sort_by(|left, right| left.1.checklist.id.cmp(&right.1.checklist.id));
    for pair in checklists.windows(2) {
        if pair[0].1.checklist.id == pair[1].1.checklist.id {
            return Err(anyhow!("duplicate checklist.id {}", pair[0].1.checklist.id));
        }
    }
    Ok(checklists)
}

/// Resolve a CLI argument to a checklist: an existing file path, or an id in `dir`.
pub fn resolve_checklist(dir: &Path, id_or_path: &str) -> Result<(PathBuf, ChecklistFile)> {
    let as_path = Path::new(id_or_path);
    if as_path.is_file() {
        let checklist = ChecklistFile::load(as_path)?;
        return Ok((as_path.to_path_buf(), checklist));
    }
    discover_checklists(dir)?
        .into_iter()
        .find(|(_, checklist)| checklist.checklist.id == id_or_path)
        .ok_or_else(|| anyhow!("checklist {} not found in {}", id_or_path, dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
[checklist]
id = "phase-3"
title = "REC mapping rollout"

[[checks]]
name = "intake forms table"
type = "table_exists"
table = "intake_forms"

[[checks]]
name = "rec categories column"
type = "column_exists"
table = "intake_forms"
column = "rec_categories"

[[checks]]
name = "mapping helper"
type = "file_content"
path = "server/rec-mapping.ts"
matches = "determineRecCategories\\("
critical = false

[[checks]]
name = "licenses endpoint"
type = "http"
path = "/api/licenses"
expect_status = [200, 401]

[[checks]]
name = "typecheck"
type = "command"
cmd = ["npm", "run", "check"]
warn_only = true
"#;

    #[test]
    fn parses_valid_checklist() {
        let checklist = ChecklistFile::parse_str(VALID).expect("parses");
        assert_eq!(checklist.checklist.id, "phase-3");
        assert_eq!(checklist.checks.len(), 5);
        assert!(checklist.checks[0].critical);
        assert!(!checklist.checks[2].critical);
        assert!(checklist.checks[4].warn_only);
        match &checklist.checks[3].kind {
            CheckKind::Http {
                method,
                expect_status,
                ..
            } => {
                assert_eq!(*method, HttpMethod::Get);
                assert_eq!(expect_status, &vec![200, 401]);
            }
            other => panic!("expected http, got {other:?}"),
        }
        assert_eq!(
            checklist.checks[2].content_rule().expect("rule"),
            ContentRule::Matches("determineRecCategories\\(".to_string())
        );
    }

    #[test]
    fn rejects_invalid_id() {
        let input = r#"
[checklist]
id = "Phase 3"

[[checks]]
name = "x"
type = "file_exists"
path = "a"
"#;
        let err = ChecklistFile::parse_str(input).expect_err("invalid id");
        assert!(err.to_string().contains("checklist.id"));
    }

    #[test]
    fn rejects_ambiguous_content_rule() {
        let input = r#"
[checklist]
id = "phase-1"

[[checks]]
name = "two rules"
type = "file_content"
path = "a.ts"
contains = "x"
not_contains = "y"
"#;
        let err = ChecklistFile::parse_str(input).expect_err("two rules");
        assert!(format!("{err:#}").contains("only one content rule"));
    }

    #[test]
    fn rejects_bad_table_name() {
        let input = r#"
[checklist]
id = "phase-1"

[[checks]]
name = "table"
type = "table_exists"
table = "users; drop table users"
"#;
        assert!(ChecklistFile::parse_str(input).is_err());
    }

    #[test]
    fn discovers_sorted_and_rejects_duplicates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let write = |file: &str, id: &str| {
            fs::write(
                temp.path().join(file),
                format!("[checklist]\nid = \"{id}\"\n[[checks]]\nname = \"x\"\ntype = \"file_exists\"\npath = \"a\"\n"),
            )
            .expect("write");
        };
        write("b.toml", "phase-2");
        write("a.toml", "phase-1");
        fs::write(temp.path().join("notes.md"), "ignored").expect("write");

        let found = discover_checklists(temp.path()).expect("discover");
        let ids: Vec<&str> = found.iter().map(|(_, c)| c.checklist.id.as_str()).collect();
        assert_eq!(ids, vec!["phase-1", "phase-2"]);

        let (path, _) = resolve_checklist(temp.path(), "phase-2").expect("resolve");
        assert!(path.ends_with("b.toml"));

        write("c.toml", "phase-1");
        let err = discover_checklists(temp.path()).expect_err("duplicate");
        assert!(err.to_string().contains("duplicate checklist.id"));
    }
}
