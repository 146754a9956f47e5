//! Naming-convention lint for `opscheck lint`.
//!
//! Reports file names that break a configured case rule and occurrences of
//! forbidden terms. Files are only read.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::core::naming::{conforms, suggest};
use crate::core::record::ResultRecord;
use crate::io::config::{ForbiddenTerm, NamingConfig, NamingRule};

/// Findings listed in a record's detail before the rest are counted.
pub const MAX_LISTED: usize = 20;
/// Larger files are not searched for forbidden terms.
const MAX_FILE_BYTES: u64 = 1024 * 1024;

/// One record per rule, then one per forbidden term.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn lint(root: &Path, naming: &NamingConfig) -> Result<Vec<ResultRecord>> {
    let files = collect_files(root, naming)?;
    debug!(files = files.len(), "files collected");

    let mut records = Vec::with_capacity(naming.rules.len() + naming.forbidden.len());
    for rule in &naming.rules {
        let started = Instant::now();
        records.push(check_rule(rule, &files).with_duration(started.elapsed()));
    }
    for term in &naming.forbidden {
        let started = Instant::now();
        let record = match check_forbidden(root, term, &files) {
            Ok(record) => record,
            Err(err) => ResultRecord::fail(forbidden_name(term))
                .with_detail(format!("{err:#}"))
                .critical(term.critical),
        };
        records.push(record.with_duration(started.elapsed()));
    }
    Ok(records)
}

/// Files under the configured roots, relative to `root`, sorted.
pub fn collect_files(root: &Path, naming: &NamingConfig) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for lint_root in &naming.roots {
        let dir = root.join(lint_root);
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "lint root missing, skipped");
            continue;
        }
        let walker = WalkDir::new(&dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && entry.depth() > 0
                    && naming
                        .ignore_dirs
                        .iter()
                        .any(|ignored| entry.file_name() == ignored.as_str()))
            });
        for entry in walker {
            let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();
            files.push(relative);
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn check_rule(rule: &NamingRule, files: &[PathBuf]) -> ResultRecord {
    let mut violations = Vec::new();
    for path in files {
        if !rule_applies(rule, path) {
            continue;
        }
        let Some(stem) = base_stem(path) else {
            continue;
        };
        if !conforms(stem, rule.case) {
            violations.push(format!("{} -> {}", path.display(), suggest(stem, rule.case)));
        }
    }
    let record = if violations.is_empty() {
        ResultRecord::pass(&rule.name)
    } else {
        ResultRecord::fail(&rule.name).with_detail(format!(
            "{} file(s) not {}: {}",
            violations.len(),
            rule.case,
            summarize(&violations)
        ))
    };
    record.critical(rule.critical)
}

fn rule_applies(rule: &NamingRule, path: &Path) -> bool {
    let in_dirs = rule.dirs.is_empty() || rule.dirs.iter().any(|dir| path.starts_with(dir));
    let extension = path.extension().and_then(|ext| ext.to_str());
    in_dirs
        && extension.is_some_and(|ext| {
            rule.extensions
                .iter()
                .any(|wanted| wanted.trim_start_matches('.') == ext)
        })
}

/// File name up to the first dot: `AssessmentCard.test.tsx` -> `AssessmentCard`.
fn base_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.split('.').next().filter(|stem| !stem.is_empty())
}

fn check_forbidden(root: &Path, term: &ForbiddenTerm, files: &[PathBuf]) -> Result<ResultRecord> {
    let regex = Regex::new(&term.pattern)
        .with_context(|| format!("invalid regex {:?}", term.pattern))?;
    let mut hits = Vec::new();
    for path in files {
        let full = root.join(path);
        let size = fs::metadata(&full)
            .with_context(|| format!("stat {}", full.display()))?
            .len();
        if size > MAX_FILE_BYTES {
            continue;
        }
        // Binary files are not text; skip them.
        let Ok(text) = fs::read_to_string(&full) else {
            continue;
        };
        for (index, line) in text.lines().enumerate() {
            if regex.is_match(line) {
                hits.push(format!("{}:{}", path.display(), index + 1));
            }
        }
    }
    let name = forbidden_name(term);
    let record = if hits.is_empty() {
        ResultRecord::pass(name)
    } else {
        ResultRecord::fail(name).with_detail(format!(
            "{}; {} hit(s): {}",
            term.message,
            hits.len(),
            summarize(&hits)
        ))
    };
    Ok(record.critical(term.critical))
}

fn forbidden_name(term: &ForbiddenTerm) -> String {
    format!("no match for /{}/", term.pattern)
}

fn summarize(items: &[String]) -> String {
    let listed = items
        .iter()
        .take(MAX_LISTED)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if items.len() > MAX_LISTED {
        format!("{listed} and {} more", items.len() - MAX_LISTED)
    } else {
        listed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::naming::NameCase;
    use crate::core::record::CheckStatus;
    use crate::test_support::project_dir;

    fn naming(rules: Vec<NamingRule>, forbidden: Vec<ForbiddenTerm>) -> NamingConfig {
        NamingConfig {
            rules,
            forbidden,
            ..NamingConfig::default()
        }
    }

    fn component_rule() -> NamingRule {
        NamingRule {
            name: "components are PascalCase".to_string(),
            dirs: vec![PathBuf::from("client/src/components")],
            extensions: vec!["tsx".to_string()],
            case: NameCase::Pascal,
            critical: false,
        }
    }

    #[test]
    fn reports_violations_with_suggestions() {
        let temp = project_dir(&[
            ("client/src/components/AssessmentCard.tsx", ""),
            ("client/src/components/AssessmentCard.test.tsx", ""),
            ("client/src/components/facility-profile.tsx", ""),
            ("client/src/components/node_modules/bad-name.tsx", ""),
            ("client/src/pages/intake-form.tsx", ""),
        ]);
        let records = lint(temp.path(), &naming(vec![component_rule()], vec![])).expect("lint");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, CheckStatus::Fail);
        assert!(!records[0].critical);
        assert_eq!(
            records[0].detail.as_deref(),
            Some(
                "1 file(s) not PascalCase: client/src/components/facility-profile.tsx -> FacilityProfile"
            )
        );
    }

    #[test]
    fn forbidden_terms_report_line_numbers() {
        let temp = project_dir(&[
            ("server/routes.ts", "// R2v3 routes\nconst ok = 1;\nexport const R2v3 = 2;\n"),
            ("server/clean.ts", "RUR2\n"),
        ]);
        let term = ForbiddenTerm {
            pattern: r"\bR2v3\b".to_string(),
            message: "use the RUR2 product name".to_string(),
            critical: true,
        };
        let records = lint(temp.path(), &naming(vec![], vec![term])).expect("lint");
        assert_eq!(records[0].status, CheckStatus::Fail);
        assert!(records[0].critical);
        assert_eq!(
            records[0].detail.as_deref(),
            Some("use the RUR2 product name; 2 hit(s): server/routes.ts:1, server/routes.ts:3")
        );
    }

    #[test]
    fn invalid_pattern_fails_its_record_only() {
        let temp = project_dir(&[("server/a.ts", "x\n")]);
        let terms = vec![
            ForbiddenTerm {
                pattern: "(".to_string(),
                message: "broken".to_string(),
                critical: false,
            },
            ForbiddenTerm {
                pattern: "zzz".to_string(),
                message: "absent".to_string(),
                critical: false,
            },
        ];
        let records = lint(temp.path(), &naming(vec![], terms)).expect("lint");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, CheckStatus::Fail);
        assert_eq!(records[1].status, CheckStatus::Pass);
    }

    #[test]
    fn long_lists_are_truncated() {
        let items: Vec<String> = (0..25).map(|i| i.to_string()).collect();
        assert!(summarize(&items).ends_with("19 and 5 more"));
    }
}
