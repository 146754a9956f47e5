//! Questions CSV loading and column discovery.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

const ID_COLUMNS: &[&str] = &["id", "question_id", "qid", "key", "ref"];
const TEXT_COLUMNS: &[&str] = &["text", "question", "prompt", "body", "label"];
const TAG_COLUMNS: &[&str] = &[
    "tags",
    "tag",
    "controls",
    "control",
    "categories",
    "category",
    "cr",
    "mapping",
];
const EVIDENCE_COLUMNS: &[&str] = &["evidence", "evidence_path"];

static TAG_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,|;/\s]+").expect("valid tag split regex"));
/// `cr 10` or `CR - 3` inside a tag cell is one token, not two.
static SPACED_CR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bCR[\s_-]+(\d+)\b").expect("valid spaced CR regex"));

/// Input problems that map to dedicated exit codes.
#[derive(Debug)]
pub enum LoadError {
    MissingFile(PathBuf),
    /// No tag column among the headers.
    MissingColumns { headers: Vec<String> },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::MissingFile(path) => {
                write!(f, "questions file not found: {}", path.display())
            }
            LoadError::MissingColumns { headers } => write!(
                f,
                "questions CSV needs a tag column (one of {}); found [{}]",
                TAG_COLUMNS.join(", "),
                headers.join(", ")
            ),
        }
    }
}

impl std::error::Error for LoadError {}

/// One row of the questions CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    pub text: String,
    /// Upper-cased tokens from every tag column.
    pub tags: BTreeSet<String>,
    pub evidence: String,
}

/// Header positions found by [`discover_columns`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Columns {
    pub id: Option<usize>,
    pub text: Option<usize>,
    pub tags: Vec<usize>,
    pub evidence: Option<usize>,
}

/// Case-insensitive header lookup; the first matching header wins.
pub fn discover_columns(headers: &[String]) -> Columns {
    let find = |candidates: &[&str]| {
        headers
            .iter()
            .position(|header| candidates.contains(&header.trim().to_lowercase().as_str()))
    };
    Columns {
        id: find(ID_COLUMNS),
        text: find(TEXT_COLUMNS),
        tags: headers
            .iter()
            .enumerate()
            .filter(|(_, header)| TAG_COLUMNS.contains(&header.trim().to_lowercase().as_str()))
            .map(|(index, _)| index)
            .collect(),
        evidence: find(EVIDENCE_COLUMNS),
    }
}

/// Split a tag cell into upper-cased tokens.
pub fn tokens(cell: &str) -> BTreeSet<String> {
    let joined = SPACED_CR.replace_all(cell, "CR$1");
    TAG_SPLIT
        .split(&joined)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_uppercase)
        .collect()
}

pub fn load_questions(path: &Path) -> Result<Vec<Question>> {
    if !path.is_file() {
        return Err(LoadError::MissingFile(path.to_path_buf()).into());
    }
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    parse_questions(file).with_context(|| format!("load questions {}", path.display()))
}

pub fn parse_questions<R: Read>(reader: R) -> Result<Vec<Question>> {
    let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = csv
        .headers()
        .context("read CSV headers")?
        .iter()
        .enumerate()
        .map(|(index, header)| {
            if index == 0 {
                header.trim_start_matches('\u{feff}').to_string()
            } else {
                header.to_string()
            }
        })
        .collect();
    let columns = discover_columns(&headers);
    debug!(?columns, "columns discovered");
    if columns.tags.is_empty() {
        return Err(LoadError::MissingColumns { headers }.into());
    }

    let mut questions = Vec::new();
    for (index, record) in csv.records().enumerate() {
        let record = record.with_context(|| format!("read CSV row {}", index + 1))?;
        let cell = |column: Option<usize>| {
            column
                .and_then(|column| record.get(column))
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        };
        let id = cell(columns.id);
        let id = if id.is_empty() {
            format!("row{}", index + 1)
        } else {
            id
        };
        let mut tags = BTreeSet::new();
        for &column in &columns.tags {
            tags.extend(tokens(record.get(column).unwrap_or_default()));
        }
        questions.push(Question {
            id,
            text: cell(columns.text),
            tags,
            evidence: cell(columns.evidence),
        });
    }
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn discovers_columns_case_insensitively() {
        let columns = discover_columns(&headers(&["QID", "Prompt", "Controls", "CR", "Evidence_Path"]));
        assert_eq!(columns.id, Some(0));
        assert_eq!(columns.text, Some(1));
        assert_eq!(columns.tags, vec![2, 3]);
        assert_eq!(columns.evidence, Some(4));
    }

    #[test]
    fn tokens_split_and_join_spaced_cr() {
        let tags = tokens("cr 10; a | evidence_required / cr-01");
        let expected: BTreeSet<String> = ["CR10", "A", "EVIDENCE_REQUIRED", "CR01"]
            .into_iter()
            .map(str::to_string)
            .collect();
        assert_eq!(tags, expected);
    }

    #[test]
    fn parses_rows_with_bom_and_missing_ids() {
        let csv = "\u{feff}id,question,tags\nQ1,Is CR3 met?,A\n,No id here,B;CR2\n";
        let questions = parse_questions(csv.as_bytes()).expect("parse");
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].id, "Q1");
        assert_eq!(questions[0].text, "Is CR3 met?");
        assert_eq!(questions[1].id, "row2");
        assert!(questions[1].tags.contains("CR2"));
    }

    #[test]
    fn missing_tag_column_is_typed_error() {
        let err = parse_questions("id,text\nQ1,hello\n".as_bytes()).expect_err("no tags");
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::MissingColumns { .. })
        ));
    }

    #[test]
    fn missing_file_is_typed_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_questions(&temp.path().join("questions.csv")).expect_err("missing");
        assert!(matches!(
            err.downcast_ref::<LoadError>(),
            Some(LoadError::MissingFile(_))
        ));
    }
}
