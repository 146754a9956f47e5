//! Requirement coverage computed from tagged questions.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::questions::Question;

/// Letter requirements; only ever matched from tags.
const LETTERS: [&str; 7] = ["A", "B", "C", "D", "E", "F", "G"];
/// Tag marking a question that must carry evidence.
pub const EVIDENCE_REQUIRED: &str = "EVIDENCE_REQUIRED";

static CR_IN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bCR[-_ ]?0?([1-9]|10)\b").expect("valid CR text regex")
});

/// `CR1`..`CR10`, then `A`..`G`.
pub fn requirements() -> Vec<String> {
    (1..=10)
        .map(|n| format!("CR{n}"))
        .chain(LETTERS.iter().map(|letter| letter.to_string()))
        .collect()
}

/// Normalize a CR token: `cr-01`, `CR_3`, `cr 10` become `CR1`, `CR3`, `CR10`.
///
/// Returns `None` for anything that is not CR1 through CR10.
pub fn norm_cr(token: &str) -> Option<String> {
    let compact: String = token
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '_' && *ch != '-')
        .collect::<String>()
        .to_uppercase();
    let digits = compact.strip_prefix("CR")?;
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let number: u32 = digits.parse().ok()?;
    (1..=10).contains(&number).then(|| format!("CR{number}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementCoverage {
    pub requirement: String,
    /// Covering question ids, first-seen order, no duplicates.
    pub question_ids: Vec<String>,
}

impl RequirementCoverage {
    pub fn is_covered(&self) -> bool {
        !self.question_ids.is_empty()
    }

    fn add(&mut self, id: &str) {
        if !self.question_ids.iter().any(|existing| existing == id) {
            self.question_ids.push(id.to_string());
        }
    }
}

/// Coverage of every requirement, in [`requirements`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coverage {
    pub entries: Vec<RequirementCoverage>,
}

impl Coverage {
    pub fn gaps(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_covered())
            .map(|entry| entry.requirement.as_str())
            .collect()
    }

    fn entry_mut(&mut self, requirement: &str) -> Option<&mut RequirementCoverage> {
        self.entries
            .iter_mut()
            .find(|entry| entry.requirement == requirement)
    }
}

/// Map questions onto requirements.
///
/// CRs come from tags and, with `text_fallback`, from mentions in the
/// question text. Letters come from tags only.
pub fn compute(questions: &[Question], text_fallback: bool) -> Coverage {
    let mut coverage = Coverage {
        entries: requirements()
            .into_iter()
            .map(|requirement| RequirementCoverage {
                requirement,
                question_ids: Vec::new(),
            })
            .collect(),
    };

    for question in questions {
        let mut matched: Vec<String> = Vec::new();
        for tag in &question.tags {
            if let Some(cr) = norm_cr(tag) {
                matched.push(cr);
            } else if LETTERS.contains(&tag.as_str()) {
                matched.push(tag.clone());
            }
        }
        if text_fallback {
            for caps in CR_IN_TEXT.captures_iter(&question.text) {
                matched.push(format!("CR{}", &caps[1]));
            }
        }
        for requirement in &matched {
            if let Some(entry) = coverage.entry_mut(requirement) {
                entry.add(&question.id);
            }
        }
    }
    coverage
}

/// A question tagged [`EVIDENCE_REQUIRED`] with an empty evidence cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingEvidence {
    pub id: String,
    /// Sorted tags joined by `,`.
    pub tags: String,
}

pub fn missing_evidence(questions: &[Question]) -> Vec<MissingEvidence> {
    questions
        .iter()
        .filter(|question| {
            question.tags.contains(EVIDENCE_REQUIRED) && question.evidence.trim().is_empty()
        })
        .map(|question| MissingEvidence {
            id: question.id.clone(),
            tags: question.tags.iter().cloned().collect::<Vec<_>>().join(","),
        })
        .collect()
}
