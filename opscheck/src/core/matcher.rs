//! Content expectations evaluated against file text.

use anyhow::{Context, Result};
use regex::Regex;

/// What a file's text must (or must not) contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRule {
    Contains(String),
    NotContains(String),
    Matches(String),
    NotMatches(String),
}

/// Outcome of evaluating a [`ContentRule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub ok: bool,
    pub detail: String,
}

pub fn evaluate(rule: &ContentRule, text: &str) -> Result<Match> {
    let outcome = match rule {
        ContentRule::Contains(needle) => match first_line_containing(text, needle) {
            Some(line) => Match {
                ok: true,
                detail: format!("found {needle:?} at line {line}"),
            },
            None => Match {
                ok: false,
                detail: format!("missing {needle:?}"),
            },
        },
        ContentRule::NotContains(needle) => match first_line_containing(text, needle) {
            Some(line) => Match {
                ok: false,
                detail: format!("unexpected {needle:?} at line {line}"),
            },
            None => Match {
                ok: true,
                detail: format!("no {needle:?}"),
            },
        },
        ContentRule::Matches(pattern) => {
            let regex = compile(pattern)?;
            match first_line_matching(text, &regex) {
                Some(line) => Match {
                    ok: true,
                    detail: format!("/{pattern}/ matched at line {line}"),
                },
                None => Match {
                    ok: false,
                    detail: format!("/{pattern}/ not matched"),
                },
            }
        }
        ContentRule::NotMatches(pattern) => {
            let regex = compile(pattern)?;
            match first_line_matching(text, &regex) {
                Some(line) => Match {
                    ok: false,
                    detail: format!("/{pattern}/ unexpectedly matched at line {line}"),
                },
                None => Match {
                    ok: true,
                    detail: format!("/{pattern}/ absent"),
                },
            }
        }
    };
    Ok(outcome)
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("invalid regex /{pattern}/"))
}

fn first_line_containing(text: &str, needle: &str) -> Option<usize> {
    let offset = text.find(needle)?;
    Some(line_of(text, offset))
}

fn first_line_matching(text: &str, regex: &Regex) -> Option<usize> {
    let found = regex.find(text)?;
    Some(line_of(text, found.start()))
}

/// 1-based line number of a byte offset.
fn line_of(text: &str, offset: usize) -> usize {
    text[..offset].bytes().filter(|b| *b == b'\n').count() + 1
}
