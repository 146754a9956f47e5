//! Naming-convention detection and suggestions.
//!
//! Suggestions are advisory. Nothing in opscheck rewrites source files: a
//! textual rename cannot tell identifiers from string literals or shadowed
//! bindings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameCase {
    /// `user-profile`
    Kebab,
    /// `user_profile`
    Snake,
    /// `userProfile`
    Camel,
    /// `UserProfile`
    Pascal,
    /// `USER_PROFILE`
    ScreamingSnake,
}

impl std::fmt::Display for NameCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            NameCase::Kebab => "kebab-case",
            NameCase::Snake => "snake_case",
            NameCase::Camel => "camelCase",
            NameCase::Pascal => "PascalCase",
            NameCase::ScreamingSnake => "SCREAMING_SNAKE_CASE",
        };
        f.write_str(label)
    }
}

pub fn conforms(name: &str, case: NameCase) -> bool {
    if name.is_empty() {
        return false;
    }
    match case {
        NameCase::Kebab => separated(name, '-', |ch| {
            ch.is_ascii_lowercase() || ch.is_ascii_digit()
        }),
        NameCase::Snake => separated(name, '_', |ch| {
            ch.is_ascii_lowercase() || ch.is_ascii_digit()
        }),
        NameCase::ScreamingSnake => separated(name, '_', |ch| {
            ch.is_ascii_uppercase() || ch.is_ascii_digit()
        }),
        NameCase::Camel => alphanumeric_starting_with(name, |ch| ch.is_ascii_lowercase()),
        NameCase::Pascal => alphanumeric_starting_with(name, |ch| ch.is_ascii_uppercase()),
    }
}

/// Split a name into words on separators and case boundaries.
///
/// Acronyms stay together: `HTTPServer` splits into `HTTP` and `Server`.
pub fn words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (index, &ch) in chars.iter().enumerate() {
        if matches!(ch, '-' | '_' | '.' | ' ') {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if ch.is_uppercase() && !current.is_empty() {
            let prev = chars[index - 1];
            let next_is_lower = chars.get(index + 1).is_some_and(|next| next.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Re-join the words of `name` in the target case.
pub fn suggest(name: &str, case: NameCase) -> String {
    let words: Vec<String> = words(name).iter().map(|w| w.to_lowercase()).collect();
    match case {
        NameCase::Kebab => words.join("-"),
        NameCase::Snake => words.join("_"),
        NameCase::ScreamingSnake => words.join("_").to_uppercase(),
        NameCase::Camel => {
            let mut out = String::new();
            for (index, word) in words.iter().enumerate() {
                if index == 0 {
                    out.push_str(word);
                } else {
                    out.push_str(&capitalize(word));
                }
            }
            out
        }
        NameCase::Pascal => words.iter().map(|w| capitalize(w)).collect(),
    }
}

fn separated(name: &str, separator: char, allowed: impl Fn(char) -> bool) -> bool {
    name.split(separator)
        .all(|part| !part.is_empty() && part.chars().all(&allowed))
}

fn alphanumeric_starting_with(name: &str, first: impl Fn(char) -> bool) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(ch) if first(ch) => chars.all(|ch| ch.is_ascii_alphanumeric()),
        _ => false,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
