//! Output filter pipeline.
//!
//! Operators type filter specs by hand, e.g. `EXACT:Gi1/0/1!!LAST:20`.
//! Stages are separated by `!!` and applied left to right. Each stage only
//! selects lines; lines are never reordered or rewritten. A stage that
//! cannot be understood passes its input through unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between chained stages. Part of the operator-facing format.
pub const CHAIN_SEPARATOR: &str = "!!";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    /// Keep lines containing the argument as a whole word
    Exact,
    /// Keep the last N lines
    Last,
    /// Anything else; a no-op
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStage {
    pub kind: FilterKind,
    pub arg: String,
}

impl FilterStage {
    /// Parse one `KIND:ARG` token; never fails
    pub fn parse(token: &str) -> Self {
        let (kind, arg) = token.split_once(':').unwrap_or((token, ""));
        let kind = match kind.trim().to_uppercase().as_str() {
            "EXACT" => FilterKind::Exact,
            "LAST" => FilterKind::Last,
            _ => FilterKind::Unknown(kind.to_string()),
        };
        Self {
            kind,
            arg: arg.to_string(),
        }
    }

    pub fn apply(&self, input: &str) -> String {
        match self.kind {
            FilterKind::Exact => exact_filter(input, &self.arg),
            FilterKind::Last => last_filter(input, &self.arg),
            FilterKind::Unknown(_) => input.to_string(),
        }
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FilterKind::Exact => write!(f, "EXACT:{}", self.arg),
            FilterKind::Last => write!(f, "LAST:{}", self.arg),
            FilterKind::Unknown(kind) => write!(f, "{}:{}", kind, self.arg),
        }
    }
}

/// An ordered chain of filter stages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub stages: Vec<FilterStage>,
}

impl FilterSpec {
    /// Parse a chained spec; empty tokens (e.g. from a trailing `!!`) are ignored
    pub fn parse(spec: &str) -> Self {
        Self {
            stages: spec
                .split(CHAIN_SEPARATOR)
                .filter(|token| !token.trim().is_empty())
                .map(FilterStage::parse)
                .collect(),
        }
    }

    pub fn apply(&self, output: &str) -> String {
        self.stages
            .iter()
            .fold(output.to_string(), |current, stage| stage.apply(&current))
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<String> = self.stages.iter().map(|s| s.to_string()).collect();
        f.write_str(&stages.join(CHAIN_SEPARATOR))
    }
}

/// Apply an optional filter spec to command output
pub fn apply_output_filter(output: &str, spec: Option<&str>) -> String {
    match spec {
        Some(spec) => FilterSpec::parse(spec).apply(output),
        None => output.to_string(),
    }
}

fn exact_filter(input: &str, token: &str) -> String {
    let token = token.trim();
    if token.is_empty() {
        return input.to_string();
    }
    input
        .split('\n')
        .filter(|line| contains_whole_word(line.trim(), token))
        .collect::<Vec<_>>()
        .join("\n")
}

fn last_filter(input: &str, arg: &str) -> String {
    let count = match arg.trim().parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => return input.to_string(),
    };
    // A terminating newline ends the last line; it does not start another
    let (body, terminator) = match input.strip_suffix('\n') {
        Some(body) => (body, "\n"),
        None => (input, ""),
    };
    let lines: Vec<&str> = body.split('\n').collect();
    let start = lines.len().saturating_sub(count);
    format!("{}{}", lines[start..].join("\n"), terminator)
}

/// Whole-word containment.
///
/// The match must not be glued to other alphanumerics, so `1/0/1` does not
/// match `11/0/1`, `1/0/11` or `1/0/1foo`. One exception: a token starting
/// with a digit may follow an interface type prefix (`Gi1/0/1`), i.e. a
/// run of letters starting with an uppercase letter at a word start.
fn contains_whole_word(content: &str, token: &str) -> bool {
    let token_starts_with_digit = token.chars().next().map_or(false, |c| c.is_ascii_digit());

    content.char_indices().any(|(start, _)| {
        if !content[start..].starts_with(token) {
            return false;
        }
        let end = start + token.len();
        let after_ok = content[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if !after_ok {
            return false;
        }
        let before = &content[..start];
        match before.chars().next_back() {
            None => true,
            Some(c) if !c.is_alphanumeric() => true,
            Some(_) => token_starts_with_digit && is_interface_prefix(before),
        }
    })
}

/// True if `before` ends with a word like `Gi`, `Te`, `Port-channel`
fn is_interface_prefix(before: &str) -> bool {
    let word_start = before
        .char_indices()
        .rev()
        .find(|(_, c)| !(c.is_ascii_alphabetic() || *c == '-'))
        .map_or(0, |(i, c)| i + c.len_utf8());
    let word = &before[word_start..];
    if word.is_empty() {
        return false;
    }
    let preceded_ok = before[..word_start]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric());
    preceded_ok
        && word.chars().next().map_or(false, |c| c.is_ascii_uppercase())
        && word.chars().last().map_or(false, |c| c.is_ascii_alphabetic())
}
