//! Comment annotations that silence issues.
//!
//! An annotation on the line of an issue, or on the line before it,
//! suppresses the named rules:
//! ```text
//! # hclint-ignore: terraform_unused_declarations reason="kept for callers"
//! // hclint-ignore: rule_a, rule_b
//! ```

use std::collections::BTreeSet;

/// A parsed `hclint-ignore` annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Rule names, or `all`.
    pub rules: BTreeSet<String>,
    /// Optional reason given after the rule list.
    pub reason: Option<String>,
}

impl Annotation {
    /// Returns true if the annotation covers `rule`.
    #[must_use]
    pub fn covers(&self, rule: &str) -> bool {
        self.rules.contains(rule) || self.rules.contains("all")
    }
}

/// Returns the annotation that silences `rule` at `line` (1-indexed), if any.
#[must_use]
pub fn find_ignore(source: &str, line: usize, rule: &str) -> Option<Annotation> {
    let lines: Vec<&str> = source.lines().collect();
    for check_line in [line, line.saturating_sub(1)] {
        if check_line == 0 || check_line > lines.len() {
            continue;
        }
        if let Some(annotation) = parse_annotation(lines[check_line - 1]) {
            if annotation.covers(rule) {
                return Some(annotation);
            }
        }
    }
    None
}

/// Parses the annotation in a line, which may follow code.
fn parse_annotation(line: &str) -> Option<Annotation> {
    let start = line.find("hclint-ignore:")?;
    let prefix = line[..start].trim_end();
    if !(prefix.ends_with('#') || prefix.ends_with("//") || prefix.ends_with("/*")) {
        return None;
    }
    let rest = line[start + "hclint-ignore:".len()..]
        .trim()
        .trim_end_matches("*/")
        .trim_end();

    let (list, reason) = match rest.find("reason=") {
        Some(at) => (&rest[..at], parse_reason(&rest[at + "reason=".len()..])),
        None => (rest, None),
    };
    let rules: BTreeSet<String> = list
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if rules.is_empty() {
        return None;
    }
    Some(Annotation { rules, reason })
}

fn parse_reason(text: &str) -> Option<String> {
    let quoted = text.trim().strip_prefix('"')?;
    let end = quoted.find('"')?;
    Some(quoted[..end].to_string())
}
