//! Core types for lint issues and analysis results.

use crate::hclext::Range;
use crate::module::ModulePath;
use crate::rule::Rule;
use miette::{Diagnostic, SourceSpan};
use serde::{Deserialize, Serialize};

/// Severity level for issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, does not fail the run.
    Notice,
    /// Should be addressed.
    Warning,
    /// Must be fixed.
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Notice => write!(f, "notice"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "notice" | "info" => Ok(Self::Notice),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// The part of a rule that travels with each issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleMeta {
    /// Rule name (e.g., `terraform_unused_declarations`).
    pub name: String,
    /// Severity of issues emitted by the rule.
    pub severity: Severity,
    /// Documentation link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl RuleMeta {
    /// Captures the metadata of a rule.
    #[must_use]
    pub fn of<R: Rule + ?Sized>(rule: &R) -> Self {
        Self {
            name: rule.name().to_string(),
            severity: rule.severity(),
            link: rule.link(),
        }
    }
}

/// A finding reported by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Issue {
    /// Rule that emitted the issue.
    pub rule: RuleMeta,
    /// Human-readable message.
    pub message: String,
    /// Source range. The zero range means the issue is not tied to a file.
    pub range: Range,
    /// Module the issue was found in.
    #[serde(default, skip_serializing_if = "ModulePath::is_root")]
    pub module: ModulePath,
}

impl Issue {
    /// Creates a new issue in the root module.
    #[must_use]
    pub fn new(rule: RuleMeta, message: impl Into<String>, range: Range) -> Self {
        Self {
            rule,
            message: message.into(),
            range,
            module: ModulePath::root(),
        }
    }

    /// Sets the module the issue was found in.
    #[must_use]
    pub fn in_module(mut self, module: ModulePath) -> Self {
        self.module = module;
        self
    }

    /// Severity of the issue.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.rule.severity
    }

    /// Formats the issue for terminal output.
    #[must_use]
    pub fn format(&self) -> String {
        use std::fmt::Write;
        let mut output = format!("{}: {} ({})\n", self.severity(), self.message, self.rule.name);
        if !self.range.is_zero() {
            let _ = writeln!(
                output,
                "  on {} line {}:",
                self.range.filename, self.range.start.line
            );
        }
        if !self.module.is_root() {
            let _ = writeln!(output, "  in {}", self.module);
        }
        if let Some(link) = &self.rule.link {
            let _ = writeln!(output, "  = see: {link}");
        }
        output
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.range.is_zero() {
            write!(f, "{} - {} ({})", self.severity(), self.message, self.rule.name)
        } else {
            write!(
                f,
                "{}:{}:{}: {} - {} ({})",
                self.range.filename,
                self.range.start.line,
                self.range.start.column,
                self.severity(),
                self.message,
                self.rule.name
            )
        }
    }
}

/// Converts an Issue to a miette Diagnostic for rich error display.
#[derive(Debug, thiserror::Error, Diagnostic)]
#[error("{message}")]
pub struct IssueDiagnostic {
    message: String,
    #[help]
    help: Option<String>,
    #[label("{label_message}")]
    span: SourceSpan,
    label_message: String,
}

impl From<&Issue> for IssueDiagnostic {
    fn from(issue: &Issue) -> Self {
        let start = issue.range.start.byte;
        let len = issue.range.end.byte.saturating_sub(start);
        Self {
            message: issue.message.clone(),
            help: issue.rule.link.clone(),
            span: SourceSpan::from((start, len)),
            label_message: issue.rule.name.clone(),
        }
    }
}

/// A rule set that failed as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetFailure {
    /// Rule set name.
    pub rule_set: String,
    /// Error message.
    pub message: String,
}

impl std::fmt::Display for RuleSetFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.rule_set, self.message)
    }
}

/// Result of running an analysis.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// All issues found, sorted by file and position.
    pub issues: Vec<Issue>,
    /// Rule sets whose check failed. Their issues are not included.
    pub failures: Vec<RuleSetFailure>,
}

impl AnalysisReport {
    /// Creates a new empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if there are any issues at all.
    #[must_use]
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Returns true if any issue is at `severity` or above.
    #[must_use]
    pub fn has_issues_at(&self, severity: Severity) -> bool {
        self.issues.iter().any(|i| i.severity() >= severity)
    }

    /// Returns true if any rule set failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Counts issues by severity as (errors, warnings, notices).
    #[must_use]
    pub fn count_by_severity(&self) -> (usize, usize, usize) {
        let count = |s: Severity| self.issues.iter().filter(|i| i.severity() == s).count();
        (
            count(Severity::Error),
            count(Severity::Warning),
            count(Severity::Notice),
        )
    }

    /// Sorts issues by file, position and rule.
    pub fn sort(&mut self) {
        self.issues.sort_by(|a, b| {
            (&a.range.filename, a.range.start, &a.rule.name, &a.message).cmp(&(
                &b.range.filename,
                b.range.start,
                &b.rule.name,
                &b.message,
            ))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hclext::Pos;

    fn meta(severity: Severity) -> RuleMeta {
        RuleMeta {
            name: "terraform_example".to_string(),
            severity,
            link: None,
        }
    }

    fn issue(file: &str, line: usize, severity: Severity) -> Issue {
        let start = Pos::new(line, 1, 0);
        Issue::new(meta(severity), "message", Range::new(file, start, start))
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Notice);
        assert_eq!("info".parse::<Severity>().unwrap(), Severity::Notice);
    }

    #[test]
    fn test_issue_display() {
        assert_eq!(
            issue("main.tf", 3, Severity::Warning).to_string(),
            "main.tf:3:1: warning - message (terraform_example)"
        );
        let fileless = Issue::new(meta(Severity::Error), "missing", Range::default());
        assert_eq!(fileless.to_string(), "error - missing (terraform_example)");
    }

    #[test]
    fn test_report_counts_and_sort() {
        let mut report = AnalysisReport {
            issues: vec![
                issue("b.tf", 1, Severity::Error),
                issue("a.tf", 9, Severity::Notice),
                issue("a.tf", 2, Severity::Warning),
            ],
            failures: Vec::new(),
        };
        report.sort();
        assert_eq!(report.count_by_severity(), (1, 1, 1));
        assert_eq!(report.issues[0].range.start.line, 2);
        assert_eq!(report.issues[2].range.filename, "b.tf");
        assert!(report.has_issues_at(Severity::Warning));
        assert!(!report.has_failures());
    }
}
