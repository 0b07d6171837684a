//! Accumulating configuration diagnostics.

use super::{Range, SourceFile};
use miette::{NamedSource, SourceSpan};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// The configuration cannot be used as written.
    #[default]
    Error,
    /// Suspicious but usable configuration.
    Warning,
}

/// One problem found while extracting or decoding configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity.
    pub severity: DiagnosticSeverity,
    /// Short summary, e.g. `Unsupported argument`.
    pub summary: String,
    /// Longer explanation.
    pub detail: String,
    /// Source range the diagnostic refers to, if any.
    pub subject: Option<Range>,
}

impl Diagnostic {
    /// Creates an error diagnostic.
    #[must_use]
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: detail.into(),
            subject: None,
        }
    }

    /// Attaches a subject range.
    #[must_use]
    pub fn with_subject(mut self, subject: Range) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Returns true for error severity.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }

    /// Converts this diagnostic into a miette report against `file`.
    #[must_use]
    pub fn to_miette(&self, file: &SourceFile) -> HclDiagnostic {
        let span = self.subject.as_ref().map_or_else(
            || SourceSpan::from(0..0),
            |r| SourceSpan::from(r.start.byte..r.end.byte.max(r.start.byte)),
        );
        HclDiagnostic {
            summary: self.summary.clone(),
            detail: self.detail.clone(),
            src: NamedSource::new(file.name.clone(), file.source.clone()),
            span,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(subject) = &self.subject {
            write!(f, "{subject}: ")?;
        }
        if self.detail.is_empty() {
            write!(f, "{}", self.summary)
        } else {
            write!(f, "{}; {}", self.summary, self.detail)
        }
    }
}

/// An ordered list of diagnostics.
///
/// Extraction and decoding keep going after the first problem so that a
/// caller sees every issue in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a diagnostic.
    pub fn push(&mut self, diag: Diagnostic) {
        self.0.push(diag);
    }

    /// Appends every diagnostic from `other`.
    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    /// Returns true if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    /// Returns true if the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the diagnostics.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// Returns `Ok(value)` when there are no errors, otherwise `Err(self)`.
    ///
    /// # Errors
    ///
    /// Returns the diagnostics if any of them is an error.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.has_errors() {
            Err(self)
        } else {
            Ok(value)
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => write!(f, "no diagnostics"),
            [only] => write!(f, "{only}"),
            [first, rest @ ..] => {
                let plural = if rest.len() == 1 { "" } else { "s" };
                write!(f, "{first}, and {} other diagnostic{plural}", rest.len())
            }
        }
    }
}

impl std::error::Error for Diagnostics {}

impl From<Diagnostic> for Diagnostics {
    fn from(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Rich rendering of a [`Diagnostic`] with its source snippet.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("{summary}")]
#[diagnostic(code(hclint::config))]
pub struct HclDiagnostic {
    summary: String,
    #[help]
    detail: String,
    #[source_code]
    src: NamedSource<String>,
    #[label("here")]
    span: SourceSpan,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hclext::Pos;

    #[test]
    fn test_display_with_subject() {
        let diag = Diagnostic::error("Unsupported argument", "An argument named \"x\" is not expected here.")
            .with_subject(Range::new("main.tf", Pos::new(2, 3, 10), Pos::new(2, 4, 11)));
        assert_eq!(
            diag.to_string(),
            "main.tf:2,3-4: Unsupported argument; An argument named \"x\" is not expected here."
        );
    }

    #[test]
    fn test_display_many() {
        let diags: Diagnostics = vec![
            Diagnostic::error("first", ""),
            Diagnostic::error("second", ""),
            Diagnostic::error("third", ""),
        ]
        .into_iter()
        .collect();
        assert_eq!(diags.to_string(), "first, and 2 other diagnostics");
    }

    #[test]
    fn test_into_result() {
        assert!(Diagnostics::new().into_result(1).is_ok());
        let diags = Diagnostics::from(Diagnostic::error("bad", ""));
        assert!(diags.into_result(1).is_err());
    }
}
