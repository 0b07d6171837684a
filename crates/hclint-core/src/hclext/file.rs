//! Per-file source handles.

use super::{Diagnostic, Diagnostics, Pos, Range};
use hcl::edit::structure::Body;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One configuration file: its name and full text.
///
/// This is what [`crate::Runner::get_files`] hands out, so it must stay a
/// plain value that can be serialized across a process boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// File name, relative to the working directory.
    pub name: String,
    /// File contents.
    pub source: String,
    #[serde(skip)]
    line_starts: OnceLock<Vec<usize>>,
}

impl PartialEq for SourceFile {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.source == other.source
    }
}

impl Eq for SourceFile {}

impl SourceFile {
    /// Creates a new source file.
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            line_starts: OnceLock::new(),
        }
    }

    /// Parses the file as an HCL body.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic pointing at the syntax error.
    pub fn parse(&self) -> Result<Body, Diagnostics> {
        hcl::edit::parser::parse_body(&self.source).map_err(|err| {
            let loc = err.location();
            let start = Pos::new(loc.line(), loc.column(), loc.offset());
            let end = Pos::new(loc.line(), loc.column() + 1, loc.offset() + 1);
            Diagnostic::error("Invalid syntax", err.message())
                .with_subject(Range::new(&self.name, start, end))
                .into()
        })
    }

    /// Returns the position of a byte offset.
    #[must_use]
    pub fn pos_at(&self, byte: usize) -> Pos {
        let byte = byte.min(self.source.len());
        let starts = self.line_starts.get_or_init(|| {
            std::iter::once(0)
                .chain(self.source.match_indices('\n').map(|(i, _)| i + 1))
                .collect()
        });
        let line = starts.partition_point(|&s| s <= byte).max(1);
        let line_start = starts.get(line - 1).copied().unwrap_or(0);
        let column = self
            .source
            .get(line_start..byte)
            .map_or(byte - line_start, |text| text.chars().count())
            + 1;
        Pos::new(line, column, byte)
    }

    /// Converts a byte span into a [`Range`] in this file.
    #[must_use]
    pub fn range_of(&self, span: std::ops::Range<usize>) -> Range {
        Range::new(&self.name, self.pos_at(span.start), self.pos_at(span.end))
    }

    /// Returns the text covered by a byte span.
    #[must_use]
    pub fn slice(&self, span: std::ops::Range<usize>) -> &str {
        self.source.get(span).unwrap_or_default()
    }

    /// The zero-width range at the start of the file.
    #[must_use]
    pub fn start_range(&self) -> Range {
        let start = Pos::start_of_file();
        Range::new(&self.name, start, start)
    }
}
