//! Source positions and ranges.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single position in a source file.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Pos {
    /// Line number (1-indexed).
    pub line: usize,
    /// Column number counted in characters (1-indexed).
    pub column: usize,
    /// Byte offset (0-indexed).
    pub byte: usize,
}

impl Pos {
    /// Creates a new position.
    #[must_use]
    pub const fn new(line: usize, column: usize, byte: usize) -> Self {
        Self { line, column, byte }
    }

    /// The first position of any file.
    #[must_use]
    pub const fn start_of_file() -> Self {
        Self::new(1, 1, 0)
    }

    /// Returns the position reached after reading `text` from `self`.
    #[must_use]
    pub fn advance(self, text: &str) -> Self {
        let mut pos = self;
        for ch in text.chars() {
            pos.byte += ch.len_utf8();
            if ch == '\n' {
                pos.line += 1;
                pos.column = 1;
            } else {
                pos.column += 1;
            }
        }
        pos
    }
}

/// A span of source text in a named file.
///
/// `Range::default()` is the zero range, used for findings that are not tied
/// to any file (for example a missing top-level attribute).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Range {
    /// File name, relative to the working directory.
    pub filename: String,
    /// Start position (inclusive).
    pub start: Pos,
    /// End position (exclusive).
    pub end: Pos,
}

impl Range {
    /// Creates a new range.
    #[must_use]
    pub fn new(filename: impl Into<String>, start: Pos, end: Pos) -> Self {
        Self {
            filename: filename.into(),
            start,
            end,
        }
    }

    /// Returns true if the range covers no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start.byte >= self.end.byte
    }

    /// Returns true if this is the zero, file-less range.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Returns true if both ranges are in the same file and share at least
    /// one byte. An empty range overlaps a range that contains its offset.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        if self.filename != other.filename {
            return false;
        }
        match (self.is_empty(), other.is_empty()) {
            (true, true) => self.start.byte == other.start.byte,
            (true, false) => other.contains_offset(self.start.byte),
            (false, true) => self.contains_offset(other.start.byte),
            (false, false) => {
                self.start.byte < other.end.byte && other.start.byte < self.end.byte
            }
        }
    }

    /// Returns true if `offset` lies within `[start, end)`.
    #[must_use]
    pub fn contains_offset(&self, offset: usize) -> bool {
        self.start.byte <= offset && offset < self.end.byte
    }

    /// Returns the smallest range covering both `self` and `other`.
    #[must_use]
    pub fn to(&self, other: &Self) -> Self {
        Self {
            filename: self.filename.clone(),
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Returns the zero-width range at the start of this range.
    #[must_use]
    pub fn start_range(&self) -> Self {
        Self {
            filename: self.filename.clone(),
            start: self.start,
            end: self.start,
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            write!(
                f,
                "{}:{},{}-{}",
                self.filename, self.start.line, self.start.column, self.end.column
            )
        } else {
            write!(
                f,
                "{}:{},{}-{},{}",
                self.filename, self.start.line, self.start.column, self.end.line, self.end.column
            )
        }
    }
}
