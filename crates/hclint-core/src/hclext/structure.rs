//! Extracted body content.

use super::{Expression, Range};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An attribute whose expression has not been evaluated yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Value expression.
    pub expr: Expression,
    /// Range of the whole `name = value` definition.
    pub range: Range,
    /// Range of the name.
    pub name_range: Range,
}

/// A block matched by a [`super::BlockSchema`], with its body fully resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block type keyword.
    #[serde(rename = "type")]
    pub block_type: String,
    /// Label values, as many as the schema declares.
    pub labels: Vec<String>,
    /// Nested content.
    pub body: BodyContent,
    /// Range from the type keyword through the last label.
    pub def_range: Range,
    /// Range of the type keyword.
    pub type_range: Range,
    /// Range of each label, including quotes.
    pub label_ranges: Vec<Range>,
}

/// A finite snapshot of a body matching a schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyContent {
    /// Attributes by name.
    pub attributes: BTreeMap<String, Attribute>,
    /// Blocks in source order.
    pub blocks: Vec<Block>,
}

impl BodyContent {
    /// Returns true if nothing was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.blocks.is_empty()
    }

    /// Returns an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Iterates over blocks of one type.
    pub fn blocks_of_type<'a>(&'a self, block_type: &'a str) -> impl Iterator<Item = &'a Block> {
        self.blocks.iter().filter(move |b| b.block_type == block_type)
    }

    /// Appends another file's content. Top-level blocks of the same type
    /// from different files are kept side by side.
    pub fn merge(&mut self, other: BodyContent) {
        self.attributes.extend(other.attributes);
        self.blocks.extend(other.blocks);
    }
}
