//! Declarative body schemas.

use serde::{Deserialize, Serialize};

/// How a body is matched against its schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaMode {
    /// Only the declared attributes and blocks are extracted.
    #[default]
    Default,
    /// Every attribute is extracted; any block is an error.
    JustAttributes,
}

/// Expected attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeSchema {
    /// Attribute name.
    pub name: String,
    /// Whether the attribute must be present.
    pub required: bool,
}

/// Expected block type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockSchema {
    /// Block type keyword.
    #[serde(rename = "type")]
    pub block_type: String,
    /// Names of the labels the block must carry, in order.
    pub label_names: Vec<String>,
    /// Nested schema. `None` is an empty schema.
    pub body: Option<BodySchema>,
}

impl BlockSchema {
    /// Creates a block schema without labels or nested body.
    #[must_use]
    pub fn new(block_type: impl Into<String>) -> Self {
        Self {
            block_type: block_type.into(),
            label_names: Vec::new(),
            body: None,
        }
    }

    /// Sets the label names.
    #[must_use]
    pub fn labels(mut self, names: &[&str]) -> Self {
        self.label_names = names.iter().map(ToString::to_string).collect();
        self
    }

    /// Sets the nested body schema.
    #[must_use]
    pub fn body(mut self, body: BodySchema) -> Self {
        self.body = Some(body);
        self
    }
}

/// The expected shape of a configuration body.
///
/// Schemas are finite by construction so that they can be sent over the
/// wire and compared for equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodySchema {
    /// Matching mode.
    pub mode: SchemaMode,
    /// Expected attributes.
    pub attributes: Vec<AttributeSchema>,
    /// Expected blocks.
    pub blocks: Vec<BlockSchema>,
}

impl BodySchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a schema that accepts any attribute and no blocks.
    #[must_use]
    pub fn just_attributes() -> Self {
        Self {
            mode: SchemaMode::JustAttributes,
            ..Self::default()
        }
    }

    /// Adds an optional attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(AttributeSchema {
            name: name.into(),
            required: false,
        });
        self
    }

    /// Adds a required attribute.
    #[must_use]
    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(AttributeSchema {
            name: name.into(),
            required: true,
        });
        self
    }

    /// Adds a block.
    #[must_use]
    pub fn block(mut self, block: BlockSchema) -> Self {
        self.blocks.push(block);
        self
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn find_attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Looks up a block by type.
    #[must_use]
    pub fn find_block(&self, block_type: &str) -> Option<&BlockSchema> {
        self.blocks.iter().find(|b| b.block_type == block_type)
    }

    /// Returns true if the schema declares nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.blocks.is_empty()
    }
}
