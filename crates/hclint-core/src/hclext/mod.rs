//! Content model: a finite, serializable snapshot of configuration bodies.
//!
//! Parsed HCL bodies are recursive and tied to the parser's own types. Rules
//! instead describe what they need with a [`BodySchema`] and receive a
//! [`BodyContent`] holding exactly the matching attributes and blocks, with
//! every nested block resolved eagerly. That content can then be decoded
//! into typed values via [`Decode`].

mod content;
pub mod decode;
mod diagnostic;
mod expression;
mod file;
mod pos;
mod schema;
mod structure;
pub mod traversal;

pub use content::{block_content, content, partial_content};
pub use decode::{
    decode_body, decode_expression, implied_body_schema, Decode, DecodeTarget,
};
pub use hclint_macros::Decode;
pub use diagnostic::{Diagnostic, DiagnosticSeverity, Diagnostics, HclDiagnostic};
pub use expression::Expression;
pub use file::SourceFile;
pub use pos::{Pos, Range};
pub use schema::{AttributeSchema, BlockSchema, BodySchema, SchemaMode};
pub use structure::{Attribute, Block, BodyContent};
pub use traversal::{Step, Traversal};
