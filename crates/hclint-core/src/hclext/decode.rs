//! Decoding extracted content into typed values.
//!
//! Types opt in with `#[derive(Decode)]`:
//!
//! ```ignore
//! #[derive(Debug, Default, Decode)]
//! struct Variable {
//!     #[hcl(label)]
//!     name: String,
//!     #[hcl(attr = "description", optional)]
//!     description: Option<String>,
//!     #[hcl(block = "validation")]
//!     validations: Vec<Validation>,
//! }
//! ```
//!
//! Field shape decides block cardinality: `Vec<T>` takes any number of
//! blocks, `Option<T>` at most one and a bare `T` exactly one.

use super::{Block, BodyContent, BodySchema, Diagnostic, Diagnostics, Expression};
use hcl::eval::Context;
use serde::de::DeserializeOwned;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};

/// A type that can be decoded from [`BodyContent`].
pub trait Decode: Default {
    /// Derives the body schema from the type's fields. Attribute and block
    /// names are sorted lexically.
    fn implied_schema() -> BodySchema;

    /// Names of the labels captured by `#[hcl(label)]` fields, in order.
    fn label_names() -> Vec<String> {
        Vec::new()
    }

    /// Decodes `content` into `self`, overwriting only fields present in the
    /// content.
    fn decode_into(&mut self, content: &BodyContent, ctx: Option<&Context<'_>>) -> Diagnostics;

    /// Assigns label values from a matched block.
    fn decode_labels(&mut self, block: &Block) -> Diagnostics {
        check_labels(block, &Self::label_names())
    }

    /// Decodes a fresh value from `content`.
    ///
    /// # Errors
    ///
    /// Returns the accumulated diagnostics if any of them is an error.
    fn decode_body(content: &BodyContent, ctx: Option<&Context<'_>>) -> Result<Self, Diagnostics> {
        let mut value = Self::default();
        let diags = value.decode_into(content, ctx);
        diags.into_result(value)
    }
}

/// Object-safe view of a [`Decode`] value, used where the concrete type is
/// not known, e.g. rule configuration targets.
pub trait DecodeTarget {
    /// Schema the target expects.
    fn schema(&self) -> BodySchema;

    /// Decodes `content` into the target.
    fn decode_content(&mut self, content: &BodyContent, ctx: Option<&Context<'_>>) -> Diagnostics;
}

impl<T: Decode + 'static> DecodeTarget for T {
    fn schema(&self) -> BodySchema {
        implied_body_schema::<T>()
    }

    fn decode_content(&mut self, content: &BodyContent, ctx: Option<&Context<'_>>) -> Diagnostics {
        self.decode_into(content, ctx)
    }
}

/// Returns the implied schema of `T`, computed once per type.
#[must_use]
pub fn implied_body_schema<T: Decode + 'static>() -> BodySchema {
    static CACHE: OnceLock<Mutex<HashMap<TypeId, BodySchema>>> = OnceLock::new();
    let cache = CACHE.get_or_init(Mutex::default);
    let mut schemas = cache.lock().unwrap_or_else(PoisonError::into_inner);
    schemas
        .entry(TypeId::of::<T>())
        .or_insert_with(T::implied_schema)
        .clone()
}

/// Decodes a fresh `T` from `content`.
///
/// # Errors
///
/// Returns the accumulated diagnostics if any of them is an error.
pub fn decode_body<T: Decode>(
    content: &BodyContent,
    ctx: Option<&Context<'_>>,
) -> Result<T, Diagnostics> {
    T::decode_body(content, ctx)
}

/// Evaluates `expr` and converts the value into `T`.
///
/// # Errors
///
/// Returns a diagnostic if evaluation fails or the value has the wrong type.
pub fn decode_expression<T: DeserializeOwned>(
    expr: &Expression,
    ctx: Option<&Context<'_>>,
) -> Result<T, Diagnostics> {
    let empty = Context::new();
    let value = expr.evaluate(ctx.unwrap_or(&empty))?;
    hcl::from_value(value).map_err(|err| {
        Diagnostic::error("Incorrect attribute value type", err.to_string())
            .with_subject(expr.range().clone())
            .into()
    })
}

// Helpers called by the generated `Decode` impls.

#[doc(hidden)]
pub fn attribute<T: DeserializeOwned>(
    content: &BodyContent,
    name: &str,
    required: bool,
    ctx: Option<&Context<'_>>,
    diags: &mut Diagnostics,
) -> Option<T> {
    let expr = attribute_expression(content, name, required, diags)?;
    match decode_expression(&expr, ctx) {
        Ok(value) => Some(value),
        Err(errs) => {
            diags.extend(errs);
            None
        }
    }
}

#[doc(hidden)]
pub fn attribute_expression(
    content: &BodyContent,
    name: &str,
    required: bool,
    diags: &mut Diagnostics,
) -> Option<Expression> {
    match content.attributes.get(name) {
        Some(attr) => Some(attr.expr.clone()),
        None => {
            if required {
                diags.push(Diagnostic::error(
                    "Missing required argument",
                    format!("The argument \"{name}\" is required, but no definition was found."),
                ));
            }
            None
        }
    }
}

fn single<'a>(
    content: &'a BodyContent,
    block_type: &str,
    diags: &mut Diagnostics,
) -> Result<Option<&'a Block>, ()> {
    let mut matched = content.blocks.iter().filter(|b| b.block_type == block_type);
    let first = matched.next();
    if let (Some(first), Some(second)) = (first, matched.next()) {
        diags.push(
            Diagnostic::error(
                format!("Duplicate {block_type} block"),
                format!(
                    "Only one {block_type} block is allowed. Another was defined at {}.",
                    first.def_range
                ),
            )
            .with_subject(second.def_range.clone()),
        );
        return Err(());
    }
    Ok(first)
}

fn decode_block<T: Decode>(
    target: &mut T,
    block: &Block,
    ctx: Option<&Context<'_>>,
    diags: &mut Diagnostics,
) {
    diags.extend(target.decode_labels(block));
    // Body diagnostics without a location point at the enclosing block.
    let body = target.decode_into(&block.body, ctx);
    diags.extend(
        body.into_iter()
            .map(|diag| match diag.subject {
                Some(_) => diag,
                None => diag.with_subject(block.def_range.clone()),
            })
            .collect(),
    );
}

#[doc(hidden)]
pub fn required_block<T: Decode>(
    target: &mut T,
    content: &BodyContent,
    block_type: &str,
    ctx: Option<&Context<'_>>,
    diags: &mut Diagnostics,
) {
    match single(content, block_type, diags) {
        Ok(Some(block)) => decode_block(target, block, ctx, diags),
        Ok(None) => diags.push(Diagnostic::error(
            format!("Missing {block_type} block"),
            format!("A {block_type} block is required."),
        )),
        Err(()) => {}
    }
}

#[doc(hidden)]
pub fn optional_block<T: Decode>(
    target: &mut Option<T>,
    content: &BodyContent,
    block_type: &str,
    ctx: Option<&Context<'_>>,
    diags: &mut Diagnostics,
) {
    if let Ok(Some(block)) = single(content, block_type, diags) {
        let mut value = target.take().unwrap_or_default();
        decode_block(&mut value, block, ctx, diags);
        *target = Some(value);
    }
}

#[doc(hidden)]
pub fn block_list<T: Decode>(
    target: &mut Vec<T>,
    content: &BodyContent,
    block_type: &str,
    ctx: Option<&Context<'_>>,
    diags: &mut Diagnostics,
) {
    let blocks: Vec<&Block> = content.blocks_of_type(block_type).collect();
    let mut decoded = Vec::with_capacity(blocks.len());
    for block in blocks {
        let mut value = T::default();
        decode_block(&mut value, block, ctx, diags);
        decoded.push(value);
    }
    *target = decoded;
}

#[doc(hidden)]
pub fn check_labels(block: &Block, names: &[String]) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let block_type = &block.block_type;
    let count = names.len();
    let listed = names.join(", ");
    if block.labels.len() > count {
        let detail = if count == 0 {
            format!("No labels are expected for {block_type} blocks.")
        } else {
            format!("Only {count} labels ({listed}) are expected for {block_type} blocks.")
        };
        diags.push(
            Diagnostic::error(format!("Extraneous label for {block_type}"), detail)
                .with_subject(block.def_range.clone()),
        );
    } else if block.labels.len() < count {
        diags.push(
            Diagnostic::error(
                format!("Missing label for {block_type}"),
                format!("All {block_type} blocks must be have {count} labels ({listed})."),
            )
            .with_subject(block.def_range.clone()),
        );
    }
    diags
}
