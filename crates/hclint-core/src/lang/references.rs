//! Classification of variable traversals into references.

use crate::hclext::{Diagnostic, Diagnostics, Expression, Range, Step, Traversal};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A classified reference to something declared in a module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Reference {
    /// `var.<name>`
    InputVariable {
        /// Variable name.
        name: String,
    },
    /// `local.<name>`
    LocalValue {
        /// Local value name.
        name: String,
    },
    /// `data.<type>.<name>`
    DataResource {
        /// Data source type.
        type_name: String,
        /// Data source name.
        name: String,
    },
    /// `terraform.<name>`
    TerraformAttr {
        /// Attribute name, e.g. `workspace`.
        name: String,
    },
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputVariable { name } => write!(f, "var.{name}"),
            Self::LocalValue { name } => write!(f, "local.{name}"),
            Self::DataResource { type_name, name } => write!(f, "data.{type_name}.{name}"),
            Self::TerraformAttr { name } => write!(f, "terraform.{name}"),
        }
    }
}

/// Classifies one traversal.
///
/// Returns `Ok(None)` for roots that are not references (resources,
/// `count`, `each`, `path`, `module` and so on).
///
/// # Errors
///
/// Returns an `Invalid reference` diagnostic when a recognized root is not
/// followed by the attribute steps it needs.
pub fn parse_ref(traversal: &Traversal) -> Result<Option<Reference>, Diagnostics> {
    match traversal.root_name() {
        "var" => single_attr(traversal).map(|name| Some(Reference::InputVariable { name })),
        "local" => single_attr(traversal).map(|name| Some(Reference::LocalValue { name })),
        "terraform" => single_attr(traversal).map(|name| Some(Reference::TerraformAttr { name })),
        "data" => data_ref(traversal).map(Some),
        _ => Ok(None),
    }
}

/// Returns every valid reference in an expression. Invalid references are
/// skipped.
#[must_use]
pub fn references_in_expr(expr: &Expression) -> Vec<Reference> {
    expr.variables()
        .iter()
        .filter_map(|traversal| parse_ref(traversal).ok().flatten())
        .collect()
}

/// Like [`references_in_expr`], also returning the range of each traversal.
#[must_use]
pub fn references_with_ranges(expr: &Expression) -> Vec<(Reference, Range)> {
    expr.variables()
        .iter()
        .filter_map(|traversal| {
            let reference = parse_ref(traversal).ok().flatten()?;
            Some((reference, traversal.range()))
        })
        .collect()
}

fn invalid(detail: String, subject: Range) -> Diagnostics {
    Diagnostic::error("Invalid reference", detail)
        .with_subject(subject)
        .into()
}

fn single_attr(traversal: &Traversal) -> Result<String, Diagnostics> {
    let root = traversal.root_name();
    match traversal.steps.first() {
        None => Err(invalid(
            format!(
                "The \"{root}\" object cannot be accessed directly. Instead, access one of its attributes."
            ),
            traversal.root_range.clone(),
        )),
        Some(Step::Attr { name, .. }) => Ok(name.clone()),
        Some(step) => Err(invalid(
            format!("The \"{root}\" object does not support this operation."),
            step.range().clone(),
        )),
    }
}

fn data_ref(traversal: &Traversal) -> Result<Reference, Diagnostics> {
    let (type_step, name_step) = match traversal.steps.as_slice() {
        [type_step, name_step, ..] => (type_step, name_step),
        _ => {
            return Err(invalid(
                "The \"data\" object must be followed by two attribute names: the data source type and the resource name.".to_string(),
                traversal.range(),
            ));
        }
    };
    let Some(type_name) = type_step.attr_name() else {
        return Err(invalid(
            "The \"data\" object does not support this operation.".to_string(),
            type_step.range().clone(),
        ));
    };
    let Some(name) = name_step.attr_name() else {
        return Err(invalid(
            "A reference to a data source must be followed by at least one attribute access, specifying the resource name.".to_string(),
            name_step.range().clone(),
        ));
    };
    Ok(Reference::DataResource {
        type_name: type_name.to_string(),
        name: name.to_string(),
    })
}
