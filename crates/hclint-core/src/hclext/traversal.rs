//! Variable traversals: `root.attr[index]...` accesses inside expressions.

use super::{Diagnostic, Diagnostics, Expression, Pos, Range};
use hcl::edit::expr::{Expression as EditExpression, ForExpr, TraversalOperator};
use hcl::edit::visit::{visit_expr, visit_traversal, visit_traversal_operator, Visit};
use hcl::edit::{Decorated, Ident, Span};
use serde::{Deserialize, Serialize};

/// One step after the root of a traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// `.name`
    Attr {
        /// Attribute name.
        name: String,
        /// Source range of the step.
        range: Range,
    },
    /// `[key]` or legacy `.0`
    Index {
        /// Whether the key is a literal.
        constant: bool,
        /// Source range of the step.
        range: Range,
    },
    /// `.*` or `[*]`
    Splat {
        /// Source range of the step.
        range: Range,
    },
}

impl Step {
    /// Source range of the step.
    #[must_use]
    pub fn range(&self) -> &Range {
        match self {
            Self::Attr { range, .. } | Self::Index { range, .. } | Self::Splat { range } => range,
        }
    }

    /// Attribute name if this is an attribute step.
    #[must_use]
    pub fn attr_name(&self) -> Option<&str> {
        match self {
            Self::Attr { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// A root variable followed by zero or more steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traversal {
    /// Root variable name.
    pub root: String,
    /// Range of the root name.
    pub root_range: Range,
    /// Steps after the root.
    pub steps: Vec<Step>,
}

impl Traversal {
    /// Root variable name.
    #[must_use]
    pub fn root_name(&self) -> &str {
        &self.root
    }

    /// Range covering the root and every step.
    #[must_use]
    pub fn range(&self) -> Range {
        match self.steps.last() {
            Some(last) => self.root_range.to(last.range()),
            None => self.root_range.clone(),
        }
    }
}

pub(crate) fn variables(handle: &Expression, parsed: &EditExpression) -> Vec<Traversal> {
    let mut collector = Collector {
        handle,
        scopes: Vec::new(),
        found: Vec::new(),
    };
    collector.visit_expr(parsed);
    collector.found
}

struct Collector<'a> {
    handle: &'a Expression,
    scopes: Vec<Vec<String>>,
    found: Vec<Traversal>,
}

impl Collector<'_> {
    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().flatten().any(|bound| bound == name)
    }
}

impl Visit for Collector<'_> {
    fn visit_expr(&mut self, node: &EditExpression) {
        match node {
            EditExpression::Variable(var) => {
                if !self.is_bound(var.as_str()) {
                    self.found.push(traversal_of(self.handle, var, &[]));
                }
            }
            EditExpression::Traversal(t) => {
                if let EditExpression::Variable(var) = &t.expr {
                    if !self.is_bound(var.as_str()) {
                        self.found.push(traversal_of(self.handle, var, &t.operators));
                    }
                    for op in &t.operators {
                        visit_traversal_operator(self, op);
                    }
                } else {
                    visit_traversal(self, t);
                }
            }
            _ => visit_expr(self, node),
        }
    }

    fn visit_for_expr(&mut self, node: &ForExpr) {
        self.visit_expr(&node.intro.collection_expr);
        let mut bound = vec![node.intro.value_var.as_str().to_string()];
        if let Some(key) = &node.intro.key_var {
            bound.push(key.as_str().to_string());
        }
        self.scopes.push(bound);
        if let Some(key_expr) = &node.key_expr {
            self.visit_expr(key_expr);
        }
        self.visit_expr(&node.value_expr);
        if let Some(cond) = &node.cond {
            self.visit_expr(&cond.expr);
        }
        self.scopes.pop();
    }
}

fn traversal_of(
    handle: &Expression,
    var: &Decorated<Ident>,
    ops: &[Decorated<TraversalOperator>],
) -> Traversal {
    let steps = ops
        .iter()
        .map(|op| {
            let range = handle.range_of(op.span().unwrap_or_default());
            match op.value() {
                TraversalOperator::GetAttr(ident) => Step::Attr {
                    name: ident.as_str().to_string(),
                    range,
                },
                TraversalOperator::Index(key) => Step::Index {
                    constant: matches!(key, EditExpression::Number(_) | EditExpression::String(_)),
                    range,
                },
                TraversalOperator::LegacyIndex(_) => Step::Index {
                    constant: true,
                    range,
                },
                TraversalOperator::AttrSplat(_) | TraversalOperator::FullSplat(_) => {
                    Step::Splat { range }
                }
            }
        })
        .collect();
    Traversal {
        root: var.as_str().to_string(),
        root_range: handle.range_of(var.span().unwrap_or_default()),
        steps,
    }
}

/// Interprets an expression as a single static traversal such as
/// `aws.west`.
///
/// # Errors
///
/// Returns an `Invalid expression` diagnostic for anything other than a
/// variable followed by attribute accesses and literal indexes.
pub fn abs_traversal_for_expr(expr: &Expression) -> Result<Traversal, Diagnostics> {
    let parsed = expr.parse()?;
    let traversal = match &parsed {
        EditExpression::Variable(var) => Some(traversal_of(expr, var, &[])),
        EditExpression::Traversal(t) => match &t.expr {
            EditExpression::Variable(var) => Some(traversal_of(expr, var, &t.operators)),
            _ => None,
        },
        _ => None,
    };
    match traversal {
        Some(t)
            if t.steps.iter().all(|step| {
                matches!(step, Step::Attr { .. } | Step::Index { constant: true, .. })
            }) =>
        {
            Ok(t)
        }
        _ => Err(Diagnostic::error(
            "Invalid expression",
            "A single static variable reference is required: only attribute access and indexing with constant keys. No calculations, function calls, template expressions, etc are allowed here.",
        )
        .with_subject(expr.range().clone())
        .into()),
    }
}

/// Unwraps a traversal written as a quoted string (`"aws.west"`).
///
/// The string content is re-read as a traversal starting one column past the
/// opening quote. Anything else, including strings that do not hold a
/// traversal, is returned unchanged.
#[must_use]
pub fn unwrap_string_traversal(expr: &Expression) -> Expression {
    let Ok(EditExpression::String(value)) = expr.parse() else {
        return expr.clone();
    };
    let outer = expr.range();
    let start = Pos::new(outer.start.line, outer.start.column + 1, outer.start.byte + 1);
    let end = start.advance(value.as_str());
    let shimmed = Expression::new(value.as_str(), Range::new(&outer.filename, start, end));
    match shimmed.parse() {
        Ok(EditExpression::Variable(_) | EditExpression::Traversal(_)) => shimmed,
        _ => expr.clone(),
    }
}
