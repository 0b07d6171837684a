//! Unevaluated expression handles.

use super::traversal::{self, Traversal};
use super::{Diagnostic, Diagnostics, Pos, Range, SourceFile};
use hcl::edit::expr::Expression as EditExpression;
use hcl::eval::{Context, Evaluate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An expression as written in the source: its text plus where it came from.
///
/// Holding text rather than a parsed tree keeps the handle serializable; it
/// is re-parsed whenever it is inspected or evaluated. Expressions of an
/// expanded block instance also carry that instance's `count` or `each`
/// value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expression {
    source: String,
    range: Range,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    bindings: BTreeMap<String, hcl::Value>,
}

impl Expression {
    /// Creates a handle from expression text and its absolute range.
    #[must_use]
    pub fn new(source: impl Into<String>, range: Range) -> Self {
        Self {
            source: source.into(),
            range,
            bindings: BTreeMap::new(),
        }
    }

    /// Creates a handle for a byte span of a file.
    #[must_use]
    pub fn from_span(file: &SourceFile, span: std::ops::Range<usize>) -> Self {
        Self::new(file.slice(span.clone()), file.range_of(span))
    }

    /// The expression text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The absolute range of the expression.
    #[must_use]
    pub fn range(&self) -> &Range {
        &self.range
    }

    /// Values bound to root names, declared on top of the evaluation context.
    #[must_use]
    pub fn bindings(&self) -> &BTreeMap<String, hcl::Value> {
        &self.bindings
    }

    /// Binds `name` to `value` for every evaluation of this expression.
    pub fn bind(&mut self, name: impl Into<String>, value: hcl::Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Parses the expression.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic if the text is not a valid expression.
    pub fn parse(&self) -> Result<EditExpression, Diagnostics> {
        hcl::edit::parser::parse_expr(&self.source).map_err(|err| {
            let offset = err.location().offset();
            let subject = self.range_of(offset..offset + 1);
            Diagnostic::error("Invalid expression", err.message())
                .with_subject(subject)
                .into()
        })
    }

    /// Returns true if the expression is the literal `null`.
    #[must_use]
    pub fn is_null_literal(&self) -> bool {
        matches!(self.parse(), Ok(EditExpression::Null(_)))
    }

    /// Evaluates the expression.
    ///
    /// # Errors
    ///
    /// Returns a diagnostic if the expression does not parse or cannot be
    /// evaluated in `ctx`.
    pub fn evaluate(&self, ctx: &Context<'_>) -> Result<hcl::Value, Diagnostics> {
        let parsed = hcl::Expression::from(self.parse()?);
        let result = if self.bindings.is_empty() {
            parsed.evaluate(ctx)
        } else {
            let mut bound = ctx.clone();
            for (name, value) in &self.bindings {
                bound.declare_var(name.clone(), value.clone());
            }
            parsed.evaluate(&bound)
        };
        result.map_err(|err| {
            Diagnostic::error("Failed to evaluate expression", err.to_string())
                .with_subject(self.range.clone())
                .into()
        })
    }

    /// Returns every variable traversal in the expression, with absolute
    /// ranges. Iterator names bound by `for` expressions are excluded.
    /// An unparseable expression has no variables.
    #[must_use]
    pub fn variables(&self) -> Vec<Traversal> {
        self.parse()
            .map(|parsed| traversal::variables(self, &parsed))
            .unwrap_or_default()
    }

    /// Converts a byte span relative to the expression text into an absolute
    /// range.
    #[must_use]
    pub fn range_of(&self, span: std::ops::Range<usize>) -> Range {
        let start = self.pos_at(span.start);
        let end = self.pos_at(span.end);
        Range::new(&self.range.filename, start, end)
    }

    /// Returns a handle for a sub-expression at a relative byte span.
    #[must_use]
    pub fn slice(&self, span: std::ops::Range<usize>) -> Self {
        let text = self.source.get(span.clone()).unwrap_or_default();
        Self::new(text, self.range_of(span))
    }

    fn pos_at(&self, offset: usize) -> Pos {
        let offset = offset.min(self.source.len());
        let prefix = self.source.get(..offset).unwrap_or_default();
        self.range.start.advance(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(source: &str) -> Expression {
        let file = SourceFile::new("main.tf", format!("value = {source}\n"));
        Expression::from_span(&file, 8..8 + source.len())
    }

    #[test]
    fn test_range_of_is_absolute() {
        let e = expr("var.x");
        assert_eq!(e.range().start, Pos::new(1, 9, 8));
        let inner = e.range_of(4..5);
        assert_eq!(inner.start, Pos::new(1, 13, 12));
        assert_eq!(inner.end, Pos::new(1, 14, 13));
    }

    #[test]
    fn test_is_null_literal() {
        assert!(expr("null").is_null_literal());
        assert!(!expr("\"null\"").is_null_literal());
        assert!(!expr("var.x").is_null_literal());
    }

    #[test]
    fn test_evaluate() {
        let mut ctx = Context::new();
        ctx.declare_var("name", "world");
        let value = expr("\"hello ${name}\"").evaluate(&ctx).unwrap();
        assert_eq!(value, hcl::Value::from("hello world"));
    }

    #[test]
    fn test_evaluate_unknown_variable() {
        let diags = expr("var.x").evaluate(&Context::new()).unwrap_err();
        assert_eq!(
            diags.iter().next().unwrap().summary,
            "Failed to evaluate expression"
        );
    }

    #[test]
    fn test_evaluate_with_bindings() {
        let mut e = expr("\"web-${count.index}\"");
        let mut count = hcl::Map::new();
        count.insert("index".to_string(), hcl::Value::from(1));
        e.bind("count", hcl::Value::Object(count));
        assert_eq!(e.evaluate(&Context::new()).unwrap(), hcl::Value::from("web-1"));
        assert!(expr("\"web-${count.index}\"").evaluate(&Context::new()).is_err());
    }

    #[test]
    fn test_slice() {
        let e = expr("{ a = local.b }");
        let sub = e.slice(6..13);
        assert_eq!(sub.source(), "local.b");
        assert_eq!(sub.range().start.column, 15);
    }
}
