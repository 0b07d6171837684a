//! `count` / `for_each` expansion of resource, data and module blocks.

use super::eval::EvalScope;
use crate::hclext::{BodyContent, BodySchema, Expression, SourceFile};
use hcl::edit::structure::{Block, Body};
use hcl::edit::Span;
use hcl::{Map, Value};

const EXPANDABLE: &[&str] = &["resource", "data", "module"];

/// How many instances of a block will exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instances {
    /// Statically known number of instances.
    Known(usize),
    /// The meta-argument could not be evaluated.
    Unknown,
}

impl Instances {
    /// Returns true if at least one instance will exist.
    #[must_use]
    pub fn is_created(self) -> bool {
        matches!(self, Self::Known(n) if n > 0)
    }
}

/// Identifies one instance of an expanded block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceKey {
    /// The block has neither `count` nor `for_each`.
    NoKey,
    /// `count.index` of a counted instance.
    Index(usize),
    /// `each.key` and `each.value` of a `for_each` instance.
    Each {
        /// Map key, or the element itself for sets.
        key: Value,
        /// Map value, or the element itself for sets.
        value: Value,
    },
}

impl InstanceKey {
    /// The root name and object this key declares, if any.
    #[must_use]
    pub fn binding(&self) -> Option<(&'static str, Value)> {
        let mut object = Map::new();
        let name = match self {
            Self::NoKey => return None,
            Self::Index(index) => {
                object.insert("index".to_string(), Value::from(*index));
                "count"
            }
            Self::Each { key, value } => {
                object.insert("key".to_string(), key.clone());
                object.insert("value".to_string(), value.clone());
                "each"
            }
        };
        Some((name, Value::Object(object)))
    }
}

/// Evaluates the `count` or `for_each` meta-argument of a block.
#[must_use]
pub fn instances(block: &Block, file: &SourceFile, scope: &EvalScope) -> Instances {
    instance_keys(block, file, scope).map_or(Instances::Unknown, |keys| Instances::Known(keys.len()))
}

/// Keys of every instance of a block, or `None` if the meta-argument is
/// not statically known.
fn instance_keys(block: &Block, file: &SourceFile, scope: &EvalScope) -> Option<Vec<InstanceKey>> {
    if let Some(count) = block.body.get_attribute("count") {
        let expr = Expression::from_span(file, count.value.span().unwrap_or_default());
        return match scope.evaluate(&expr) {
            Ok(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(|n| (0..n).map(InstanceKey::Index).collect()),
            Ok(Value::Null) => Some(vec![InstanceKey::NoKey]),
            _ => None,
        };
    }
    if let Some(for_each) = block.body.get_attribute("for_each") {
        let expr = Expression::from_span(file, for_each.value.span().unwrap_or_default());
        return match scope.evaluate(&expr) {
            Ok(Value::Array(items)) => Some(
                items
                    .into_iter()
                    .map(|item| InstanceKey::Each {
                        key: item.clone(),
                        value: item,
                    })
                    .collect(),
            ),
            Ok(Value::Object(items)) => Some(
                items
                    .into_iter()
                    .map(|(key, value)| InstanceKey::Each {
                        key: Value::from(key),
                        value,
                    })
                    .collect(),
            ),
            Ok(Value::Null) => Some(Vec::new()),
            _ => None,
        };
    }
    Some(vec![InstanceKey::NoKey])
}

/// A body whose expandable blocks appear once per instance.
#[derive(Debug, Clone)]
pub struct ExpandedBody {
    /// The expanded body.
    pub body: Body,
    /// Instance of each top-level block of `body`, in order.
    keys: Vec<InstanceKey>,
}

impl ExpandedBody {
    /// Binds `count` or `each` into the expressions of blocks extracted
    /// from this body with `schema`, so each copy evaluates as its own
    /// instance.
    pub fn bind_instances(&self, content: &mut BodyContent, schema: &BodySchema) {
        let keys = self
            .body
            .blocks()
            .zip(&self.keys)
            .filter(|(block, _)| schema.find_block(block.ident.as_str()).is_some())
            .map(|(_, key)| key);
        for (block, key) in content.blocks.iter_mut().zip(keys) {
            if let Some((name, value)) = key.binding() {
                bind_content(&mut block.body, name, &value);
            }
        }
    }
}

fn bind_content(content: &mut BodyContent, name: &str, value: &Value) {
    for attr in content.attributes.values_mut() {
        attr.expr.bind(name, value.clone());
    }
    for block in &mut content.blocks {
        bind_content(&mut block.body, name, value);
    }
}

/// Returns a copy of `body` where each expandable top-level block appears
/// once per instance. Blocks that will not be created are dropped unless
/// `include_not_created` is set, in which case they are kept once, unkeyed.
#[must_use]
pub fn expand_body(
    body: &Body,
    file: &SourceFile,
    scope: &EvalScope,
    include_not_created: bool,
) -> ExpandedBody {
    let mut expanded = ExpandedBody {
        body: Body::new(),
        keys: Vec::new(),
    };
    for structure in body.iter() {
        let Some(block) = structure.as_block() else {
            expanded.body.push(structure.clone());
            continue;
        };
        let keys = if EXPANDABLE.contains(&block.ident.as_str()) {
            match instance_keys(block, file, scope) {
                Some(keys) if !keys.is_empty() => keys,
                _ if include_not_created => vec![InstanceKey::NoKey],
                _ => Vec::new(),
            }
        } else {
            vec![InstanceKey::NoKey]
        };
        for key in keys {
            expanded.body.push(structure.clone());
            expanded.keys.push(key);
        }
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hclext::{partial_content, BlockSchema};
    use crate::module::{Module, ModulePath};
    use crate::runner::eval::EvalPaths;

    const SOURCE: &str = r#"
variable "enabled" {
  default = false
}

resource "a" "twice" {
  count = 2
  name  = "web-${count.index}"
}

resource "a" "never" {
  count = var.enabled ? 1 : 0
}

resource "a" "unknown" {
  for_each = aws_instance.web
}

resource "a" "each" {
  for_each = { x = 1, y = 2, z = 3 }
  name     = "${each.key}=${each.value}"
}

output "kept" {
  value = 1
}
"#;

    fn setup() -> (Module, EvalScope) {
        let module = Module::from_sources(ModulePath::root(), ".", [("main.tf", SOURCE)]).unwrap();
        let scope = EvalScope::new(&module, EvalPaths::default());
        (module, scope)
    }

    fn names(body: &Body) -> Vec<String> {
        body.blocks()
            .map(|b| b.labels.last().map(|l| l.as_str().to_string()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_expand_body() {
        let (module, scope) = setup();
        let parsed = &module.files[0];
        let expanded = expand_body(&parsed.body, &parsed.file, &scope, false);
        assert_eq!(
            names(&expanded.body),
            vec!["enabled", "twice", "twice", "each", "each", "each", "kept"]
        );
    }

    #[test]
    fn test_expand_body_include_not_created() {
        let (module, scope) = setup();
        let parsed = &module.files[0];
        let expanded = expand_body(&parsed.body, &parsed.file, &scope, true);
        assert_eq!(
            names(&expanded.body),
            vec!["enabled", "twice", "twice", "never", "unknown", "each", "each", "each", "kept"]
        );
    }

    #[test]
    fn test_bind_instances() {
        let (module, scope) = setup();
        let parsed = &module.files[0];
        let expanded = expand_body(&parsed.body, &parsed.file, &scope, true);
        let schema = BodySchema::new().block(
            BlockSchema::new("resource")
                .labels(&["type", "name"])
                .body(BodySchema::new().attribute("name")),
        );
        let mut content = partial_content(&expanded.body, &parsed.file, &schema).unwrap();
        expanded.bind_instances(&mut content, &schema);

        let values: Vec<_> = content
            .blocks
            .iter()
            .filter_map(|b| b.body.attribute("name"))
            .map(|attr| scope.evaluate(&attr.expr).unwrap())
            .collect();
        assert_eq!(
            values,
            vec![
                Value::from("web-0"),
                Value::from("web-1"),
                Value::from("x=1"),
                Value::from("y=2"),
                Value::from("z=3"),
            ]
        );
    }

    #[test]
    fn test_unbound_count_is_unknown() {
        let (module, scope) = setup();
        let parsed = &module.files[0];
        let schema = BodySchema::new().block(
            BlockSchema::new("resource")
                .labels(&["type", "name"])
                .body(BodySchema::new().attribute("name")),
        );
        let content = partial_content(&parsed.body, &parsed.file, &schema).unwrap();
        let name = content.blocks[0].body.attribute("name").unwrap();
        assert!(scope.evaluate(&name.expr).is_err());
    }

    #[test]
    fn test_instance_key_binding() {
        assert_eq!(InstanceKey::NoKey.binding(), None);
        let (name, value) = InstanceKey::Index(3).binding().unwrap();
        assert_eq!(name, "count");
        let Value::Object(object) = value else {
            panic!("expected object");
        };
        assert_eq!(object["index"], Value::from(3));
    }
}
