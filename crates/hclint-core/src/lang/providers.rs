//! Resolution of the provider each block uses.

use crate::hclext::traversal::{abs_traversal_for_expr, unwrap_string_traversal};
use crate::hclext::{BlockSchema, BodySchema, Diagnostics, Expression, Range};
use crate::runner::{GetModuleContentOption, Runner, RunnerError};
use hcl::edit::expr::Expression as EditExpression;
use hcl::edit::Span;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The provider a block refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRef {
    /// Local provider name, e.g. `aws` for `aws.west`.
    pub name: String,
    /// Where the reference was made.
    pub def_range: Range,
}

/// Reads a `provider = aws.west` (or legacy `provider = "aws.west"`)
/// expression.
///
/// # Errors
///
/// Returns a diagnostic if the expression is not a static reference.
pub fn decode_provider_ref(expr: &Expression, def_range: &Range) -> Result<ProviderRef, Diagnostics> {
    let traversal = abs_traversal_for_expr(&unwrap_string_traversal(expr))?;
    Ok(ProviderRef {
        name: traversal.root_name().to_string(),
        def_range: def_range.clone(),
    })
}

fn schema() -> BodySchema {
    let provider_attr = BodySchema::new().attribute("provider");
    BodySchema::new()
        .block(
            BlockSchema::new("resource")
                .labels(&["type", "name"])
                .body(provider_attr.clone()),
        )
        .block(
            BlockSchema::new("data")
                .labels(&["type", "name"])
                .body(provider_attr),
        )
        .block(BlockSchema::new("provider").labels(&["name"]))
        .block(
            BlockSchema::new("module")
                .labels(&["name"])
                .body(BodySchema::new().attribute("providers")),
        )
}

/// Returns every provider used by the module's resources, data sources,
/// provider configurations and module calls, by name. When a provider is
/// referenced more than once, the first reference is kept.
///
/// Resources without a `provider` argument use the prefix of their type up
/// to the first underscore.
///
/// # Errors
///
/// Returns an error if a `provider` argument or a `providers` map is not
/// made of static references.
pub fn get_provider_refs(runner: &dyn Runner) -> Result<BTreeMap<String, ProviderRef>, RunnerError> {
    let content = runner.get_module_content(&schema(), &GetModuleContentOption::literal())?;
    let mut refs = BTreeMap::new();
    let mut add = |provider: ProviderRef| {
        refs.entry(provider.name.clone()).or_insert(provider);
    };

    for block in &content.blocks {
        match block.block_type.as_str() {
            "resource" | "data" => {
                if let Some(attr) = block.body.attribute("provider") {
                    add(decode_provider_ref(&attr.expr, &block.def_range)?);
                } else {
                    let resource_type = block.labels.first().map_or("", String::as_str);
                    let name = resource_type.split('_').next().unwrap_or(resource_type);
                    add(ProviderRef {
                        name: name.to_string(),
                        def_range: block.def_range.clone(),
                    });
                }
            }
            "provider" => {
                if let Some(name) = block.labels.first() {
                    add(ProviderRef {
                        name: name.clone(),
                        def_range: block.def_range.clone(),
                    });
                }
            }
            "module" => {
                let Some(attr) = block.body.attribute("providers") else {
                    continue;
                };
                let EditExpression::Object(object) = attr.expr.parse()? else {
                    continue;
                };
                for (_, value) in object.iter() {
                    let span = value.expr().span().unwrap_or_default();
                    add(decode_provider_ref(&attr.expr.slice(span), &block.def_range)?);
                }
            }
            _ => {}
        }
    }
    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::test_runner;

    fn names(source: &str) -> Vec<String> {
        let runner = test_runner(&[("main.tf", source)]).unwrap();
        get_provider_refs(&runner).unwrap().into_keys().collect()
    }

    #[test]
    fn test_implicit_provider() {
        assert_eq!(
            names("resource \"aws_instance\" \"a\" {}\ndata \"google_project\" \"p\" {}\n"),
            vec!["aws", "google"]
        );
    }

    #[test]
    fn test_explicit_provider() {
        let source = r#"
resource "aws_instance" "a" {
  provider = aws.west
}

resource "null_resource" "b" {
  provider = "custom-null.alias"
}
"#;
        assert_eq!(names(source), vec!["aws", "custom-null"]);
    }

    #[test]
    fn test_module_providers_are_deduplicated() {
        let source = r#"
module "m" {
  source = "./m"
  providers = {
    null = custom-null
  }
}

resource "null_resource" "n" {
  provider = custom-null
}
"#;
        let runner = test_runner(&[("main.tf", source)]).unwrap();
        let refs = get_provider_refs(&runner).unwrap();
        assert_eq!(refs.len(), 1);
        let provider = &refs["custom-null"];
        assert_eq!(provider.def_range.to_string(), "main.tf:2,1-11");
    }

    #[test]
    fn test_provider_blocks_and_not_created_resources() {
        let source = r#"
provider "azurerm" {
  features {}
}

resource "random_id" "never" {
  count = 0
}
"#;
        assert_eq!(names(source), vec!["azurerm", "random"]);
    }

    #[test]
    fn test_invalid_provider_reference() {
        let runner = test_runner(&[(
            "main.tf",
            "resource \"aws_instance\" \"a\" {\n  provider = lookup(var.p)\n}\n",
        )])
        .unwrap();
        let err = get_provider_refs(&runner).unwrap_err();
        assert!(err.to_string().contains("A single static variable reference is required"));
    }
}
