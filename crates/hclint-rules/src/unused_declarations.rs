//! Rule reporting variables, locals and data sources that nothing refers to.
//!
//! # Detected Patterns
//!
//! - `variable` blocks never read as `var.<name>`
//! - `locals` entries never read as `local.<name>`
//! - `data` blocks (also those nested in `check` blocks) never read as
//!   `data.<type>.<name>`
//!
//! A variable referring to itself in its own `validation` block does not
//! count as a use.

use crate::reference_link;
use hclint_core::lang::{references_in_expr, Reference};
use hclint_core::{
    BlockSchema, BodySchema, GetModuleContentOption, Range, Rule, RuleError, RuleMeta, Runner,
    Severity,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Rule name for terraform-unused-declarations.
pub const NAME: &str = "terraform_unused_declarations";

/// Reports declarations that are never referenced.
#[derive(Debug, Clone, Default)]
pub struct TerraformUnusedDeclarations;

impl TerraformUnusedDeclarations {
    /// Creates the rule.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Default)]
struct Declarations {
    variables: BTreeMap<String, Range>,
    locals: BTreeMap<String, Range>,
    data: BTreeMap<(String, String), Range>,
    /// Ranges of `validation` attributes, by the variable they belong to.
    validations: Vec<(String, Range)>,
}

impl Declarations {
    fn is_self_reference(&self, variable: &str, range: &Range) -> bool {
        self.validations
            .iter()
            .any(|(name, validation)| name == variable && validation.overlaps(range))
    }
}

fn data_schema() -> BlockSchema {
    BlockSchema::new("data").labels(&["type", "name"])
}

fn schema() -> BodySchema {
    let validation = BlockSchema::new("validation").body(
        BodySchema::new()
            .attribute("condition")
            .attribute("error_message"),
    );
    BodySchema::new()
        .block(
            BlockSchema::new("variable")
                .labels(&["name"])
                .body(BodySchema::new().block(validation)),
        )
        .block(BlockSchema::new("locals").body(BodySchema::just_attributes()))
        .block(data_schema())
        .block(
            BlockSchema::new("check")
                .labels(&["name"])
                .body(BodySchema::new().block(data_schema())),
        )
}

fn declarations(runner: &dyn Runner) -> Result<Declarations, RuleError> {
    let content = runner.get_module_content(&schema(), &GetModuleContentOption::literal())?;
    let mut decl = Declarations::default();
    let mut add_data = |block: &hclint_core::Block| {
        if let [type_name, name] = block.labels.as_slice() {
            decl.data
                .entry((type_name.clone(), name.clone()))
                .or_insert_with(|| block.def_range.clone());
        }
    };

    for block in &content.blocks {
        match block.block_type.as_str() {
            "data" => add_data(block),
            "check" => block.body.blocks_of_type("data").for_each(&mut add_data),
            _ => {}
        }
    }

    for block in &content.blocks {
        match block.block_type.as_str() {
            "variable" => {
                let name = block.labels[0].clone();
                for validation in block.body.blocks_of_type("validation") {
                    for attr in validation.body.attributes.values() {
                        decl.validations.push((name.clone(), attr.range.clone()));
                    }
                }
                decl.variables.insert(name, block.def_range.clone());
            }
            "locals" => {
                for attr in block.body.attributes.values() {
                    decl.locals.insert(attr.name.clone(), attr.range.clone());
                }
            }
            _ => {}
        }
    }
    Ok(decl)
}

impl Rule for TerraformUnusedDeclarations {
    fn name(&self) -> &str {
        NAME
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn link(&self) -> Option<String> {
        Some(reference_link(NAME))
    }

    fn check(&self, runner: &dyn Runner) -> Result<(), RuleError> {
        if !runner.is_root()? {
            debug!(rule = NAME, "Skipping child module");
            return Ok(());
        }

        let mut decl = declarations(runner)?;
        let mut used_variables = Vec::new();
        let mut used_locals = Vec::new();
        let mut used_data = Vec::new();

        runner.walk_expressions(&mut |expr| {
            for reference in references_in_expr(expr) {
                match reference {
                    Reference::InputVariable { name } => {
                        if !decl.is_self_reference(&name, expr.range()) {
                            used_variables.push(name);
                        }
                    }
                    Reference::LocalValue { name } => used_locals.push(name),
                    Reference::DataResource { type_name, name } => {
                        used_data.push((type_name, name));
                    }
                    Reference::TerraformAttr { .. } => {}
                }
            }
            Ok(())
        })?;

        for name in &used_variables {
            decl.variables.remove(name);
        }
        for name in &used_locals {
            decl.locals.remove(name);
        }
        for key in &used_data {
            decl.data.remove(key);
        }

        let meta = RuleMeta::of(self);
        for (name, range) in &decl.variables {
            runner.emit_issue(
                &meta,
                &format!("variable \"{name}\" is declared but not used"),
                range,
            )?;
        }
        for ((type_name, name), range) in &decl.data {
            runner.emit_issue(
                &meta,
                &format!("data \"{type_name}\" \"{name}\" is declared but not used"),
                range,
            )?;
        }
        for (name, range) in &decl.locals {
            runner.emit_issue(&meta, &format!("local.{name} is declared but not used"), range)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::child_runner;
    use hclint_core::helper::{assert_issues, test_runner};

    fn check(source: &str) -> Vec<hclint_core::Issue> {
        let runner = test_runner(&[("main.tf", source)]).unwrap();
        TerraformUnusedDeclarations::new().check(&runner).unwrap();
        runner.issues()
    }

    // --- variable tests ---

    #[test]
    fn test_unused_variable() {
        let issues = check("variable \"not_used\" {}\n\nvariable \"used\" {}\n\noutput \"u\" {\n  value = var.used\n}\n");
        assert_issues(
            &issues,
            &[(
                NAME,
                "variable \"not_used\" is declared but not used",
                "main.tf:1,1-20",
            )],
        );
    }

    #[test]
    fn test_variable_used_in_nested_block() {
        let source = r#"
variable "cidr" {}

resource "aws_security_group" "sg" {
  ingress {
    cidr_blocks = [var.cidr]
  }
}
"#;
        assert!(check(source).is_empty());
    }

    #[test]
    fn test_validation_self_reference_is_not_a_use() {
        let source = r#"
variable "size" {
  validation {
    condition     = var.size > 0
    error_message = "size must be positive, got ${var.size}"
  }
}

variable "min" {}

variable "max" {
  validation {
    condition     = var.max > var.min
    error_message = "max must exceed min"
  }
}

output "max" {
  value = var.max
}
"#;
        assert_issues(
            &check(source),
            &[(
                NAME,
                "variable \"size\" is declared but not used",
                "main.tf:2,1-16",
            )],
        );
    }

    // --- locals and data tests ---

    #[test]
    fn test_unused_local() {
        let source = r#"
locals {
  used     = "a"
  not_used = "b"
  derived  = "${local.used}-x"
}

output "o" {
  value = local.derived
}
"#;
        assert_issues(
            &check(source),
            &[(
                NAME,
                "local.not_used is declared but not used",
                "main.tf:4,3-17",
            )],
        );
    }

    #[test]
    fn test_unused_data_sources() {
        let source = r#"
data "aws_ami" "used" {}

data "aws_ami" "unused" {}

data "aws_region" "never" {
  count = 0
}

resource "aws_instance" "web" {
  ami = data.aws_ami.used.id
}
"#;
        assert_issues(
            &check(source),
            &[
                (
                    NAME,
                    "data \"aws_ami\" \"unused\" is declared but not used",
                    "main.tf:4,1-24",
                ),
                (
                    NAME,
                    "data \"aws_region\" \"never\" is declared but not used",
                    "main.tf:6,1-26",
                ),
            ],
        );
    }

    #[test]
    fn test_check_scoped_data() {
        let source = r#"
check "health" {
  data "http" "site" {
    url = "https://example.com"
  }

  assert {
    condition     = data.http.site.status_code == 200
    error_message = "down"
  }
}

check "other" {
  data "http" "unused" {
    url = "https://example.org"
  }
}
"#;
        assert_issues(
            &check(source),
            &[(
                NAME,
                "data \"http\" \"unused\" is declared but not used",
                "main.tf:14,3-23",
            )],
        );
    }

    // --- module tests ---

    #[test]
    fn test_child_module_is_skipped() {
        let runner = child_runner("variable \"unused\" {}\n");
        TerraformUnusedDeclarations::new().check(&runner).unwrap();
        assert!(runner.issues().is_empty());
    }

    #[test]
    fn test_references_across_files() {
        let runner = test_runner(&[
            ("variables.tf", "variable \"region\" {}\n"),
            ("main.tf", "provider \"aws\" {\n  region = var.region\n}\n"),
        ])
        .unwrap();
        TerraformUnusedDeclarations::new().check(&runner).unwrap();
        assert!(runner.issues().is_empty());
    }
}
