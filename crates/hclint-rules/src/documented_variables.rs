//! Rule requiring a description on every variable.
//!
//! # Configuration
//!
//! ```hcl
//! rule "terraform_documented_variables" {
//!   enabled = true
//!   exclude = ["internal_only"]
//! }
//! ```

use crate::reference_link;
use hclint_core::hclext::decode_expression;
use hclint_core::{
    BlockSchema, BodySchema, Decode, GetModuleContentOption, Rule, RuleError, RuleMeta, Runner,
    Severity,
};
use tracing::debug;

/// Rule name for terraform-documented-variables.
pub const NAME: &str = "terraform_documented_variables";

/// Settings read from the rule's block.
#[derive(Debug, Clone, Default, Decode)]
pub struct DocumentedVariablesConfig {
    /// Variables that need no description.
    #[hcl(attr = "exclude", optional)]
    pub exclude: Vec<String>,
}

/// Reports variables without a non-empty `description`.
#[derive(Debug, Clone, Default)]
pub struct TerraformDocumentedVariables;

impl TerraformDocumentedVariables {
    /// Creates the rule.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Rule for TerraformDocumentedVariables {
    fn name(&self) -> &str {
        NAME
    }

    fn enabled(&self) -> bool {
        false
    }

    fn severity(&self) -> Severity {
        Severity::Notice
    }

    fn link(&self) -> Option<String> {
        Some(reference_link(NAME))
    }

    fn check(&self, runner: &dyn Runner) -> Result<(), RuleError> {
        if !runner.is_root()? {
            debug!(rule = NAME, "Skipping child module");
            return Ok(());
        }

        let mut config = DocumentedVariablesConfig::default();
        runner.decode_rule_config(NAME, &mut config)?;

        let schema = BodySchema::new().block(
            BlockSchema::new("variable")
                .labels(&["name"])
                .body(BodySchema::new().attribute("description")),
        );
        let content = runner.get_module_content(&schema, &GetModuleContentOption::default())?;

        for variable in &content.blocks {
            let name = &variable.labels[0];
            if config.exclude.contains(name) {
                continue;
            }
            let documented = match variable.body.attribute("description") {
                Some(attr) => !decode_expression::<String>(&attr.expr, None)?.is_empty(),
                None => false,
            };
            if !documented {
                runner.emit_issue(
                    &RuleMeta::of(self),
                    &format!("`{name}` variable has no description"),
                    &variable.def_range,
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::child_runner;
    use hclint_core::helper::{assert_issues, test_runner, test_runner_with_config};
    use hclint_core::Config;

    const SOURCE: &str = r#"
variable "no_description" {
  default = "default"
}

variable "empty_description" {
  description = ""
}

variable "description" {
  description = "This is description"
}

variable "internal" {}
"#;

    #[test]
    fn test_missing_and_empty_descriptions() {
        let runner = test_runner(&[("variables.tf", SOURCE)]).unwrap();
        TerraformDocumentedVariables::new().check(&runner).unwrap();
        assert_issues(
            &runner.issues(),
            &[
                (NAME, "`no_description` variable has no description", "variables.tf:2,1-26"),
                (
                    NAME,
                    "`empty_description` variable has no description",
                    "variables.tf:6,1-29",
                ),
                (NAME, "`internal` variable has no description", "variables.tf:14,1-20"),
            ],
        );
    }

    #[test]
    fn test_exclude() {
        let config = Config::parse(
            ".hclint.hcl",
            "rule \"terraform_documented_variables\" {\n  enabled = true\n  exclude = [\"internal\", \"no_description\"]\n}\n",
        )
        .unwrap();
        let runner = test_runner_with_config(&[("variables.tf", SOURCE)], config).unwrap();
        TerraformDocumentedVariables::new().check(&runner).unwrap();
        let messages: Vec<_> = runner.issues().into_iter().map(|i| i.message).collect();
        assert_eq!(messages, vec!["`empty_description` variable has no description"]);
    }

    #[test]
    fn test_invalid_exclude() {
        let config = Config::parse(
            ".hclint.hcl",
            "rule \"terraform_documented_variables\" {\n  enabled = true\n  exclude = \"internal\"\n}\n",
        )
        .unwrap();
        let runner = test_runner_with_config(&[("variables.tf", SOURCE)], config).unwrap();
        let err = TerraformDocumentedVariables::new().check(&runner).unwrap_err();
        assert!(err.to_string().contains("Incorrect attribute value type"));
    }

    #[test]
    fn test_child_module_is_skipped() {
        let runner = child_runner("variable \"undocumented\" {}\n");
        TerraformDocumentedVariables::new().check(&runner).unwrap();
        assert!(runner.issues().is_empty());
    }
}
