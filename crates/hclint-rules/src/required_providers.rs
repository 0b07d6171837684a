//! Rule requiring a version constraint for every provider the module uses.
//!
//! # Detected Patterns
//!
//! - A provider used by a resource, data source, provider block or module
//!   call with no `required_providers` entry
//! - A `required_providers` entry with neither a `version` nor a legacy
//!   version string
//! - A `version` argument in a `provider` block
//!
//! # Good Patterns
//!
//! ```hcl
//! terraform {
//!   required_providers {
//!     aws = {
//!       source  = "hashicorp/aws"
//!       version = "~> 5.0"
//!     }
//!   }
//! }
//! ```

use crate::reference_link;
use hclint_core::hcl::edit::expr::{Expression as EditExpression, ObjectKey};
use hclint_core::lang::get_provider_refs;
use hclint_core::{
    Attribute, BlockSchema, BodySchema, GetModuleContentOption, Rule, RuleError, RuleMeta,
    Runner, Severity,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Rule name for terraform-required-providers.
pub const NAME: &str = "terraform_required_providers";

/// Provider that ships with Terraform itself.
const BUILTIN_PROVIDER: &str = "terraform";

/// Requires `required_providers` entries with version constraints.
#[derive(Debug, Clone, Default)]
pub struct TerraformRequiredProviders;

impl TerraformRequiredProviders {
    /// Creates the rule.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Every `required_providers` entry of the module, by local name.
pub(crate) fn required_providers(
    runner: &dyn Runner,
) -> Result<BTreeMap<String, Attribute>, RuleError> {
    let schema = BodySchema::new().block(BlockSchema::new("terraform").body(
        BodySchema::new().block(
            BlockSchema::new("required_providers").body(BodySchema::just_attributes()),
        ),
    ));
    let content = runner.get_module_content(&schema, &GetModuleContentOption::literal())?;

    let mut providers = BTreeMap::new();
    for terraform in &content.blocks {
        for block in terraform.body.blocks_of_type("required_providers") {
            for (name, attr) in &block.body.attributes {
                providers.insert(name.clone(), attr.clone());
            }
        }
    }
    Ok(providers)
}

fn object_key(key: &ObjectKey) -> Option<&str> {
    match key {
        ObjectKey::Ident(ident) => Some(ident.as_str()),
        ObjectKey::Expression(expr) => expr.as_str(),
    }
}

/// Whether a `source` address names a provider built into Terraform, such
/// as `terraform.io/builtin/terraform`.
fn is_builtin_source(source: &str) -> bool {
    let parts: Vec<&str> = source.split('/').collect();
    matches!(
        parts.as_slice(),
        [host, namespace, _] if host.eq_ignore_ascii_case("terraform.io")
            && namespace.eq_ignore_ascii_case("builtin")
    )
}

/// Whether a `required_providers` entry pins a version. Legacy entries are
/// a bare version string.
fn has_version(attr: &Attribute) -> Result<bool, RuleError> {
    match attr.expr.parse()? {
        EditExpression::String(_) | EditExpression::StringTemplate(_) => Ok(true),
        EditExpression::Object(object) => {
            let mut source = None;
            for (key, value) in object.iter() {
                match object_key(key) {
                    Some("version") => return Ok(true),
                    Some("source") => source = value.expr().as_str().map(str::to_string),
                    _ => {}
                }
            }
            Ok(source.as_deref().is_some_and(is_builtin_source))
        }
        _ => Ok(false),
    }
}

impl Rule for TerraformRequiredProviders {
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
        let meta = RuleMeta::of(self);

        let schema = BodySchema::new().block(
            BlockSchema::new("provider")
                .labels(&["name"])
                .body(BodySchema::new().attribute("version")),
        );
        let content = runner.get_module_content(&schema, &GetModuleContentOption::literal())?;
        for provider in &content.blocks {
            if provider.body.attribute("version").is_some() {
                runner.emit_issue(
                    &meta,
                    "provider version constraint should be specified via `required_providers`",
                    &provider.def_range,
                )?;
            }
        }

        let required = required_providers(runner)?;
        for (name, reference) in get_provider_refs(runner)? {
            if name == BUILTIN_PROVIDER {
                continue;
            }
            let pinned = match required.get(&name) {
                Some(attr) => has_version(attr)?,
                None => false,
            };
            if !pinned {
                runner.emit_issue(
                    &meta,
                    &format!(
                        "Missing version constraint for provider \"{name}\" in `required_providers`"
                    ),
                    &reference.def_range,
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
    use hclint_core::helper::{assert_issues, test_runner};

    fn check(source: &str) -> Vec<hclint_core::Issue> {
        let runner = test_runner(&[("main.tf", source)]).unwrap();
        TerraformRequiredProviders::new().check(&runner).unwrap();
        runner.issues()
    }

    fn missing(name: &str) -> String {
        format!("Missing version constraint for provider \"{name}\" in `required_providers`")
    }

    #[test]
    fn test_builtin_source() {
        assert!(is_builtin_source("terraform.io/builtin/terraform"));
        assert!(!is_builtin_source("hashicorp/aws"));
        assert!(!is_builtin_source("registry.terraform.io/hashicorp/aws"));
    }

    // --- missing entry tests ---

    #[test]
    fn test_implicit_provider_without_entry() {
        let issues = check("resource \"random_id\" \"r\" {}\n");
        assert_issues(&issues, &[(NAME, &missing("random"), "main.tf:1,1-25")]);
    }

    #[test]
    fn test_module_provider_without_entry() {
        let source = r#"
module "m" {
  source = "./m"
  providers = {
    google = google.west
  }
}
"#;
        assert_issues(&check(source), &[(NAME, &missing("google"), "main.tf:2,1-11")]);
    }

    #[test]
    fn test_terraform_provider_is_builtin() {
        let source = "data \"terraform_remote_state\" \"s\" {}\n";
        assert!(check(source).is_empty());
    }

    // --- version tests ---

    #[test]
    fn test_entries_with_versions() {
        let source = r#"
terraform {
  required_providers {
    aws    = "~> 5.0"
    google = {
      source  = "hashicorp/google"
      version = ">= 4.0"
    }
  }
}

resource "aws_instance" "a" {}
resource "google_compute_instance" "g" {}
"#;
        assert!(check(source).is_empty());
    }

    #[test]
    fn test_entry_without_version() {
        let source = r#"
terraform {
  required_providers {
    aws = {
      source = "hashicorp/aws"
    }
    builtin = {
      source = "terraform.io/builtin/terraform"
    }
  }
}

resource "aws_instance" "a" {}

provider "builtin" {}
"#;
        assert_issues(&check(source), &[(NAME, &missing("aws"), "main.tf:13,1-28")]);
    }

    #[test]
    fn test_configuration_aliases_do_not_need_evaluation() {
        let source = r#"
terraform {
  required_providers {
    aws = {
      source                = "hashicorp/aws"
      version               = "~> 5.0"
      configuration_aliases = [aws.west]
    }
  }
}

resource "aws_instance" "a" {
  provider = aws.west
}
"#;
        assert!(check(source).is_empty());
    }

    #[test]
    fn test_version_in_provider_block() {
        let source = r#"
terraform {
  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = "~> 5.0"
    }
  }
}

provider "aws" {
  version = "~> 5.0"
}
"#;
        assert_issues(
            &check(source),
            &[(
                NAME,
                "provider version constraint should be specified via `required_providers`",
                "main.tf:11,1-15",
            )],
        );
    }

    #[test]
    fn test_child_module_is_skipped() {
        let runner = child_runner("resource \"aws_instance\" \"a\" {}\n");
        TerraformRequiredProviders::new().check(&runner).unwrap();
        assert!(runner.issues().is_empty());
    }
}
