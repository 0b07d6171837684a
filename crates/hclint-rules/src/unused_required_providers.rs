//! Rule reporting `required_providers` entries that nothing in the module
//! uses.

use crate::reference_link;
use crate::required_providers::required_providers;
use hclint_core::lang::get_provider_refs;
use hclint_core::{Rule, RuleError, RuleMeta, Runner, Severity};

/// Rule name for terraform-unused-required-providers.
pub const NAME: &str = "terraform_unused_required_providers";

/// Reports required providers without any resource, data source, provider
/// configuration or module call using them.
#[derive(Debug, Clone, Default)]
pub struct TerraformUnusedRequiredProviders;

impl TerraformUnusedRequiredProviders {
    /// Creates the rule.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Rule for TerraformUnusedRequiredProviders {
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
        let refs = get_provider_refs(runner)?;
        let meta = RuleMeta::of(self);
        for (name, attr) in required_providers(runner)? {
            if refs.contains_key(&name) {
                continue;
            }
            runner.emit_issue(
                &meta,
                &format!(
                    "provider '{name}' is declared in required_providers but not used by any \
                     resources, data sources, provider configurations, or modules"
                ),
                &attr.range,
            )?;
        }
        Ok(())
    }
}
