//! # hclint-rules
//!
//! The built-in `terraform` rule set.
//!
//! ## Available Rules
//!
//! | Name | Default | Severity | Description |
//! |------|---------|----------|-------------|
//! | `terraform_unused_declarations` | on | warning | Variables, locals and data sources that are never referenced |
//! | `terraform_required_providers` | on | warning | Providers without a version constraint in `required_providers` |
//! | `terraform_unused_required_providers` | on | warning | `required_providers` entries nothing uses |
//! | `terraform_documented_variables` | off | notice | Variables without a description |
//!
//! ## Usage
//!
//! ```ignore
//! use hclint_core::Analyzer;
//!
//! let mut analyzer = Analyzer::builder()
//!     .root("./infra")
//!     .rule_set(hclint_rules::rule_set())
//!     .build()?;
//! let report = analyzer.analyze()?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod documented_variables;
mod presets;
mod required_providers;
mod unused_declarations;
mod unused_required_providers;

pub use documented_variables::{DocumentedVariablesConfig, TerraformDocumentedVariables};
pub use presets::{all_rules, recommended_rules, Preset};
pub use required_providers::TerraformRequiredProviders;
pub use unused_declarations::TerraformUnusedDeclarations;
pub use unused_required_providers::TerraformUnusedRequiredProviders;

/// Re-export core types for convenience.
pub use hclint_core::{BuiltinRuleSet, Rule, RuleRegistry, RuleSetError, Severity};

/// Name of the built-in rule set.
pub const RULE_SET_NAME: &str = "terraform";

/// Version of the built-in rule set.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Documentation link of a built-in rule.
#[must_use]
pub fn reference_link(rule: &str) -> String {
    format!("https://github.com/ynishi/hclint/blob/v{VERSION}/docs/rules/{rule}.md")
}

/// Registers every built-in rule.
///
/// # Errors
///
/// Returns [`RuleSetError::DuplicateRule`] if two rules share a name.
pub fn registry() -> Result<RuleRegistry, RuleSetError> {
    let mut registry = RuleRegistry::new();
    registry
        .register(|| Box::new(TerraformUnusedDeclarations::new()))?
        .register(|| Box::new(TerraformRequiredProviders::new()))?
        .register(|| Box::new(TerraformUnusedRequiredProviders::new()))?
        .register(|| Box::new(TerraformDocumentedVariables::new()))?;
    Ok(registry)
}

/// The `terraform` rule set with the rules of `preset`.
#[must_use]
pub fn rule_set_with(preset: Preset) -> BuiltinRuleSet {
    BuiltinRuleSet::new(RULE_SET_NAME, VERSION).rules(preset.rules())
}

/// The `terraform` rule set with every built-in rule, each enabled
/// according to its own default until configured.
#[must_use]
pub fn rule_set() -> BuiltinRuleSet {
    rule_set_with(Preset::All)
}
