//! # hclint
//!
//! Pluggable linter for Terraform-style HCL configurations.
//!
//! This is the facade crate that re-exports the core framework, the built-in
//! rules and the plugin protocol, so a rule set author needs one dependency.
//!
//! ## Writing a Plugin
//!
//! ```rust,ignore
//! use hclint::{BuiltinRuleSet, RuleBox};
//!
//! fn main() {
//!     let rules = BuiltinRuleSet::new("example", env!("CARGO_PKG_VERSION"))
//!         .version_constraint(">= 0.4.0")
//!         .rules([Box::new(MyRule) as RuleBox]);
//!     hclint::serve(hclint::ServeOpts {
//!         rule_set: Box::new(rules),
//!     });
//! }
//! ```
//!
//! Install the binary as `hclint-ruleset-example` in the plugin directory
//! and enable it in `.hclint.hcl`:
//!
//! ```hcl
//! plugin "example" {
//!   enabled = true
//! }
//! ```
//!
//! ## Rule Configuration
//!
//! Derive [`Decode`] for a rule's settings. Outside `hclint-core` the
//! generated code must be pointed at this crate:
//!
//! ```rust,ignore
//! #[derive(Debug, Default, hclint::Decode)]
//! #[hcl(crate = "hclint")]
//! struct Settings {
//!     #[hcl(attr = "exclude", optional)]
//!     exclude: Vec<String>,
//! }
//! ```
//!
//! ## Programmatic Usage
//!
//! ```rust,ignore
//! use hclint::Analyzer;
//!
//! let mut analyzer = Analyzer::builder()
//!     .root("./infra")
//!     .rule_set(hclint::rules::rule_set())
//!     .build()?;
//!
//! let report = analyzer.analyze()?;
//! ```

#![forbid(unsafe_code)]

// Re-export core types and traits
pub use hclint_core::*;

// Plugin entry point
pub use hclint_plugin::{serve, ServeOpts};

/// Built-in `terraform` rules and presets.
pub mod rules {
    pub use hclint_rules::*;
}

/// Host and plugin sides of the rule set protocol.
pub mod plugin {
    pub use hclint_plugin::*;
}
