//! Rule trait for defining lint rules.

use crate::hclext::Diagnostics;
use crate::runner::{Runner, RunnerError};
use crate::types::Severity;

/// A single check run against one module.
///
/// Rules never see how the configuration is loaded: they query it through
/// the [`Runner`] and report findings with [`Runner::emit_issue`]. The same
/// rule therefore works in-process and inside a plugin.
///
/// # Example
///
/// ```ignore
/// use hclint_core::{Rule, RuleError, RuleMeta, Runner, Severity};
///
/// pub struct NoEmptyModules;
///
/// impl Rule for NoEmptyModules {
///     fn name(&self) -> &str { "no_empty_modules" }
///
///     fn check(&self, runner: &dyn Runner) -> Result<(), RuleError> {
///         if runner.get_files()?.is_empty() {
///             runner.emit_issue(&RuleMeta::of(self), "module has no files", &Default::default())?;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Rule: Send + Sync {
    /// Returns the snake_case name of this rule (e.g., `terraform_unused_declarations`).
    fn name(&self) -> &str;

    /// Whether the rule runs when nothing in the configuration mentions it.
    fn enabled(&self) -> bool {
        true
    }

    /// Severity of issues emitted by this rule.
    fn severity(&self) -> Severity {
        Severity::Error
    }

    /// Documentation link.
    fn link(&self) -> Option<String> {
        None
    }

    /// Checks the module behind `runner`.
    ///
    /// # Errors
    ///
    /// Any error aborts the remaining rules of the rule set.
    fn check(&self, runner: &dyn Runner) -> Result<(), RuleError>;
}

/// Type alias for boxed Rule trait objects.
pub type RuleBox = Box<dyn Rule>;

/// Errors a rule can return from [`Rule::check`].
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// A runner call failed.
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// Configuration could not be extracted or decoded.
    #[error(transparent)]
    Diagnostics(#[from] Diagnostics),

    /// Any other failure.
    #[error("{0}")]
    Custom(String),
}
