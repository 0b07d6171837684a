//! Rule sets: named, versioned bundles of rules.
//!
//! A [`RuleSet`] is what a plugin serves. The host drives rule sets through
//! [`RuleSetHandle`], implemented here for in-process [`BuiltinRuleSet`]s
//! and by the plugin crate for out-of-process ones.

use crate::config::Config;
use crate::hclext::{BodyContent, BodySchema, Diagnostics};
use crate::rule::{RuleBox, RuleError};
use crate::runner::Runner;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Settings shared by every rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Rules mentioned in the config file.
    #[serde(default)]
    pub rules: BTreeMap<String, RuleGlobalConfig>,
    /// Rules not mentioned are disabled.
    #[serde(default)]
    pub disabled_by_default: bool,
    /// If not empty, only these rules are enabled.
    #[serde(default)]
    pub only: Vec<String>,
    /// Fixes are requested.
    #[serde(default)]
    pub fix: bool,
    /// Issues do not fail the run.
    #[serde(default)]
    pub force: bool,
}

impl GlobalConfig {
    /// Decides whether a rule runs. `--only` wins over the rule's block,
    /// which wins over `disabled_by_default`, which wins over the rule's own
    /// default.
    #[must_use]
    pub fn is_rule_enabled(&self, name: &str, default: bool) -> bool {
        if !self.only.is_empty() {
            return self.only.iter().any(|n| n == name);
        }
        if let Some(rule) = self.rules.get(name) {
            return rule.enabled;
        }
        if self.disabled_by_default {
            return false;
        }
        default
    }
}

/// Per-rule part of [`GlobalConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGlobalConfig {
    /// Rule name.
    pub name: String,
    /// Whether the rule is enabled.
    pub enabled: bool,
}

/// Errors that can occur while configuring or running a rule set.
#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    /// A rule's check failed; the remaining rules were not run.
    #[error("failed to check \"{rule}\" rule: {source}")]
    RuleCheck {
        /// Name of the failed rule.
        rule: String,
        /// What went wrong.
        source: RuleError,
    },

    /// Two rules share a name.
    #[error("rule \"{0}\" is already registered")]
    DuplicateRule(String),

    /// Rule set configuration does not fit its schema.
    #[error("invalid configuration: {0}")]
    Config(#[from] Diagnostics),

    /// A call was made out of order.
    #[error("{0}")]
    FailedPrecondition(String),

    /// The rule set is hosted elsewhere and the call failed.
    #[error(transparent)]
    Remote(Box<dyn std::error::Error + Send + Sync>),
}

/// A named, versioned bundle of rules, as served by a plugin.
pub trait RuleSet: Send + Sync {
    /// Rule set name, e.g. `terraform`.
    fn rule_set_name(&self) -> &str;

    /// Rule set version.
    fn rule_set_version(&self) -> &str;

    /// Names of every rule, enabled or not.
    fn rule_names(&self) -> Vec<String>;

    /// Semver requirement on the host version.
    fn version_constraint(&self) -> Option<String> {
        None
    }

    /// Schema of the rule set's own `plugin` block.
    fn config_schema(&self) -> BodySchema {
        BodySchema::new()
    }

    /// Applies host-wide settings, including which rules are enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot be applied.
    fn apply_global_config(&mut self, config: &GlobalConfig) -> Result<(), RuleSetError>;

    /// Applies the rule set's own config, extracted with
    /// [`RuleSet::config_schema`].
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid.
    fn apply_config(&mut self, content: &BodyContent) -> Result<(), RuleSetError>;

    /// Runs every enabled rule against one module, stopping at the first
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`RuleSetError::RuleCheck`] naming the failed rule.
    fn check(&self, runner: &dyn Runner) -> Result<(), RuleSetError>;
}

/// Host-side view of a rule set, wherever it runs.
pub trait RuleSetHandle: Send {
    /// Rule set name.
    fn name(&self) -> &str;

    /// Names of every rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule set cannot be reached.
    fn rule_names(&mut self) -> Result<Vec<String>, RuleSetError>;

    /// Applies the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule set rejects the configuration.
    fn configure(&mut self, config: &Config) -> Result<(), RuleSetError>;

    /// Checks one module.
    ///
    /// # Errors
    ///
    /// Returns the first rule failure, or a transport failure.
    fn check(&mut self, runner: &dyn Runner) -> Result<(), RuleSetError>;
}

/// A rule set whose rules are compiled in.
pub struct BuiltinRuleSet {
    name: String,
    version: String,
    constraint: Option<String>,
    rules: Vec<RuleBox>,
    enabled: BTreeSet<String>,
}

impl BuiltinRuleSet {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            constraint: None,
            rules: Vec::new(),
            enabled: BTreeSet::new(),
        }
    }

    /// Sets the semver requirement on the host version.
    #[must_use]
    pub fn version_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    /// Adds rules. Until a global config is applied, each rule's own
    /// default decides whether it runs.
    #[must_use]
    pub fn rules(mut self, rules: impl IntoIterator<Item = RuleBox>) -> Self {
        for rule in rules {
            if rule.enabled() {
                self.enabled.insert(rule.name().to_string());
            }
            self.rules.push(rule);
        }
        self
    }

    /// Names of the rules that will run.
    #[must_use]
    pub fn enabled_rules(&self) -> Vec<&str> {
        self.rules
            .iter()
            .map(|r| r.name())
            .filter(|name| self.enabled.contains(*name))
            .collect()
    }

    /// The rules of this set.
    #[must_use]
    pub fn all_rules(&self) -> &[RuleBox] {
        &self.rules
    }
}

impl RuleSet for BuiltinRuleSet {
    fn rule_set_name(&self) -> &str {
        &self.name
    }

    fn rule_set_version(&self) -> &str {
        &self.version
    }

    fn rule_names(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.name().to_string()).collect()
    }

    fn version_constraint(&self) -> Option<String> {
        self.constraint.clone()
    }

    fn apply_global_config(&mut self, config: &GlobalConfig) -> Result<(), RuleSetError> {
        self.enabled = self
            .rules
            .iter()
            .filter(|rule| config.is_rule_enabled(rule.name(), rule.enabled()))
            .map(|rule| rule.name().to_string())
            .collect();
        debug!(
            rule_set = %self.name,
            enabled = self.enabled.len(),
            total = self.rules.len(),
            "Applied global config"
        );
        Ok(())
    }

    fn apply_config(&mut self, _content: &BodyContent) -> Result<(), RuleSetError> {
        Ok(())
    }

    fn check(&self, runner: &dyn Runner) -> Result<(), RuleSetError> {
        for rule in &self.rules {
            if !self.enabled.contains(rule.name()) {
                continue;
            }
            debug!(rule = rule.name(), "Running rule");
            rule.check(runner).map_err(|source| RuleSetError::RuleCheck {
                rule: rule.name().to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

impl RuleSetHandle for BuiltinRuleSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn rule_names(&mut self) -> Result<Vec<String>, RuleSetError> {
        Ok(RuleSet::rule_names(self))
    }

    fn configure(&mut self, config: &Config) -> Result<(), RuleSetError> {
        self.apply_global_config(&config.global_config(false))?;
        let content = config.plugin_config_content(&self.name, &self.config_schema())?;
        self.apply_config(&content)
    }

    fn check(&mut self, runner: &dyn Runner) -> Result<(), RuleSetError> {
        RuleSet::check(self, runner)
    }
}

type RuleFactory = Box<dyn Fn() -> RuleBox + Send + Sync>;

/// Rule constructors by name, built explicitly at startup.
#[derive(Default)]
pub struct RuleRegistry {
    factories: BTreeMap<String, RuleFactory>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule constructor under the name of the rule it builds.
    ///
    /// # Errors
    ///
    /// Returns [`RuleSetError::DuplicateRule`] if the name is taken.
    pub fn register<F>(&mut self, factory: F) -> Result<&mut Self, RuleSetError>
    where
        F: Fn() -> RuleBox + Send + Sync + 'static,
    {
        let name = factory().name().to_string();
        if self.factories.contains_key(&name) {
            return Err(RuleSetError::DuplicateRule(name));
        }
        info!(rule = %name, "Registered rule");
        self.factories.insert(name, Box::new(factory));
        Ok(self)
    }

    /// Registered rule names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Builds one rule by name.
    #[must_use]
    pub fn build(&self, name: &str) -> Option<RuleBox> {
        self.factories.get(name).map(|factory| factory())
    }

    /// Builds every registered rule, sorted by name.
    #[must_use]
    pub fn build_all(&self) -> Vec<RuleBox> {
        self.factories.values().map(|factory| factory()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Module, ModulePath};
    use crate::rule::Rule;
    use crate::runner::LocalRunner;
    use crate::types::{RuleMeta, Severity};
    use std::sync::Arc;

    struct Emit {
        name: &'static str,
        default: bool,
    }

    impl Rule for Emit {
        fn name(&self) -> &str {
            self.name
        }

        fn enabled(&self) -> bool {
            self.default
        }

        fn severity(&self) -> Severity {
            Severity::Warning
        }

        fn check(&self, runner: &dyn Runner) -> Result<(), RuleError> {
            runner.emit_issue(&RuleMeta::of(self), "found", &Default::default())?;
            Ok(())
        }
    }

    struct Fail;

    impl Rule for Fail {
        fn name(&self) -> &str {
            "failing"
        }

        fn check(&self, _runner: &dyn Runner) -> Result<(), RuleError> {
            Err(RuleError::Custom("boom".to_string()))
        }
    }

    fn rule_set() -> BuiltinRuleSet {
        BuiltinRuleSet::new("test", "0.1.0").rules([
            Box::new(Emit {
                name: "on_by_default",
                default: true,
            }) as RuleBox,
            Box::new(Emit {
                name: "off_by_default",
                default: false,
            }),
        ])
    }

    fn runner() -> LocalRunner {
        let module = Module::from_sources(ModulePath::root(), ".", [("main.tf", "")]).unwrap();
        LocalRunner::for_root(Arc::new(module), Arc::new(Config::default()))
    }

    fn rule_names(runner: &LocalRunner) -> Vec<String> {
        runner.issues().into_iter().map(|i| i.rule.name).collect()
    }

    // --- enable/disable tests ---

    #[test]
    fn test_rule_defaults() {
        let set = rule_set();
        assert_eq!(set.enabled_rules(), vec!["on_by_default"]);
    }

    #[test]
    fn test_enable_priority() {
        let mut config = GlobalConfig::default();
        config.rules.insert(
            "off_by_default".to_string(),
            RuleGlobalConfig {
                name: "off_by_default".to_string(),
                enabled: true,
            },
        );
        config.disabled_by_default = true;

        let mut set = rule_set();
        set.apply_global_config(&config).unwrap();
        assert_eq!(set.enabled_rules(), vec!["off_by_default"]);

        config.only = vec!["on_by_default".to_string()];
        set.apply_global_config(&config).unwrap();
        assert_eq!(set.enabled_rules(), vec!["on_by_default"]);
    }

    // --- check tests ---

    #[test]
    fn test_check_runs_enabled_rules() {
        let set = rule_set();
        let runner = runner();
        RuleSet::check(&set, &runner).unwrap();
        assert_eq!(rule_names(&runner), vec!["on_by_default"]);
    }

    #[test]
    fn test_check_is_fail_fast() {
        let set = BuiltinRuleSet::new("test", "0.1.0").rules([
            Box::new(Fail) as RuleBox,
            Box::new(Emit {
                name: "after",
                default: true,
            }),
        ]);
        let runner = runner();
        let err = RuleSet::check(&set, &runner).unwrap_err();
        assert_eq!(err.to_string(), "failed to check \"failing\" rule: boom");
        assert!(runner.issues().is_empty());
    }

    // --- registry tests ---

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = RuleRegistry::new();
        registry.register(|| Box::new(Fail)).unwrap();
        let err = registry.register(|| Box::new(Fail)).err().unwrap();
        assert!(matches!(err, RuleSetError::DuplicateRule(name) if name == "failing"));
        assert_eq!(registry.names(), vec!["failing"]);
        assert!(registry.build("failing").is_some());
        assert!(registry.build("missing").is_none());
    }
}
