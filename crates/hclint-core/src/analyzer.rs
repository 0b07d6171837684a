//! Orchestrates a lint run: load modules, configure rule sets, check.

use crate::config::Config;
use crate::module::{LoadError, Module, ModuleLoader};
use crate::ruleset::{RuleSetError, RuleSetHandle};
use crate::runner::LocalRunner;
use crate::types::{AnalysisReport, RuleSetFailure};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during analysis.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// IO error resolving the working directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// No rule set was registered.
    #[error("No rule sets to run")]
    NoRuleSets,
}

/// Builder for configuring an [`Analyzer`].
#[derive(Default)]
pub struct AnalyzerBuilder {
    root: Option<PathBuf>,
    original_wd: Option<PathBuf>,
    rule_sets: Vec<Box<dyn RuleSetHandle>>,
    config: Option<Config>,
}

impl AnalyzerBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the directory of the root module (default: current directory).
    #[must_use]
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Sets the directory file names are reported relative to (default:
    /// current directory).
    #[must_use]
    pub fn original_wd(mut self, path: impl Into<PathBuf>) -> Self {
        self.original_wd = Some(path.into());
        self
    }

    /// Adds a rule set.
    #[must_use]
    pub fn rule_set<R: RuleSetHandle + 'static>(mut self, rule_set: R) -> Self {
        self.rule_sets.push(Box::new(rule_set));
        self
    }

    /// Adds a boxed rule set.
    #[must_use]
    pub fn rule_set_box(mut self, rule_set: Box<dyn RuleSetHandle>) -> Self {
        self.rule_sets.push(rule_set);
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the analyzer.
    ///
    /// # Errors
    ///
    /// Returns an error if no rule set was added or the working directory
    /// cannot be resolved.
    pub fn build(self) -> Result<Analyzer, AnalyzerError> {
        if self.rule_sets.is_empty() {
            return Err(AnalyzerError::NoRuleSets);
        }
        let original_wd = match self.original_wd {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        let root = self.root.unwrap_or_else(|| PathBuf::from("."));
        let root = if root.is_absolute() {
            root
        } else {
            original_wd.join(root)
        };

        Ok(Analyzer {
            root,
            original_wd,
            rule_sets: self.rule_sets,
            config: Arc::new(self.config.unwrap_or_default()),
        })
    }
}

/// The main analyzer that orchestrates lint execution.
///
/// Use [`Analyzer::builder()`] to construct an instance.
pub struct Analyzer {
    root: PathBuf,
    original_wd: PathBuf,
    rule_sets: Vec<Box<dyn RuleSetHandle>>,
    config: Arc<Config>,
}

impl Analyzer {
    /// Creates a new builder for configuring an analyzer.
    #[must_use]
    pub fn builder() -> AnalyzerBuilder {
        AnalyzerBuilder::new()
    }

    /// Returns the root module directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the number of rule sets.
    #[must_use]
    pub fn rule_set_count(&self) -> usize {
        self.rule_sets.len()
    }

    /// Loads the module tree and runs every rule set against each module.
    ///
    /// A rule set that fails is recorded in [`AnalysisReport::failures`]
    /// and contributes no issues; other rule sets are unaffected.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded.
    pub fn analyze(&mut self) -> Result<AnalysisReport, AnalyzerError> {
        info!("Starting analysis at {:?}", self.root);

        let root = ModuleLoader::new()
            .call_module_type(self.config.call_module_type)
            .variables(self.config.variables.clone())
            .original_wd(&self.original_wd)
            .load(&self.root)?;
        let modules = root.walk();
        info!("Loaded {} module(s)", modules.len());

        let original_wd = self.original_wd.display().to_string();
        let mut report = AnalysisReport::new();
        for rule_set in &mut self.rule_sets {
            let name = rule_set.name().to_string();
            let result = run_rule_set(
                rule_set.as_mut(),
                &self.config,
                &root,
                &modules,
                &original_wd,
            );
            match result {
                Ok(issues) => {
                    debug!(rule_set = %name, issues = issues.len(), "Rule set finished");
                    report.issues.extend(issues);
                }
                Err(err) => {
                    warn!(rule_set = %name, "Rule set failed: {err}");
                    report.failures.push(RuleSetFailure {
                        rule_set: name,
                        message: err.to_string(),
                    });
                }
            }
        }

        report.sort();
        let (errors, warnings, notices) = report.count_by_severity();
        info!(
            "Analysis complete: {errors} error(s), {warnings} warning(s), {notices} notice(s)"
        );
        Ok(report)
    }
}

fn run_rule_set(
    rule_set: &mut dyn RuleSetHandle,
    config: &Arc<Config>,
    root: &Arc<Module>,
    modules: &[Arc<Module>],
    original_wd: &str,
) -> Result<Vec<crate::types::Issue>, RuleSetError> {
    rule_set.configure(config)?;
    let mut issues = Vec::new();
    for module in modules {
        debug!(rule_set = rule_set.name(), module = %module.path, "Checking module");
        let runner = LocalRunner::new(
            Arc::clone(module),
            Arc::clone(root),
            Arc::clone(config),
            original_wd,
        );
        rule_set.check(&runner)?;
        issues.extend(runner.into_issues());
    }
    Ok(issues)
}
