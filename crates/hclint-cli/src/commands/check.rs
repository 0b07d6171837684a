//! Check command implementation.

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use hclint_core::config::parse_variable;
use hclint_core::{Analyzer, AnalysisReport, CallModuleType, Config, Severity};
use hclint_plugin::{plugin_dir, start_plugins, ClientOptions};
use std::path::{Path, PathBuf};

use crate::config_resolver::ConfigSource;
use crate::OutputFormat;

/// No issues at or above the failure severity, or `--force`.
pub const EXIT_OK: u8 = 0;
/// The run could not complete.
pub const EXIT_ERROR: u8 = 1;
/// Issues were found.
pub const EXIT_ISSUES: u8 = 2;

/// Flags of `hclint check`.
#[derive(Debug, Clone)]
pub struct CheckArgs {
    /// Root module directory.
    pub path: PathBuf,
    /// Output format; the config file's `format` otherwise.
    pub format: Option<OutputFormat>,
    /// Run only these rules.
    pub only: Vec<String>,
    /// Exit with status 0 even when issues are found.
    pub force: bool,
    /// Plugin directory override.
    pub plugin_dir: Option<PathBuf>,
    /// Which module calls to follow.
    pub call_module_type: Option<CallModuleType>,
    /// `name=value` variable assignments.
    pub vars: Vec<String>,
    /// Lowest severity that fails the run.
    pub minimum_failure_severity: Severity,
}

/// Applies command-line flags on top of the loaded configuration.
fn apply_overrides(config: &mut Config, args: &CheckArgs) -> Result<()> {
    config.force |= args.force;
    config.only.extend(args.only.iter().cloned());
    if let Some(call_module_type) = args.call_module_type {
        config.call_module_type = call_module_type;
    }
    for assignment in &args.vars {
        let (name, value) = parse_variable(assignment)?;
        config.variables.insert(name, value);
    }
    Ok(())
}

fn output_format(args: &CheckArgs, config: &Config) -> Result<OutputFormat> {
    if let Some(format) = args.format {
        return Ok(format);
    }
    match &config.format {
        Some(name) => OutputFormat::from_str(name, true)
            .map_err(|err| anyhow!("invalid format in config: {err}")),
        None => Ok(OutputFormat::default()),
    }
}

/// Exit status for a finished run.
fn exit_status(report: &AnalysisReport, config: &Config, minimum: Severity) -> u8 {
    if report.has_failures() {
        EXIT_ERROR
    } else if report.has_issues_at(minimum) && !config.force {
        EXIT_ISSUES
    } else {
        EXIT_OK
    }
}

/// Runs the check command and returns the exit status.
pub fn run(args: &CheckArgs, source: &ConfigSource, working_dir: &Path) -> Result<u8> {
    let mut config = source.load()?;
    apply_overrides(&mut config, args)?;
    let format = output_format(args, &config)?;

    let dir = plugin_dir(args.plugin_dir.as_deref(), &config);
    let plugins = start_plugins(&config, &dir, &ClientOptions::default())
        .context("Failed to initialize plugins")?;

    let mut builder = Analyzer::builder()
        .root(&args.path)
        .original_wd(working_dir)
        .config(config.clone())
        .rule_set(hclint_rules::rule_set());
    for plugin in plugins {
        builder = builder.rule_set(plugin);
    }
    let mut analyzer = builder.build().context("Failed to build analyzer")?;

    tracing::info!(
        "Analyzing {:?} with {} rule set(s)",
        args.path,
        analyzer.rule_set_count()
    );

    let report = analyzer.analyze().context("Analysis failed")?;
    super::output::print(&report, format, working_dir)?;

    Ok(exit_status(&report, &config, args.minimum_failure_severity))
}
