//! hclint CLI tool.
//!
//! Usage:
//! ```bash
//! hclint check [OPTIONS] [PATH]
//! hclint list-rules
//! hclint init
//! ```

use clap::{Parser, Subcommand};
use hclint_core::{CallModuleType, Severity};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod config_resolver;

use commands::check::{CheckArgs, EXIT_ERROR, EXIT_OK};

/// Pluggable linter for Terraform-style HCL configurations
#[derive(Parser)]
#[command(name = "hclint")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run lint checks
    Check {
        /// Module directory to analyze (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output format
        #[arg(short, long)]
        format: Option<OutputFormat>,

        /// Only run this rule (can be specified multiple times)
        #[arg(long)]
        only: Vec<String>,

        /// Exit with status 0 even if issues are found
        #[arg(long)]
        force: bool,

        /// Plugin directory
        #[arg(long)]
        plugin_dir: Option<PathBuf>,

        /// Which module calls to inspect ("local" or "none")
        #[arg(long)]
        call_module_type: Option<CallModuleType>,

        /// Set a root module variable (name=value, can be specified multiple times)
        #[arg(long = "var")]
        vars: Vec<String>,

        /// Lowest severity that makes the run fail
        #[arg(long, default_value = "notice")]
        minimum_failure_severity: Severity,
    },

    /// List available rules
    ListRules {
        /// Plugin directory
        #[arg(long)]
        plugin_dir: Option<PathBuf>,
    },

    /// Initialize configuration file
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

/// Output format for lint results.
#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
    /// One-line-per-issue compact format.
    Compact,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env(hclint_plugin::LOG_ENV).unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    let working_dir = std::env::current_dir()?;
    let source = config_resolver::resolve(&working_dir, cli.config.as_deref());

    match cli.command {
        Commands::Check {
            path,
            format,
            only,
            force,
            plugin_dir,
            call_module_type,
            vars,
            minimum_failure_severity,
        } => {
            let args = CheckArgs {
                path,
                format,
                only,
                force,
                plugin_dir,
                call_module_type,
                vars,
                minimum_failure_severity,
            };
            commands::check::run(&args, &source, &working_dir)
        }
        Commands::ListRules { plugin_dir } => {
            commands::list_rules::run(&source, plugin_dir.as_deref())?;
            Ok(EXIT_OK)
        }
        Commands::Init { force } => {
            commands::init::run(&working_dir, force)?;
            Ok(EXIT_OK)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(status) => ExitCode::from(status),
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_check_flags() {
        let cli = Cli::try_parse_from([
            "hclint",
            "check",
            "infra",
            "--format",
            "json",
            "--only",
            "terraform_required_providers",
            "--var",
            "region=eu-west-1",
            "--call-module-type",
            "none",
            "--minimum-failure-severity",
            "warning",
        ])
        .unwrap();
        let Commands::Check {
            path,
            format,
            only,
            call_module_type,
            vars,
            minimum_failure_severity,
            ..
        } = cli.command
        else {
            panic!("expected check");
        };
        assert_eq!(path, PathBuf::from("infra"));
        assert!(matches!(format, Some(OutputFormat::Json)));
        assert_eq!(only, vec!["terraform_required_providers"]);
        assert_eq!(call_module_type, Some(CallModuleType::None));
        assert_eq!(vars, vec!["region=eu-west-1"]);
        assert_eq!(minimum_failure_severity, Severity::Warning);
    }

    #[test]
    fn test_rejects_unknown_severity() {
        assert!(Cli::try_parse_from([
            "hclint",
            "check",
            "--minimum-failure-severity",
            "fatal",
        ])
        .is_err());
    }
}
