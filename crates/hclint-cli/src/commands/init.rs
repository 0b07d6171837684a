//! Init command implementation.

use anyhow::{bail, Context, Result};
use hclint_core::config::{project_config_path, CONFIG_FILE_NAME};
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"# hclint configuration
# See https://github.com/ynishi/hclint for documentation

config {
  # Which module calls to inspect: "local" or "none"
  call_module_type = "local"

  # Exit with status 0 even when issues are found
  force = false

  # Disable every rule not enabled below
  disabled_by_default = false

  # Output format: "text", "json" or "compact"
  # format = "compact"

  # Values for root module variables
  # variables = ["region=eu-west-1"]

  # Where plugin binaries are installed
  # plugin_dir = "~/.hclint.d/plugins"
}

rule "terraform_unused_declarations" {
  enabled = true
}

rule "terraform_documented_variables" {
  enabled = false
  # exclude = ["name"]
}

# plugin "aws" {
#   enabled = true
#   version = "0.1.0"
#   source  = "github.com/example/hclint-ruleset-aws"
# }
"#;

/// Runs the init command, writing the config file into `dir`.
pub fn run(dir: &Path, force: bool) -> Result<()> {
    let config_path = project_config_path(dir);

    if config_path.exists() && !force {
        bail!(
            "Configuration file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!("Created {CONFIG_FILE_NAME}");
    println!("\nNext steps:");
    println!("  1. Edit {CONFIG_FILE_NAME} to configure rules");
    println!("  2. Run: hclint check");

    Ok(())
}
