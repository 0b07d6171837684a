//! List rules command implementation.

use anyhow::{Context, Result};
use hclint_core::RuleSetHandle;
use hclint_plugin::{plugin_dir, start_plugins, ClientOptions};
use std::path::Path;

use crate::config_resolver::ConfigSource;

/// One row of the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Row {
    name: String,
    enabled: String,
    severity: String,
    source: String,
}

fn builtin_rows() -> Vec<Row> {
    hclint_rules::all_rules()
        .iter()
        .map(|rule| Row {
            name: rule.name().to_string(),
            enabled: rule.enabled().to_string(),
            severity: rule.severity().to_string(),
            source: hclint_rules::RULE_SET_NAME.to_string(),
        })
        .collect()
}

fn plugin_rows(client: &mut dyn RuleSetHandle) -> Result<Vec<Row>> {
    let source = client.name().to_string();
    let names = client
        .rule_names()
        .with_context(|| format!("Failed to list rules of plugin \"{source}\""))?;
    Ok(names
        .into_iter()
        .map(|name| Row {
            name,
            enabled: "-".to_string(),
            severity: "-".to_string(),
            source: source.clone(),
        })
        .collect())
}

/// Runs the list-rules command.
pub fn run(source: &ConfigSource, plugin_dir_flag: Option<&Path>) -> Result<()> {
    let config = source.load()?;
    let dir = plugin_dir(plugin_dir_flag, &config);
    let plugins = start_plugins(&config, &dir, &ClientOptions::default())
        .context("Failed to initialize plugins")?;

    let mut rows = builtin_rows();
    for mut plugin in plugins {
        rows.extend(plugin_rows(&mut plugin)?);
    }

    println!("Available rules:\n");
    println!(
        "{:<40} {:<8} {:<9} Rule set",
        "Name", "Enabled", "Severity"
    );
    println!("{}", "-".repeat(80));
    for row in rows {
        println!(
            "{:<40} {:<8} {:<9} {}",
            row.name, row.enabled, row.severity, row.source
        );
    }

    println!("\nPresets:");
    println!("  all          - every built-in rule with its own default (default)");
    println!("  recommended  - rules enabled by default");
    println!("\nEnable or disable a rule in .hclint.hcl, e.g.:");
    println!("  rule \"terraform_documented_variables\" {{");
    println!("    enabled = true");
    println!("  }}");

    Ok(())
}
