//! Shared output formatting for lint results.

use anyhow::Result;
use hclint_core::{AnalysisReport, Issue, IssueDiagnostic, Severity};
use miette::NamedSource;
use std::path::Path;

use crate::OutputFormat;

/// Print a report in the specified format. File snippets in text output are
/// read relative to `working_dir`.
pub fn print(report: &AnalysisReport, format: OutputFormat, working_dir: &Path) -> Result<()> {
    match format {
        OutputFormat::Text => print_text(report, working_dir),
        OutputFormat::Json => return print_json(report),
        OutputFormat::Compact => print_compact(report),
    }
    Ok(())
}

fn severity_indicator(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "\x1b[31merror\x1b[0m",
        Severity::Warning => "\x1b[33mwarning\x1b[0m",
        Severity::Notice => "\x1b[34mnotice\x1b[0m",
    }
}

fn snippet(issue: &Issue, working_dir: &Path) -> Option<String> {
    let source = std::fs::read_to_string(working_dir.join(&issue.range.filename)).ok()?;
    let report = miette::Report::new(IssueDiagnostic::from(issue))
        .with_source_code(NamedSource::new(issue.range.filename.clone(), source));
    Some(format!("{report:?}"))
}

fn print_text(report: &AnalysisReport, working_dir: &Path) {
    let (errors, warnings, notices) = report.count_by_severity();

    for issue in &report.issues {
        println!(
            "{}: {} ({})",
            severity_indicator(issue.severity()),
            issue.message,
            issue.rule.name
        );
        if !issue.range.is_zero() {
            println!(
                "  on {} line {}:",
                issue.range.filename, issue.range.start.line
            );
            if let Some(snippet) = snippet(issue, working_dir) {
                println!("{snippet}");
            }
        }
        if !issue.module.is_root() {
            println!("  in {}", issue.module);
        }
        if let Some(link) = &issue.rule.link {
            println!("  = see: {link}");
        }
        println!();
    }
    print_failures(report);

    let summary_color = if errors > 0 {
        "\x1b[31m"
    } else if warnings > 0 {
        "\x1b[33m"
    } else {
        "\x1b[32m"
    };

    println!(
        "{summary_color}{} issue(s) found: {errors} error(s), {warnings} warning(s), {notices} notice(s)\x1b[0m",
        report.issues.len()
    );
}

fn print_json(report: &AnalysisReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    println!("{json}");
    Ok(())
}

fn print_compact(report: &AnalysisReport) {
    for issue in &report.issues {
        println!("{issue}");
    }
    print_failures(report);
}

fn print_failures(report: &AnalysisReport) {
    for failure in &report.failures {
        eprintln!("Failed to check ruleset. {failure}");
    }
}
