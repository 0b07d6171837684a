//! Helpers for testing rules against in-memory configuration.
//!
//! ```ignore
//! let runner = helper::test_runner(&[("main.tf", r#"variable "x" {}"#)])?;
//! MyRule.check(&runner)?;
//! helper::assert_issues(&runner.issues(), &[
//!     ("my_rule", "variable \"x\" is bad", "main.tf:1,1-13"),
//! ]);
//! ```

use crate::config::Config;
use crate::module::{LoadError, Module, ModulePath};
use crate::runner::LocalRunner;
use crate::types::Issue;
use std::sync::Arc;

/// Builds a runner for a root module made of `files`, with default config.
///
/// # Errors
///
/// Returns the syntax diagnostics of files that fail to parse.
pub fn test_runner(files: &[(&str, &str)]) -> Result<LocalRunner, LoadError> {
    test_runner_with_config(files, Config::default())
}

/// Builds a runner for a root module made of `files`.
///
/// # Errors
///
/// Returns the syntax diagnostics of files that fail to parse.
pub fn test_runner_with_config(
    files: &[(&str, &str)],
    config: Config,
) -> Result<LocalRunner, LoadError> {
    let module = Module::from_sources(ModulePath::root(), ".", files.iter().copied())?;
    Ok(LocalRunner::for_root(Arc::new(module), Arc::new(config)))
}

/// Asserts that `actual` holds exactly the `(rule, message, range)` issues
/// in `expected`, in any order. Ranges are written as `file:line,col-col`,
/// or empty for issues not tied to a file.
///
/// # Panics
///
/// Panics with both lists if they differ.
pub fn assert_issues(actual: &[Issue], expected: &[(&str, &str, &str)]) {
    let mut actual: Vec<(String, String, String)> = actual
        .iter()
        .map(|issue| {
            let range = if issue.range.is_zero() {
                String::new()
            } else {
                issue.range.to_string()
            };
            (issue.rule.name.clone(), issue.message.clone(), range)
        })
        .collect();
    let mut expected: Vec<(String, String, String)> = expected
        .iter()
        .map(|(rule, message, range)| {
            ((*rule).to_string(), (*message).to_string(), (*range).to_string())
        })
        .collect();
    actual.sort();
    expected.sort();
    assert_eq!(actual, expected, "issues differ");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Runner;
    use crate::types::{RuleMeta, Severity};

    #[test]
    fn test_runner_and_assert() {
        let runner = test_runner(&[("main.tf", "variable \"x\" {}\n")]).unwrap();
        let file = runner.get_file("main.tf").unwrap().unwrap();
        let meta = RuleMeta {
            name: "example".to_string(),
            severity: Severity::Notice,
            link: None,
        };
        runner.emit_issue(&meta, "here", &file.range_of(0..12)).unwrap();
        runner.emit_issue(&meta, "nowhere", &Default::default()).unwrap();
        assert_issues(
            &runner.issues(),
            &[
                ("example", "nowhere", ""),
                ("example", "here", "main.tf:1,1-13"),
            ],
        );
    }
}
