//! Integration test: a module tree on disk checked end-to-end via Analyzer.

use hclint_core::config::parse_variable;
use hclint_core::{
    Analyzer, AnalysisReport, BodySchema, BuiltinRuleSet, CallModuleType, Config,
    EvaluateExprOption, GetModuleContentOption, Rule, RuleBox, RuleError, RuleMeta, Runner,
};
use std::path::PathBuf;

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/project")
}

struct LegacyInstanceType;

impl Rule for LegacyInstanceType {
    fn name(&self) -> &str {
        "legacy_instance_type"
    }

    fn check(&self, runner: &dyn Runner) -> Result<(), RuleError> {
        let schema = BodySchema::new().attribute("instance_type");
        let content = runner.get_resource_content(
            "aws_instance",
            &schema,
            &GetModuleContentOption::default(),
        )?;
        for resource in &content.blocks {
            let Some(attr) = resource.body.attribute("instance_type") else {
                continue;
            };
            let value = runner.evaluate_expr(&attr.expr, &EvaluateExprOption::default())?;
            if value.as_str() == Some("t2.micro") {
                runner.emit_issue(
                    &RuleMeta::of(self),
                    "t2.micro is a previous generation instance type",
                    &attr.range,
                )?;
            }
        }
        Ok(())
    }
}

struct Unreachable;

impl Rule for Unreachable {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn check(&self, _runner: &dyn Runner) -> Result<(), RuleError> {
        Err(RuleError::Custom("backend unreachable".to_string()))
    }
}

fn rule_set(name: &str, rule: RuleBox) -> BuiltinRuleSet {
    BuiltinRuleSet::new(name, "0.1.0").rules([rule])
}

fn analyze(config: Config, rule_sets: Vec<BuiltinRuleSet>) -> AnalysisReport {
    let root = fixture_root();
    let mut builder = Analyzer::builder()
        .root(&root)
        .original_wd(&root)
        .config(config);
    for set in rule_sets {
        builder = builder.rule_set(set);
    }
    let mut analyzer = builder.build().unwrap();
    analyzer.analyze().unwrap()
}

fn locations(report: &AnalysisReport) -> Vec<(String, String)> {
    report
        .issues
        .iter()
        .map(|issue| (issue.module.to_string(), issue.to_string()))
        .collect()
}

// --- module tree tests ---

#[test]
fn checks_root_and_local_child_module() {
    let report = analyze(
        Config::default(),
        vec![rule_set("legacy", Box::new(LegacyInstanceType))],
    );
    assert!(!report.has_failures());
    let lines: Vec<String> = locations(&report)
        .into_iter()
        .map(|(module, issue)| format!("[{module}] {issue}"))
        .collect();
    insta::assert_snapshot!(lines.join("\n"), @r"
    [root] main.tf:6:3: error - t2.micro is a previous generation instance type (legacy_instance_type)
    [module.network] modules/network/main.tf:4:3: error - t2.micro is a previous generation instance type (legacy_instance_type)
    ");
}

#[test]
fn call_module_type_none_skips_children() {
    let config = Config {
        call_module_type: CallModuleType::None,
        ..Config::default()
    };
    let report = analyze(config, vec![rule_set("legacy", Box::new(LegacyInstanceType))]);
    let files: Vec<_> = report.issues.iter().map(|i| i.range.filename.as_str()).collect();
    assert_eq!(files, vec!["main.tf"]);
}

#[test]
fn root_variables_override_defaults() {
    let (name, value) = parse_variable("instance_type=t3.micro").unwrap();
    let mut config = Config::default();
    config.variables.insert(name, value);
    let report = analyze(config, vec![rule_set("legacy", Box::new(LegacyInstanceType))]);
    let files: Vec<_> = report.issues.iter().map(|i| i.range.filename.as_str()).collect();
    assert_eq!(files, vec!["modules/network/main.tf"]);
}

// --- rule selection tests ---

#[test]
fn disabled_rule_reports_nothing() {
    let config = Config::parse(
        ".hclint.hcl",
        "rule \"legacy_instance_type\" {\n  enabled = false\n}\n",
    )
    .unwrap();
    let report = analyze(config, vec![rule_set("legacy", Box::new(LegacyInstanceType))]);
    assert!(!report.has_issues());
}

// --- failure isolation tests ---

#[test]
fn failing_rule_set_does_not_hide_other_issues() {
    let report = analyze(
        Config::default(),
        vec![
            rule_set("broken", Box::new(Unreachable)),
            rule_set("legacy", Box::new(LegacyInstanceType)),
        ],
    );
    assert_eq!(report.issues.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].rule_set, "broken");
    assert!(report.failures[0].message.contains("backend unreachable"));
}
