//! A small rule set served as a plugin, used by the protocol tests.

use hclint_core::{
    BodyContent, BodySchema, BuiltinRuleSet, Decode, EvaluateExprOption, GetModuleContentOption,
    GlobalConfig, Rule, RuleBox, RuleError, RuleMeta, RuleSet, RuleSetError, Runner, Severity,
};
use hclint_plugin::{serve, ServeOpts};

/// Reports the instance type of every `aws_instance`.
struct InstanceType;

impl Rule for InstanceType {
    fn name(&self) -> &str {
        "testing_instance_type"
    }

    fn severity(&self) -> Severity {
        Severity::Notice
    }

    fn check(&self, runner: &dyn Runner) -> Result<(), RuleError> {
        let content = runner.get_resource_content(
            "aws_instance",
            &BodySchema::new().attribute("instance_type"),
            &GetModuleContentOption::default(),
        )?;
        for block in &content.blocks {
            let Some(attr) = block.body.attribute("instance_type") else {
                continue;
            };
            let value = runner.evaluate_expr(&attr.expr, &EvaluateExprOption::default())?;
            if let hcl::Value::String(instance_type) = value {
                runner.emit_issue(
                    &RuleMeta::of(self),
                    &format!("instance type is {instance_type}"),
                    attr.expr.range(),
                )?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Decode)]
struct ForbiddenVariablesConfig {
    #[hcl(attr = "names")]
    names: Option<Vec<String>>,
}

/// Reports variables whose names are listed in the rule's config.
struct ForbiddenVariables;

impl Rule for ForbiddenVariables {
    fn name(&self) -> &str {
        "testing_forbidden_variables"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, runner: &dyn Runner) -> Result<(), RuleError> {
        let mut config = ForbiddenVariablesConfig::default();
        runner.decode_rule_config(self.name(), &mut config)?;
        let names = config.names.unwrap_or_default();

        let schema = BodySchema::new().block(hclint_core::BlockSchema::new("variable").labels(&["name"]));
        let content = runner.get_module_content(&schema, &GetModuleContentOption::default())?;
        for block in &content.blocks {
            let name = &block.labels[0];
            if names.contains(name) {
                runner.emit_issue(
                    &RuleMeta::of(self),
                    &format!("variable \"{name}\" is forbidden"),
                    &block.def_range,
                )?;
            }
        }
        Ok(())
    }
}

/// Always fails; off unless enabled.
struct AlwaysFails;

impl Rule for AlwaysFails {
    fn name(&self) -> &str {
        "testing_always_fails"
    }

    fn enabled(&self) -> bool {
        false
    }

    fn check(&self, _runner: &dyn Runner) -> Result<(), RuleError> {
        Err(RuleError::Custom("this rule always fails".to_string()))
    }
}

#[derive(Debug, Default, Decode)]
struct PluginSettings {
    #[hcl(attr = "module_summary")]
    module_summary: Option<bool>,
}

/// The built-in rules plus a `module_summary` setting read from the
/// plugin block.
struct TestingRuleSet {
    rules: BuiltinRuleSet,
    module_summary: bool,
}

impl RuleSet for TestingRuleSet {
    fn rule_set_name(&self) -> &str {
        self.rules.rule_set_name()
    }

    fn rule_set_version(&self) -> &str {
        self.rules.rule_set_version()
    }

    fn rule_names(&self) -> Vec<String> {
        RuleSet::rule_names(&self.rules)
    }

    fn version_constraint(&self) -> Option<String> {
        RuleSet::version_constraint(&self.rules)
    }

    fn config_schema(&self) -> BodySchema {
        PluginSettings::implied_schema()
    }

    fn apply_global_config(&mut self, config: &GlobalConfig) -> Result<(), RuleSetError> {
        self.rules.apply_global_config(config)
    }

    fn apply_config(&mut self, content: &BodyContent) -> Result<(), RuleSetError> {
        let settings = PluginSettings::decode_body(content, None)?;
        self.module_summary = settings.module_summary.unwrap_or(false);
        Ok(())
    }

    fn check(&self, runner: &dyn Runner) -> Result<(), RuleSetError> {
        RuleSet::check(&self.rules, runner)?;
        if self.module_summary {
            let files = runner
                .get_files()
                .map_err(|err| RuleSetError::Remote(Box::new(err)))?;
            let meta = RuleMeta {
                name: "testing_module_summary".to_string(),
                severity: Severity::Notice,
                link: None,
            };
            runner
                .emit_issue(&meta, &format!("module has {} file(s)", files.len()), &Default::default())
                .map_err(|err| RuleSetError::Remote(Box::new(err)))?;
        }
        Ok(())
    }
}

fn main() {
    let rules = BuiltinRuleSet::new("testing", env!("CARGO_PKG_VERSION"))
        .version_constraint(">= 0.4.0")
        .rules([
            Box::new(InstanceType) as RuleBox,
            Box::new(ForbiddenVariables),
            Box::new(AlwaysFails),
        ]);
    serve(ServeOpts {
        rule_set: Box::new(TestingRuleSet {
            rules,
            module_summary: false,
        }),
    });
}
