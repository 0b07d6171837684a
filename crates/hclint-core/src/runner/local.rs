//! In-process runner over a loaded module.

use super::annotation::find_ignore;
use super::eval::{EvalPaths, EvalScope};
use super::expand::expand_body;
use super::{
    EvaluateExprOption, ExpandMode, GetModuleContentOption, ModuleCtx, Runner, RunnerError,
};
use crate::config::Config;
use crate::hclext::{
    partial_content, BodyContent, BodySchema, Diagnostics, Expression, Range, SourceFile,
};
use crate::module::{Module, ModulePath};
use crate::types::{Issue, RuleMeta};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// A [`Runner`] working directly on a loaded [`Module`].
pub struct LocalRunner {
    module: Arc<Module>,
    root: Arc<Module>,
    config: Arc<Config>,
    original_wd: String,
    scope: EvalScope,
    root_scope: EvalScope,
    issues: Mutex<Vec<Issue>>,
}

impl LocalRunner {
    /// Creates a runner for `module`, a member of the tree rooted at `root`.
    #[must_use]
    pub fn new(
        module: Arc<Module>,
        root: Arc<Module>,
        config: Arc<Config>,
        original_wd: impl Into<String>,
    ) -> Self {
        let original_wd = original_wd.into();
        let paths = |m: &Module| EvalPaths {
            module: m.dir.clone(),
            root: root.dir.clone(),
            cwd: original_wd.clone(),
        };
        let scope = EvalScope::new(&module, paths(&module));
        let root_scope = if module.path.is_root() {
            scope.clone()
        } else {
            EvalScope::new(&root, paths(&root))
        };
        Self {
            module,
            root,
            config,
            original_wd,
            scope,
            root_scope,
            issues: Mutex::new(Vec::new()),
        }
    }

    /// Creates a runner for a single root module.
    #[must_use]
    pub fn for_root(module: Arc<Module>, config: Arc<Config>) -> Self {
        Self::new(Arc::clone(&module), module, config, ".")
    }

    /// Issues emitted so far.
    #[must_use]
    pub fn issues(&self) -> Vec<Issue> {
        self.lock_issues().clone()
    }

    /// Consumes the runner, returning its issues.
    #[must_use]
    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_issues(&self) -> std::sync::MutexGuard<'_, Vec<Issue>> {
        self.issues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn target(&self, ctx: ModuleCtx) -> (&Module, &EvalScope) {
        match ctx {
            ModuleCtx::This => (self.module.as_ref(), &self.scope),
            ModuleCtx::Root => (self.root.as_ref(), &self.root_scope),
        }
    }

    fn is_ignored(&self, rule: &str, range: &Range) -> bool {
        let file = self
            .module
            .file(&range.filename)
            .or_else(|| self.root.file(&range.filename));
        let Some(file) = file else {
            return false;
        };
        match find_ignore(&file.file.source, range.start.line, rule) {
            Some(annotation) => {
                debug!(rule, %range, reason = ?annotation.reason, "Issue ignored by annotation");
                true
            }
            None => false,
        }
    }
}

impl Runner for LocalRunner {
    fn get_original_wd(&self) -> Result<String, RunnerError> {
        Ok(self.original_wd.clone())
    }

    fn get_module_path(&self) -> Result<ModulePath, RunnerError> {
        Ok(self.module.path.clone())
    }

    fn get_module_content(
        &self,
        schema: &BodySchema,
        opts: &GetModuleContentOption,
    ) -> Result<BodyContent, RunnerError> {
        let (module, scope) = self.target(opts.module_ctx);
        let mut content = BodyContent::default();
        let mut diags = Diagnostics::new();
        for parsed in &module.files {
            let expanded = match opts.expand_mode {
                ExpandMode::Expand => Some(expand_body(
                    &parsed.body,
                    &parsed.file,
                    scope,
                    opts.include_not_created,
                )),
                ExpandMode::None => None,
            };
            let body = expanded.as_ref().map_or(&parsed.body, |e| &e.body);
            match partial_content(body, &parsed.file, schema) {
                Ok(mut file_content) => {
                    if let Some(expanded) = &expanded {
                        expanded.bind_instances(&mut file_content, schema);
                    }
                    content.merge(file_content);
                }
                Err(errs) => diags.extend(errs),
            }
        }
        if diags.has_errors() {
            return Err(diags.into());
        }
        Ok(content)
    }

    fn get_file(&self, name: &str) -> Result<Option<SourceFile>, RunnerError> {
        let file = self
            .module
            .file(name)
            .or_else(|| self.root.file(name))
            .map(|f| f.file.clone());
        Ok(file)
    }

    fn get_files(&self) -> Result<BTreeMap<String, SourceFile>, RunnerError> {
        Ok(self.module.source_files())
    }

    fn get_rule_config_content(
        &self,
        name: &str,
        schema: &BodySchema,
    ) -> Result<Option<BodyContent>, RunnerError> {
        Ok(self.config.rule_config_content(name, schema)?)
    }

    fn evaluate_expr(
        &self,
        expr: &Expression,
        opts: &EvaluateExprOption,
    ) -> Result<hcl::Value, RunnerError> {
        let (_, scope) = self.target(opts.module_ctx);
        scope.evaluate(expr)
    }

    fn emit_issue(&self, rule: &RuleMeta, message: &str, range: &Range) -> Result<(), RunnerError> {
        if self.is_ignored(&rule.name, range) {
            return Ok(());
        }
        let issue = Issue::new(rule.clone(), message, range.clone()).in_module(self.module.path.clone());
        let mut issues = self.lock_issues();
        if !issues.contains(&issue) {
            debug!(rule = %rule.name, %message, "Issue emitted");
            issues.push(issue);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hclext::BlockSchema;
    use crate::types::Severity;

    const MAIN: &str = r#"
variable "instances" {
  default = 2
}

locals {
  name = "web"
}

resource "aws_instance" "web" {
  count = var.instances
  ami   = "ami-123"
}

resource "aws_instance" "off" {
  count = 0
}

resource "aws_s3_bucket" "logs" {
  bucket = "${local.name}-logs"
}

provider "aws" {
  region = "us-east-1"
}
"#;

    fn runner_with(sources: &[(&str, &str)], config: Config) -> LocalRunner {
        let module =
            Module::from_sources(ModulePath::root(), ".", sources.iter().copied()).unwrap();
        LocalRunner::for_root(Arc::new(module), Arc::new(config))
    }

    fn runner() -> LocalRunner {
        runner_with(&[("main.tf", MAIN)], Config::default())
    }

    fn resource_schema() -> BodySchema {
        BodySchema::new().block(
            BlockSchema::new("resource")
                .labels(&["type", "name"])
                .body(BodySchema::new().attribute("ami")),
        )
    }

    fn meta() -> RuleMeta {
        RuleMeta {
            name: "test_rule".to_string(),
            severity: Severity::Warning,
            link: None,
        }
    }

    // --- content tests ---

    #[test]
    fn test_module_content_expanded() {
        let runner = runner();
        let content = runner
            .get_module_content(&resource_schema(), &GetModuleContentOption::default())
            .unwrap();
        let names: Vec<_> = content.blocks.iter().map(|b| b.labels[1].as_str()).collect();
        assert_eq!(names, vec!["web", "web", "logs"]);
    }

    #[test]
    fn test_module_content_literal() {
        let runner = runner();
        let content = runner
            .get_module_content(&resource_schema(), &GetModuleContentOption::literal())
            .unwrap();
        assert_eq!(content.blocks.len(), 3);
    }

    #[test]
    fn test_module_content_merges_files() {
        let runner = runner_with(
            &[
                ("a.tf", "variable \"a\" {}\n"),
                ("b.tf", "variable \"b\" {}\n"),
            ],
            Config::default(),
        );
        let schema = BodySchema::new().block(BlockSchema::new("variable").labels(&["name"]));
        let content = runner
            .get_module_content(&schema, &GetModuleContentOption::default())
            .unwrap();
        assert_eq!(content.blocks.len(), 2);
        assert_eq!(content.blocks[1].def_range.filename, "b.tf");
    }

    #[test]
    fn test_resource_and_provider_content() {
        let runner = runner();
        let content = runner
            .get_resource_content(
                "aws_s3_bucket",
                &BodySchema::new().attribute("bucket"),
                &GetModuleContentOption::default(),
            )
            .unwrap();
        assert_eq!(content.blocks.len(), 1);
        let bucket = &content.blocks[0].body.attributes["bucket"];
        let value = runner
            .evaluate_expr(&bucket.expr, &EvaluateExprOption::default())
            .unwrap();
        assert_eq!(value, hcl::Value::from("web-logs"));

        let providers = runner
            .get_provider_content(
                "aws",
                &BodySchema::new().attribute("region"),
                &GetModuleContentOption::default(),
            )
            .unwrap();
        assert_eq!(providers.blocks.len(), 1);
    }

    #[test]
    fn test_evaluate_expanded_instances() {
        let source = "resource \"aws_instance\" \"web\" {\n  count = 2\n  ami   = \"ami-${count.index}\"\n}\n";
        let runner = runner_with(&[("main.tf", source)], Config::default());
        let schema = BodySchema::new().attribute("ami");
        let evaluate = |opts: &GetModuleContentOption| -> Vec<Result<hcl::Value, RunnerError>> {
            runner
                .get_resource_content("aws_instance", &schema, opts)
                .unwrap()
                .blocks
                .iter()
                .map(|b| runner.evaluate_expr(&b.body.attributes["ami"].expr, &EvaluateExprOption::default()))
                .collect()
        };

        let values: Vec<_> = evaluate(&GetModuleContentOption::default())
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(
            values,
            vec![hcl::Value::from("ami-0"), hcl::Value::from("ami-1")]
        );

        let literal = evaluate(&GetModuleContentOption::literal());
        assert_eq!(literal.len(), 1);
        assert!(matches!(literal[0], Err(RunnerError::UnknownValue { .. })));
    }

    // --- walk tests ---

    #[test]
    fn test_walk_expressions() {
        let runner = runner();
        let mut sources = Vec::new();
        runner
            .walk_expressions(&mut |expr| {
                sources.push(expr.source().to_string());
                Ok(())
            })
            .unwrap();
        assert!(sources.contains(&"var.instances".to_string()));
        assert!(sources.contains(&"\"${local.name}-logs\"".to_string()));
        assert_eq!(sources.len(), 7);
    }

    #[test]
    fn test_walk_expressions_stops_on_error() {
        let runner = runner();
        let mut seen = 0;
        let result = runner.walk_expressions(&mut |_| {
            seen += 1;
            Err(RunnerError::NotFound("stop".to_string()))
        });
        assert!(matches!(result, Err(RunnerError::NotFound(_))));
        assert_eq!(seen, 1);
    }

    // --- issue tests ---

    #[test]
    fn test_emit_issue_is_idempotent() {
        let runner = runner();
        let file = runner.get_file("main.tf").unwrap().unwrap();
        let range = file.range_of(1..9);
        runner.emit_issue(&meta(), "message", &range).unwrap();
        runner.emit_issue(&meta(), "message", &range).unwrap();
        runner.emit_issue(&meta(), "file-less", &Range::default()).unwrap();
        let issues = runner.into_issues();
        assert_eq!(issues.len(), 2);
        assert!(issues[1].range.is_zero());
    }

    #[test]
    fn test_emit_issue_respects_annotation() {
        let source = "# hclint-ignore: test_rule\nvariable \"a\" {}\nvariable \"b\" {}\n";
        let runner = runner_with(&[("main.tf", source)], Config::default());
        let file = runner.get_file("main.tf").unwrap().unwrap();
        runner.emit_issue(&meta(), "a", &file.range_of(27..35)).unwrap();
        runner.emit_issue(&meta(), "b", &file.range_of(43..51)).unwrap();
        let issues = runner.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, "b");
    }

    #[test]
    fn test_decode_rule_config() {
        #[derive(Debug, Default, crate::Decode)]
        struct Options {
            #[hcl(attr = "exclude")]
            exclude: Option<Vec<String>>,
            #[hcl(attr = "limit")]
            limit: Option<u32>,
        }

        let config = Config::parse(
            ".hclint.hcl",
            "rule \"test_rule\" {\n  enabled = true\n  exclude = [\"a\"]\n}\n",
        )
        .unwrap();
        let runner = runner_with(&[("main.tf", "")], config);
        let mut options = Options {
            exclude: None,
            limit: Some(5),
        };
        runner.decode_rule_config("test_rule", &mut options).unwrap();
        assert_eq!(options.exclude, Some(vec!["a".to_string()]));
        assert_eq!(options.limit, Some(5));

        let mut untouched = Options::default();
        runner.decode_rule_config("other_rule", &mut untouched).unwrap();
        assert!(untouched.exclude.is_none());
    }

    #[test]
    fn test_root_module() {
        let runner = runner();
        assert!(runner.is_root().unwrap());
        assert_eq!(runner.get_original_wd().unwrap(), ".");
    }
}
