//! Static evaluation scope of one module.
//!
//! Values come from input variables (caller-supplied, falling back to
//! `default`), `locals` blocks, `path.*`, `terraform.workspace` and the
//! `count` / `each` values bound to expanded instances. Anything else, such
//! as resource attributes, is unknown until apply time.

use super::RunnerError;
use crate::hclext::{BlockSchema, BodySchema, Expression, Step};
use crate::hclext::{partial_content, Diagnostics};
use crate::module::Module;
use hcl::eval::Context;
use hcl::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Directories exposed as `path.module`, `path.root` and `path.cwd`.
#[derive(Debug, Clone, Default)]
pub struct EvalPaths {
    /// Directory of the module being evaluated.
    pub module: String,
    /// Directory of the root module.
    pub root: String,
    /// Working directory the run was started from.
    pub cwd: String,
}

/// Known values of one module.
#[derive(Debug, Clone, Default)]
pub struct EvalScope {
    vars: Map<String, Value>,
    locals: Map<String, Value>,
    paths: EvalPaths,
    workspace: String,
}

impl EvalScope {
    /// Builds the scope of `module`.
    #[must_use]
    pub fn new(module: &Module, paths: EvalPaths) -> Self {
        let mut scope = Self {
            vars: Map::new(),
            locals: Map::new(),
            paths,
            workspace: std::env::var("TF_WORKSPACE").unwrap_or_else(|_| "default".to_string()),
        };
        scope.vars = scope.resolve_variables(module);
        scope.locals = scope.resolve_locals(module);
        debug!(
            module = %module.path,
            vars = scope.vars.len(),
            locals = scope.locals.len(),
            "Built evaluation scope"
        );
        scope
    }

    /// Builds an `hcl` evaluation context holding every known value.
    #[must_use]
    pub fn context(&self) -> Context<'static> {
        let mut ctx = Context::new();
        ctx.declare_var("var", Value::Object(self.vars.clone()));
        ctx.declare_var("local", Value::Object(self.locals.clone()));
        let mut path = Map::new();
        path.insert("module".to_string(), Value::from(self.paths.module.as_str()));
        path.insert("root".to_string(), Value::from(self.paths.root.as_str()));
        path.insert("cwd".to_string(), Value::from(self.paths.cwd.as_str()));
        ctx.declare_var("path", Value::Object(path));
        let mut terraform = Map::new();
        terraform.insert("workspace".to_string(), Value::from(self.workspace.as_str()));
        ctx.declare_var("terraform", Value::Object(terraform));
        ctx
    }

    /// Evaluates an expression against the known values.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::UnknownValue`] when the expression depends on
    /// a value that is not statically known, or the evaluation diagnostics.
    pub fn evaluate(&self, expr: &Expression) -> Result<Value, RunnerError> {
        if !self.is_known(expr) {
            return Err(RunnerError::UnknownValue {
                range: expr.range().clone(),
            });
        }
        Ok(expr.evaluate(&self.context())?)
    }

    fn is_known(&self, expr: &Expression) -> bool {
        expr.variables().iter().all(|traversal| {
            let attr = traversal.steps.first().and_then(Step::attr_name);
            match traversal.root_name() {
                "var" => attr.is_some_and(|name| self.vars.contains_key(name)),
                "local" => attr.is_some_and(|name| self.locals.contains_key(name)),
                "path" | "terraform" => true,
                "count" | "each" => expr.bindings().contains_key(traversal.root_name()),
                _ => false,
            }
        })
    }

    fn resolve_variables(&self, module: &Module) -> Map<String, Value> {
        let schema = BodySchema::new().block(
            BlockSchema::new("variable")
                .labels(&["name"])
                .body(BodySchema::new().attribute("default")),
        );
        let empty = Context::new();
        let mut vars = Map::new();
        for parsed in &module.files {
            let Ok(content) = partial_content(&parsed.body, &parsed.file, &schema) else {
                continue;
            };
            for block in content.blocks {
                let Some(name) = block.labels.first() else {
                    continue;
                };
                if let Some(value) = module.inputs.get(name) {
                    vars.insert(name.clone(), value.clone());
                } else if let Some(default) = block.body.attribute("default") {
                    if let Ok(value) = default.expr.evaluate(&empty) {
                        vars.insert(name.clone(), value);
                    }
                }
            }
        }
        vars
    }

    fn resolve_locals(&self, module: &Module) -> Map<String, Value> {
        let schema = BodySchema::new()
            .block(BlockSchema::new("locals").body(BodySchema::just_attributes()));
        let mut pending: BTreeMap<String, Expression> = BTreeMap::new();
        for parsed in &module.files {
            let content = match partial_content(&parsed.body, &parsed.file, &schema) {
                Ok(content) => content,
                Err(diags) => {
                    log_skipped(&diags);
                    continue;
                }
            };
            for block in content.blocks {
                for (name, attr) in block.body.attributes {
                    pending.insert(name, attr.expr);
                }
            }
        }

        // Locals may refer to each other in any order; resolve until no
        // further progress is made.
        let mut scope = Self {
            vars: self.vars.clone(),
            locals: Map::new(),
            paths: self.paths.clone(),
            workspace: self.workspace.clone(),
        };
        loop {
            let mut resolved = BTreeSet::new();
            for (name, expr) in &pending {
                if let Ok(value) = scope.evaluate(expr) {
                    scope.locals.insert(name.clone(), value);
                    resolved.insert(name.clone());
                }
            }
            if resolved.is_empty() {
                break;
            }
            pending.retain(|name, _| !resolved.contains(name));
        }
        scope.locals
    }
}

fn log_skipped(diags: &Diagnostics) {
    debug!(%diags, "Skipping locals that cannot be extracted");
}
