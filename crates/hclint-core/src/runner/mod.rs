//! The interface rules use to query configuration and report issues.
//!
//! [`Runner`] has two implementations: [`LocalRunner`] works directly on a
//! loaded [`Module`](crate::module::Module), and the plugin crate's remote
//! runner forwards every call to the host over RPC. Rules only ever see
//! `&dyn Runner`.

mod annotation;
pub mod eval;
pub mod expand;
mod local;

pub use annotation::{find_ignore, Annotation};
pub use local::LocalRunner;

use crate::hclext::{
    BlockSchema, BodyContent, BodySchema, DecodeTarget, Diagnostics, Expression, Range,
    SourceFile,
};
use crate::module::ModulePath;
use crate::types::RuleMeta;
use hcl::edit::structure::Body;
use hcl::edit::Span;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether `count`/`for_each` are applied to the extracted blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpandMode {
    /// One block per instance; blocks that are not created are dropped.
    #[default]
    Expand,
    /// Blocks as written.
    None,
}

/// Which module a query targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleCtx {
    /// The module being inspected.
    #[default]
    This,
    /// The root module, e.g. for provider configuration.
    Root,
}

/// Options of [`Runner::get_module_content`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GetModuleContentOption {
    /// Target module.
    #[serde(default)]
    pub module_ctx: ModuleCtx,
    /// Expansion mode.
    #[serde(default)]
    pub expand_mode: ExpandMode,
    /// Keep blocks whose `count`/`for_each` is zero or unknown.
    #[serde(default)]
    pub include_not_created: bool,
}

impl GetModuleContentOption {
    /// Blocks as written, including those that are never created.
    #[must_use]
    pub fn literal() -> Self {
        Self {
            module_ctx: ModuleCtx::This,
            expand_mode: ExpandMode::None,
            include_not_created: true,
        }
    }
}

/// Options of [`Runner::evaluate_expr`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluateExprOption {
    /// Module whose variables are in scope.
    #[serde(default)]
    pub module_ctx: ModuleCtx,
}

/// Errors returned by [`Runner`] methods.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Content could not be extracted or decoded.
    #[error(transparent)]
    Diagnostics(#[from] Diagnostics),

    /// The expression depends on a value that is not known statically.
    #[error("{range}: value is not known until apply")]
    UnknownValue {
        /// Range of the expression.
        range: Range,
    },

    /// A requested entity does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The call could not be carried to the host.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Callback of [`Runner::walk_expressions`].
pub type ExpressionWalker<'a> = dyn FnMut(&Expression) -> Result<(), RunnerError> + 'a;

/// Queries configuration and collects issues for one module.
pub trait Runner: Send + Sync {
    /// Directory the run was started from.
    ///
    /// # Errors
    ///
    /// Returns a transport error for remote runners.
    fn get_original_wd(&self) -> Result<String, RunnerError>;

    /// Address of the module being inspected.
    ///
    /// # Errors
    ///
    /// Returns a transport error for remote runners.
    fn get_module_path(&self) -> Result<ModulePath, RunnerError>;

    /// Returns true when inspecting the root module.
    ///
    /// # Errors
    ///
    /// Returns a transport error for remote runners.
    fn is_root(&self) -> Result<bool, RunnerError> {
        Ok(self.get_module_path()?.is_root())
    }

    /// Extracts content matching `schema` from every file of the module and
    /// merges it. Unknown attributes and blocks are ignored.
    ///
    /// # Errors
    ///
    /// Returns diagnostics if matched content does not fit the schema.
    fn get_module_content(
        &self,
        schema: &BodySchema,
        opts: &GetModuleContentOption,
    ) -> Result<BodyContent, RunnerError>;

    /// Extracts `resource "<resource_type>" "<name>"` blocks whose bodies
    /// match `schema`.
    ///
    /// # Errors
    ///
    /// See [`Runner::get_module_content`].
    fn get_resource_content(
        &self,
        resource_type: &str,
        schema: &BodySchema,
        opts: &GetModuleContentOption,
    ) -> Result<BodyContent, RunnerError> {
        let outer = BodySchema::new().block(
            BlockSchema::new("resource")
                .labels(&["type", "name"])
                .body(schema.clone()),
        );
        let mut content = self.get_module_content(&outer, opts)?;
        content
            .blocks
            .retain(|b| b.labels.first().is_some_and(|t| t == resource_type));
        Ok(content)
    }

    /// Extracts `provider "<name>"` blocks of the root module whose bodies
    /// match `schema`.
    ///
    /// # Errors
    ///
    /// See [`Runner::get_module_content`].
    fn get_provider_content(
        &self,
        name: &str,
        schema: &BodySchema,
        opts: &GetModuleContentOption,
    ) -> Result<BodyContent, RunnerError> {
        let outer = BodySchema::new().block(
            BlockSchema::new("provider")
                .labels(&["name"])
                .body(schema.clone()),
        );
        let opts = GetModuleContentOption {
            module_ctx: ModuleCtx::Root,
            ..*opts
        };
        let mut content = self.get_module_content(&outer, &opts)?;
        content
            .blocks
            .retain(|b| b.labels.first().is_some_and(|n| n == name));
        Ok(content)
    }

    /// Returns one file of the module.
    ///
    /// # Errors
    ///
    /// Returns a transport error for remote runners.
    fn get_file(&self, name: &str) -> Result<Option<SourceFile>, RunnerError>;

    /// Returns every file of the module by name.
    ///
    /// # Errors
    ///
    /// Returns a transport error for remote runners.
    fn get_files(&self) -> Result<BTreeMap<String, SourceFile>, RunnerError>;

    /// Calls `walker` with every attribute expression of the module,
    /// including those nested in blocks, in file order. The first error
    /// returned by `walker` stops the walk and is returned.
    ///
    /// # Errors
    ///
    /// Returns syntax diagnostics or the walker's error.
    fn walk_expressions(&self, walker: &mut ExpressionWalker<'_>) -> Result<(), RunnerError> {
        for file in self.get_files()?.values() {
            let body = file.parse()?;
            walk_body(&body, file, walker)?;
        }
        Ok(())
    }

    /// Returns the `rule "<name>"` block of the configuration, extracted with
    /// `schema`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns diagnostics if the block does not fit the schema.
    fn get_rule_config_content(
        &self,
        name: &str,
        schema: &BodySchema,
    ) -> Result<Option<BodyContent>, RunnerError>;

    /// Decodes the `rule "<name>"` block into `target`. Fields the block
    /// does not set keep their current values.
    ///
    /// # Errors
    ///
    /// Returns diagnostics if the block does not fit the target.
    fn decode_rule_config(
        &self,
        name: &str,
        target: &mut dyn DecodeTarget,
    ) -> Result<(), RunnerError> {
        let Some(content) = self.get_rule_config_content(name, &target.schema())? else {
            return Ok(());
        };
        let diags = target.decode_content(&content, None);
        if diags.has_errors() {
            return Err(diags.into());
        }
        Ok(())
    }

    /// Evaluates an expression with the module's statically known values.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::UnknownValue`] if the value depends on
    /// something only known at apply time.
    fn evaluate_expr(
        &self,
        expr: &Expression,
        opts: &EvaluateExprOption,
    ) -> Result<hcl::Value, RunnerError>;

    /// Records an issue. Reporting the same issue twice has no effect, and
    /// a default range reports an issue not tied to a file.
    ///
    /// # Errors
    ///
    /// Returns a transport error for remote runners.
    fn emit_issue(&self, rule: &RuleMeta, message: &str, range: &Range) -> Result<(), RunnerError>;
}

fn walk_body(
    body: &Body,
    file: &SourceFile,
    walker: &mut ExpressionWalker<'_>,
) -> Result<(), RunnerError> {
    for structure in body.iter() {
        if let Some(attr) = structure.as_attribute() {
            let span = attr.value.span().unwrap_or_default();
            walker(&Expression::from_span(file, span))?;
        } else if let Some(block) = structure.as_block() {
            walk_body(&block.body, file, walker)?;
        }
    }
    Ok(())
}
