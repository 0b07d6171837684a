//! # hclint-core
//!
//! Core framework for linting Terraform configuration written in HCL.
//!
//! This crate provides:
//!
//! - [`hclext`]: a finite, serializable content model ([`BodySchema`],
//!   [`BodyContent`]) extracted from parsed HCL bodies, and the [`Decode`]
//!   trait that turns content into typed values
//! - [`Runner`]: the interface rules use to query a module and emit issues
//! - [`Rule`] and [`RuleSet`] for writing checks
//! - [`lang`]: reference and provider resolution
//! - [`Analyzer`] for orchestrating a run
//!
//! ## Example
//!
//! ```ignore
//! use hclint_core::{Analyzer, BuiltinRuleSet};
//!
//! let mut analyzer = Analyzer::builder()
//!     .root("./infra")
//!     .rule_set(BuiltinRuleSet::new("mine", "0.1.0").rules([Box::new(MyRule) as _]))
//!     .build()?;
//!
//! let report = analyzer.analyze()?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

extern crate self as hclint_core;

mod analyzer;
pub mod config;
pub mod hclext;
pub mod helper;
pub mod lang;
pub mod module;
mod rule;
pub mod ruleset;
pub mod runner;
mod types;

pub use hcl;

pub use analyzer::{Analyzer, AnalyzerBuilder, AnalyzerError};
pub use config::{Config, ConfigError};
pub use hclext::{
    Attribute, Block, BlockSchema, BodyContent, BodySchema, Decode, DecodeTarget, Diagnostic,
    Diagnostics, Expression, Range, SourceFile,
};
pub use module::{CallModuleType, LoadError, Module, ModuleLoader, ModulePath};
pub use rule::{Rule, RuleBox, RuleError};
pub use ruleset::{
    BuiltinRuleSet, GlobalConfig, RuleRegistry, RuleSet, RuleSetError, RuleSetHandle,
};
pub use runner::{
    EvaluateExprOption, ExpandMode, GetModuleContentOption, LocalRunner, ModuleCtx, Runner,
    RunnerError,
};
pub use types::{
    AnalysisReport, Issue, IssueDiagnostic, RuleMeta, RuleSetFailure, Severity,
};
