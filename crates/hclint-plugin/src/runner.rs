//! Both halves of the runner service.
//!
//! The host serves its [`Runner`] to the plugin for the duration of one
//! `Check` with [`RunnerServer`]; inside the plugin, rules receive a
//! [`RemoteRunner`] that turns every call into a request on that stream.

use crate::messages::{
    EmitIssueParams, EvaluateExprParams, GetFileParams, GetModuleContentParams,
    GetRuleConfigContentParams,
};
use crate::protocol::{self, params, to_result, Request, RpcError};
use crate::transport::Connection;
use hclint_core::{
    BodyContent, BodySchema, EvaluateExprOption, Expression, GetModuleContentOption, ModulePath,
    Range, RuleMeta, Runner, RunnerError, SourceFile,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Serves a host-side [`Runner`] to a plugin.
pub struct RunnerServer<'a> {
    runner: &'a dyn Runner,
}

impl<'a> RunnerServer<'a> {
    /// Wraps `runner`.
    #[must_use]
    pub fn new(runner: &'a dyn Runner) -> Self {
        Self { runner }
    }

    /// Dispatches one request.
    ///
    /// # Errors
    ///
    /// Returns the runner's error, converted for the wire.
    pub fn handle(&self, request: &Request) -> Result<Value, RpcError> {
        debug!(method = %request.method, stream = request.stream, "Runner call");
        let runner = self.runner;
        match request.method.as_str() {
            protocol::runner::GET_ORIGINAL_WD => to_result(&runner.get_original_wd().map_err(rpc)?),
            protocol::runner::GET_MODULE_PATH => to_result(&runner.get_module_path().map_err(rpc)?),
            protocol::runner::GET_MODULE_CONTENT => {
                let p: GetModuleContentParams = params(request)?;
                to_result(&runner.get_module_content(&p.schema, &p.option).map_err(rpc)?)
            }
            protocol::runner::GET_FILE => {
                let p: GetFileParams = params(request)?;
                to_result(&runner.get_file(&p.name).map_err(rpc)?)
            }
            protocol::runner::GET_FILES => to_result(&runner.get_files().map_err(rpc)?),
            protocol::runner::GET_RULE_CONFIG_CONTENT => {
                let p: GetRuleConfigContentParams = params(request)?;
                to_result(&runner.get_rule_config_content(&p.name, &p.schema).map_err(rpc)?)
            }
            protocol::runner::EVALUATE_EXPR => {
                let p: EvaluateExprParams = params(request)?;
                to_result(&runner.evaluate_expr(&p.expr, &p.option).map_err(rpc)?)
            }
            protocol::runner::EMIT_ISSUE => {
                let p: EmitIssueParams = params(request)?;
                runner.emit_issue(&p.rule, &p.message, &p.range).map_err(rpc)?;
                Ok(Value::Null)
            }
            other => Err(RpcError::unimplemented(other)),
        }
    }
}

fn rpc(err: RunnerError) -> RpcError {
    RpcError::from(&err)
}

/// A [`Runner`] that forwards every call to the host.
///
/// Calls block the calling thread, so rules using it must run outside the
/// async runtime (the plugin server runs checks on `spawn_blocking`).
pub struct RemoteRunner {
    conn: Arc<Connection>,
    stream: u32,
}

impl RemoteRunner {
    /// Creates a runner calling the host's runner server on `stream`.
    #[must_use]
    pub fn new(conn: Arc<Connection>, stream: u32) -> Self {
        Self { conn, stream }
    }

    fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RunnerError> {
        let value = self.conn.call_blocking(self.stream, method, params)?;
        serde_json::from_value(value)
            .map_err(|err| RunnerError::Transport(format!("invalid {method} response: {err}")))
    }
}

fn encode<T: Serialize>(params: &T) -> Result<Value, RunnerError> {
    serde_json::to_value(params).map_err(|err| RunnerError::Transport(err.to_string()))
}

impl Runner for RemoteRunner {
    fn get_original_wd(&self) -> Result<String, RunnerError> {
        self.call(protocol::runner::GET_ORIGINAL_WD, Value::Null)
    }

    fn get_module_path(&self) -> Result<ModulePath, RunnerError> {
        self.call(protocol::runner::GET_MODULE_PATH, Value::Null)
    }

    fn get_module_content(
        &self,
        schema: &BodySchema,
        opts: &GetModuleContentOption,
    ) -> Result<BodyContent, RunnerError> {
        let params = encode(&GetModuleContentParams {
            schema: schema.clone(),
            option: *opts,
        })?;
        self.call(protocol::runner::GET_MODULE_CONTENT, params)
    }

    fn get_file(&self, name: &str) -> Result<Option<SourceFile>, RunnerError> {
        let params = encode(&GetFileParams {
            name: name.to_string(),
        })?;
        self.call(protocol::runner::GET_FILE, params)
    }

    fn get_files(&self) -> Result<BTreeMap<String, SourceFile>, RunnerError> {
        self.call(protocol::runner::GET_FILES, Value::Null)
    }

    fn get_rule_config_content(
        &self,
        name: &str,
        schema: &BodySchema,
    ) -> Result<Option<BodyContent>, RunnerError> {
        let params = encode(&GetRuleConfigContentParams {
            name: name.to_string(),
            schema: schema.clone(),
        })?;
        self.call(protocol::runner::GET_RULE_CONFIG_CONTENT, params)
    }

    fn evaluate_expr(
        &self,
        expr: &Expression,
        opts: &EvaluateExprOption,
    ) -> Result<hcl::Value, RunnerError> {
        let params = encode(&EvaluateExprParams {
            expr: expr.clone(),
            option: *opts,
        })?;
        self.call(protocol::runner::EVALUATE_EXPR, params)
    }

    fn emit_issue(&self, rule: &RuleMeta, message: &str, range: &Range) -> Result<(), RunnerError> {
        let params = encode(&EmitIssueParams {
            rule: rule.clone(),
            message: message.to_string(),
            range: range.clone(),
        })?;
        let _: Value = self.call(protocol::runner::EMIT_ISSUE, params)?;
        Ok(())
    }
}
