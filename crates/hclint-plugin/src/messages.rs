//! Parameters of the rule set and runner methods.

use hclint_core::{
    BodyContent, BodySchema, EvaluateExprOption, Expression, GetModuleContentOption,
    GlobalConfig, Range, RuleMeta,
};
use serde::{Deserialize, Serialize};

/// `Check`: the stream of the runner the plugin should call back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckParams {
    /// Broker ID of the host's runner server.
    pub broker_id: u32,
}

/// `ApplyGlobalConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyGlobalConfigParams {
    /// Host-wide settings.
    pub config: GlobalConfig,
}

/// `ApplyConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyConfigParams {
    /// The plugin block, extracted with the plugin's config schema.
    pub content: BodyContent,
}

/// `GetModuleContent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetModuleContentParams {
    /// What to extract.
    pub schema: BodySchema,
    /// How to extract it.
    #[serde(default)]
    pub option: GetModuleContentOption,
}

/// `GetFile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileParams {
    /// File name.
    pub name: String,
}

/// `GetRuleConfigContent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRuleConfigContentParams {
    /// Rule name.
    pub name: String,
    /// Schema of the rule's config.
    pub schema: BodySchema,
}

/// `EvaluateExpr`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateExprParams {
    /// Expression source and range.
    pub expr: Expression,
    /// Evaluation options.
    #[serde(default)]
    pub option: EvaluateExprOption,
}

/// `EmitIssue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitIssueParams {
    /// Rule that found the issue.
    pub rule: RuleMeta,
    /// Message.
    pub message: String,
    /// Where.
    pub range: Range,
}
