//! Error types for the plugin protocol.

use crate::protocol::{Code, ErrorDetail, RpcError};
use hclint_core::{RuleSetError, RunnerError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors crossing the host/plugin boundary. Any of them is fatal for the
/// plugin it came from and for nothing else.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Spawning or talking to the plugin process failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The plugin did not complete the handshake.
    #[error("handshake with plugin failed: {0}")]
    Handshake(String),

    /// Host and plugin speak different protocol versions.
    #[error(
        "Incompatible plugin protocol: {plugin} speaks version {plugin_version}, \
         this hclint speaks version {host_version}. {remediation}"
    )]
    IncompatibleVersion {
        /// Plugin name.
        plugin: String,
        /// Protocol version of the plugin.
        plugin_version: u32,
        /// Protocol version of the host.
        host_version: u32,
        /// What to upgrade.
        remediation: &'static str,
    },

    /// The plugin's SDK is too old for this host.
    #[error(
        "Plugin \"{plugin}\" SDK version ({sdk_version}) is incompatible. \
         Compatible versions: >= {minimum}"
    )]
    IncompatibleSdk {
        /// Plugin name.
        plugin: String,
        /// SDK version the plugin reported.
        sdk_version: String,
        /// Oldest supported SDK version.
        minimum: &'static str,
    },

    /// The plugin requires another host version.
    #[error(
        "Failed to satisfy version constraints; hclint-ruleset-{plugin} requires \
         {constraint}, but hclint version is {host_version}"
    )]
    VersionConstraint {
        /// Plugin name.
        plugin: String,
        /// The plugin's requirement.
        constraint: String,
        /// This host's version.
        host_version: String,
    },

    /// The plugin reported a different name than it was started under.
    #[error("plugin \"{expected}\" reported its name as \"{actual}\"")]
    NameMismatch {
        /// Configured name.
        expected: String,
        /// Name the plugin reported.
        actual: String,
    },

    /// The peer answered with an error.
    #[error(transparent)]
    Status(#[from] RpcError),

    /// The connection closed before the call completed.
    #[error("connection to plugin closed")]
    Closed,

    /// The call did not complete in time.
    #[error("plugin call timed out after {0:?}")]
    Timeout(Duration),

    /// The plugin binary could not be found.
    #[error("plugin binary not found at {0}")]
    Missing(PathBuf),
}

impl ProtocolError {
    /// Status code of a peer error.
    #[must_use]
    pub fn code(&self) -> Option<Code> {
        match self {
            Self::Status(status) => Some(status.code),
            _ => None,
        }
    }
}

impl From<&RunnerError> for RpcError {
    fn from(err: &RunnerError) -> Self {
        match err {
            RunnerError::Diagnostics(diags) => RpcError::new(Code::InvalidArgument, diags.to_string())
                .with_detail(ErrorDetail::Diagnostics(diags.clone())),
            RunnerError::UnknownValue { range } => RpcError::new(Code::FailedPrecondition, err.to_string())
                .with_detail(ErrorDetail::UnknownValue(range.clone())),
            RunnerError::NotFound(what) => RpcError::new(Code::NotFound, what.clone()),
            RunnerError::Transport(message) => RpcError::new(Code::Internal, message.clone()),
        }
    }
}

impl From<ProtocolError> for RunnerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Status(status) => match status.detail {
                Some(ErrorDetail::Diagnostics(diags)) => RunnerError::Diagnostics(diags),
                Some(ErrorDetail::UnknownValue(range)) => RunnerError::UnknownValue { range },
                None if status.code == Code::NotFound => RunnerError::NotFound(status.message),
                None => RunnerError::Transport(status.message),
            },
            other => RunnerError::Transport(other.to_string()),
        }
    }
}

impl From<&RuleSetError> for RpcError {
    fn from(err: &RuleSetError) -> Self {
        match err {
            RuleSetError::RuleCheck { .. } => RpcError::new(Code::Aborted, err.to_string()),
            RuleSetError::Config(diags) => RpcError::new(Code::InvalidArgument, diags.to_string())
                .with_detail(ErrorDetail::Diagnostics(diags.clone())),
            RuleSetError::FailedPrecondition(message) => {
                RpcError::new(Code::FailedPrecondition, message.clone())
            }
            RuleSetError::DuplicateRule(_) | RuleSetError::Remote(_) => {
                RpcError::new(Code::Internal, err.to_string())
            }
        }
    }
}

impl From<ProtocolError> for RuleSetError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Status(RpcError {
                detail: Some(ErrorDetail::Diagnostics(diags)),
                ..
            }) => RuleSetError::Config(diags),
            other => RuleSetError::Remote(Box::new(other)),
        }
    }
}
