//! Wire format shared by host and plugin.
//!
//! Every message is one line of JSON. A [`Request`] names the stream it is
//! addressed to: stream [`RULE_SET_STREAM`] is the plugin's rule set
//! service, every other stream is a runner server the host registered with
//! its broker for the duration of one `Check`.

use hclint_core::{Diagnostics, Range};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Environment variable the host sets before spawning a plugin.
pub const MAGIC_COOKIE_KEY: &str = "HCLINT_PLUGIN_MAGIC_COOKIE";

/// Value of [`MAGIC_COOKIE_KEY`].
pub const MAGIC_COOKIE_VALUE: &str = "3e6b1c4f7b5a8d2e9f0c1a6d4b7e2f8a";

/// Version of the methods and message shapes below. Bumped on any
/// incompatible change.
pub const PROTOCOL_VERSION: u32 = 1;

/// Version of this crate, reported by plugins as their SDK version.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Oldest plugin SDK the host still talks to.
pub const MIN_SDK_VERSION: &str = "0.4.0";

/// Stream of the rule set service.
pub const RULE_SET_STREAM: u32 = 0;

/// Printed by a plugin binary started by hand.
pub const NOT_A_COMMAND: &str =
    "This binary is a plugin. These are not meant to be executed directly.";

/// Rule set service methods (host calls plugin).
pub mod rule_set {
    /// Returns the rule set name.
    pub const GET_NAME: &str = "GetName";
    /// Returns the rule set version.
    pub const GET_VERSION: &str = "GetVersion";
    /// Returns every rule name.
    pub const GET_RULE_NAMES: &str = "GetRuleNames";
    /// Returns the semver requirement on the host.
    pub const GET_VERSION_CONSTRAINT: &str = "GetVersionConstraint";
    /// Returns the SDK version the plugin was built with.
    pub const GET_SDK_VERSION: &str = "GetSDKVersion";
    /// Returns the schema of the plugin's config block.
    pub const GET_CONFIG_SCHEMA: &str = "GetConfigSchema";
    /// Applies host-wide settings.
    pub const APPLY_GLOBAL_CONFIG: &str = "ApplyGlobalConfig";
    /// Applies the plugin's own config block.
    pub const APPLY_CONFIG: &str = "ApplyConfig";
    /// Runs the enabled rules against the runner named by the broker ID.
    pub const CHECK: &str = "Check";
}

/// Runner service methods (plugin calls host).
pub mod runner {
    /// Returns the working directory.
    pub const GET_ORIGINAL_WD: &str = "GetOriginalwd";
    /// Returns the module path.
    pub const GET_MODULE_PATH: &str = "GetModulePath";
    /// Extracts module content.
    pub const GET_MODULE_CONTENT: &str = "GetModuleContent";
    /// Returns one file.
    pub const GET_FILE: &str = "GetFile";
    /// Returns every file.
    pub const GET_FILES: &str = "GetFiles";
    /// Extracts a rule's config block.
    pub const GET_RULE_CONFIG_CONTENT: &str = "GetRuleConfigContent";
    /// Evaluates an expression.
    pub const EVALUATE_EXPR: &str = "EvaluateExpr";
    /// Records an issue.
    pub const EMIT_ISSUE: &str = "EmitIssue";
}

/// A call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Sender-local request ID, echoed by the response.
    pub id: u64,
    /// Service the call is addressed to.
    pub stream: u32,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// ID of the request.
    pub id: u64,
    /// Stream of the request.
    pub stream: u32,
    /// Result if the call succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error if the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Builds a response from a handler result.
    #[must_use]
    pub fn new(stream: u32, id: u64, result: Result<Value, RpcError>) -> Self {
        match result {
            Ok(value) => Self {
                id,
                stream,
                result: Some(value),
                error: None,
            },
            Err(error) => Self {
                id,
                stream,
                result: None,
                error: Some(error),
            },
        }
    }

    /// Returns the result, or the error the peer sent.
    ///
    /// # Errors
    ///
    /// Returns the peer's error.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// One line on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    /// A call. Tried first since only requests carry `method`.
    Request(Request),
    /// An answer.
    Response(Response),
}

/// Status code of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Code {
    /// The parameters are malformed or the content does not fit.
    InvalidArgument,
    /// The call was made out of order or the state does not allow it.
    FailedPrecondition,
    /// The requested file, stream or config does not exist.
    NotFound,
    /// A rule failed; the check was abandoned.
    Aborted,
    /// The method is unknown.
    Unimplemented,
    /// Anything else.
    Internal,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidArgument => "InvalidArgument",
            Self::FailedPrecondition => "FailedPrecondition",
            Self::NotFound => "NotFound",
            Self::Aborted => "Aborted",
            Self::Unimplemented => "Unimplemented",
            Self::Internal => "Internal",
        };
        f.write_str(name)
    }
}

/// Structured payload of an error, so the receiving side can rebuild the
/// original error value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDetail {
    /// Configuration diagnostics.
    Diagnostics(Diagnostics),
    /// An expression whose value is not known statically.
    UnknownValue(Range),
}

/// Error half of a [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct RpcError {
    /// Status code.
    pub code: Code,
    /// Human-readable message.
    pub message: String,
    /// Structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ErrorDetail>,
}

impl RpcError {
    /// Creates an error without detail.
    #[must_use]
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
        }
    }

    /// Attaches a structured payload.
    #[must_use]
    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Error for parameters that do not deserialize.
    #[must_use]
    pub fn invalid_params(method: &str, err: &serde_json::Error) -> Self {
        Self::new(
            Code::InvalidArgument,
            format!("invalid parameters for {method}: {err}"),
        )
    }

    /// Error for an unknown method.
    #[must_use]
    pub fn unimplemented(method: &str) -> Self {
        Self::new(Code::Unimplemented, format!("unknown method {method}"))
    }
}

/// Decodes request parameters.
///
/// # Errors
///
/// Returns [`Code::InvalidArgument`] if the parameters do not fit `T`.
pub fn params<T: serde::de::DeserializeOwned>(request: &Request) -> Result<T, RpcError> {
    serde_json::from_value(request.params.clone())
        .map_err(|err| RpcError::invalid_params(&request.method, &err))
}

/// Encodes a handler result.
///
/// # Errors
///
/// Returns [`Code::Internal`] if the value does not serialize.
pub fn to_result<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|err| RpcError::new(Code::Internal, err.to_string()))
}

/// The first line a plugin writes: `<core>|<protocol>|stdio|jsonl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Version of the handshake format itself.
    pub core_version: u32,
    /// [`PROTOCOL_VERSION`] of the plugin.
    pub protocol_version: u32,
}

impl Handshake {
    /// Version of the handshake line format.
    pub const CORE_VERSION: u32 = 1;

    /// The handshake of this build.
    #[must_use]
    pub fn current() -> Self {
        Self {
            core_version: Self::CORE_VERSION,
            protocol_version: PROTOCOL_VERSION,
        }
    }

    /// Parses a handshake line.
    ///
    /// # Errors
    ///
    /// Returns a message describing what is wrong with the line.
    pub fn parse(line: &str) -> Result<Self, String> {
        let parts: Vec<&str> = line.trim().split('|').collect();
        let [core, protocol, transport, format] = parts.as_slice() else {
            return Err(format!("unrecognized handshake line {line:?}"));
        };
        if *transport != "stdio" || *format != "jsonl" {
            return Err(format!(
                "unsupported transport {transport}/{format}, expected stdio/jsonl"
            ));
        }
        let core_version = core
            .parse()
            .map_err(|_| format!("invalid core version {core:?}"))?;
        let protocol_version = protocol
            .parse()
            .map_err(|_| format!("invalid protocol version {protocol:?}"))?;
        Ok(Self {
            core_version,
            protocol_version,
        })
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|stdio|jsonl",
            self.core_version, self.protocol_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // --- frame tests ---

    #[test]
    fn test_frame_kinds() {
        let request: Frame =
            serde_json::from_str(r#"{"id":1,"stream":0,"method":"GetName"}"#).unwrap();
        assert!(matches!(request, Frame::Request(ref r) if r.params.is_null()));

        let response: Frame =
            serde_json::from_str(r#"{"id":1,"stream":0,"result":"terraform"}"#).unwrap();
        let Frame::Response(response) = response else {
            panic!("expected a response");
        };
        assert_eq!(response.into_result().unwrap(), json!("terraform"));
    }

    #[test]
    fn test_error_response() {
        let error = RpcError::new(Code::FailedPrecondition, "too early");
        let line = serde_json::to_string(&Response::new(3, 9, Err(error.clone()))).unwrap();
        assert_eq!(
            line,
            r#"{"id":9,"stream":3,"error":{"code":"FailedPrecondition","message":"too early"}}"#
        );
        let Frame::Response(response) = serde_json::from_str(&line).unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(response.into_result().unwrap_err(), error);
    }

    #[test]
    fn test_invalid_params() {
        let request = Request {
            id: 1,
            stream: 0,
            method: "GetFile".to_string(),
            params: json!({"name": 3}),
        };
        #[derive(Debug, serde::Deserialize)]
        struct P {
            #[allow(dead_code)]
            name: String,
        }
        let err = params::<P>(&request).unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
        assert!(err.message.starts_with("invalid parameters for GetFile"));
    }

    // --- handshake tests ---

    #[test]
    fn test_handshake_line() {
        let line = Handshake::current().to_string();
        assert_eq!(line, format!("1|{PROTOCOL_VERSION}|stdio|jsonl"));
        assert_eq!(Handshake::parse(&format!("{line}\n")).unwrap(), Handshake::current());
    }

    #[test]
    fn test_handshake_rejects_garbage() {
        assert!(Handshake::parse("hello").is_err());
        assert!(Handshake::parse("1|1|tcp|jsonl").is_err());
        assert!(Handshake::parse("1|x|stdio|jsonl").is_err());
    }
}
