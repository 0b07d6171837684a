//! Plugin side: serving a [`RuleSet`] to the host.

use crate::error::ProtocolError;
use crate::messages::{ApplyConfigParams, ApplyGlobalConfigParams, CheckParams};
use crate::protocol::{
    self, params, to_result, Code, Handshake, Request, RpcError, MAGIC_COOKIE_KEY,
    MAGIC_COOKIE_VALUE, NOT_A_COMMAND, RULE_SET_STREAM, SDK_VERSION,
};
use crate::runner::RemoteRunner;
use crate::transport::Connection;
use hclint_core::{RuleSet, RuleSetError};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the plugin's log filter.
pub const LOG_ENV: &str = "HCLINT_LOG";

/// What a plugin binary serves.
pub struct ServeOpts {
    /// The rule set.
    pub rule_set: Box<dyn RuleSet>,
}

/// Serves `opts.rule_set` on stdin/stdout until the host disconnects.
///
/// Exits the process with status 1 if it was not started by a host.
///
/// ```ignore
/// fn main() {
///     hclint::serve(hclint::ServeOpts {
///         rule_set: Box::new(BuiltinRuleSet::new("example", "0.1.0").rules(rules())),
///     });
/// }
/// ```
pub fn serve(opts: ServeOpts) {
    if std::env::var(MAGIC_COOKIE_KEY).as_deref() != Ok(MAGIC_COOKIE_VALUE) {
        eprintln!("{NOT_A_COMMAND}");
        std::process::exit(1);
    }

    // Stdout carries the protocol, so logs go to stderr only.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init();

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(ProtocolError::from)
        .and_then(|runtime| {
            runtime.block_on(serve_io(opts.rule_set, tokio::io::stdin(), tokio::io::stdout()))
        });
    if let Err(err) = result {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

/// Writes the handshake to `writer`, then serves the rule set until the
/// host closes `reader`.
///
/// # Errors
///
/// Returns an error if the handshake cannot be written.
pub async fn serve_io<R, W>(
    rule_set: Box<dyn RuleSet>,
    reader: R,
    mut writer: W,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let handshake = format!("{}\n", Handshake::current());
    writer.write_all(handshake.as_bytes()).await?;
    writer.flush().await?;

    let conn = Arc::new(Connection::spawn(reader, writer));
    let (_registration, mut requests) = conn.broker().listen(RULE_SET_STREAM);
    let mut server = RuleSetServer::new(rule_set, Arc::clone(&conn));
    info!(rule_set = %server.name(), "Serving rule set");

    while let Some(request) = requests.recv().await {
        let result = server.handle(&request).await;
        conn.respond(&request, result);
    }
    debug!("Host disconnected");
    Ok(())
}

/// Dispatches rule set calls, enforcing that the host checked the version
/// constraint before configuring.
struct RuleSetServer {
    rule_set: Arc<Mutex<Box<dyn RuleSet>>>,
    conn: Arc<Connection>,
    constraint_checked: bool,
}

impl RuleSetServer {
    fn new(rule_set: Box<dyn RuleSet>, conn: Arc<Connection>) -> Self {
        Self {
            rule_set: Arc::new(Mutex::new(rule_set)),
            conn,
            constraint_checked: false,
        }
    }

    fn name(&self) -> String {
        self.lock().rule_set_name().to_string()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Box<dyn RuleSet>> {
        self.rule_set.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn handle(&mut self, request: &Request) -> Result<Value, RpcError> {
        debug!(method = %request.method, "Rule set call");
        match request.method.as_str() {
            protocol::rule_set::GET_NAME => to_result(&self.lock().rule_set_name()),
            protocol::rule_set::GET_VERSION => to_result(&self.lock().rule_set_version()),
            protocol::rule_set::GET_RULE_NAMES => to_result(&self.lock().rule_names()),
            protocol::rule_set::GET_VERSION_CONSTRAINT => {
                self.constraint_checked = true;
                to_result(&self.lock().version_constraint())
            }
            protocol::rule_set::GET_SDK_VERSION => to_result(&SDK_VERSION),
            protocol::rule_set::GET_CONFIG_SCHEMA => to_result(&self.lock().config_schema()),
            protocol::rule_set::APPLY_GLOBAL_CONFIG => {
                if !self.constraint_checked {
                    let name = self.name();
                    return Err(RpcError::new(
                        Code::FailedPrecondition,
                        format!(
                            "failed to satisfy version constraints; hclint-ruleset-{name} \
                             requires a host that checks plugin version constraints. \
                             Upgrade hclint to use this plugin"
                        ),
                    ));
                }
                let p: ApplyGlobalConfigParams = params(request)?;
                self.lock().apply_global_config(&p.config).map_err(rpc)?;
                Ok(Value::Null)
            }
            protocol::rule_set::APPLY_CONFIG => {
                let p: ApplyConfigParams = params(request)?;
                self.lock().apply_config(&p.content).map_err(rpc)?;
                Ok(Value::Null)
            }
            protocol::rule_set::CHECK => {
                let p: CheckParams = params(request)?;
                self.check(p.broker_id).await
            }
            other => Err(RpcError::unimplemented(other)),
        }
    }

    /// Runs the rules on a blocking thread, since every runner call waits
    /// for the host's answer.
    async fn check(&self, broker_id: u32) -> Result<Value, RpcError> {
        let rule_set = Arc::clone(&self.rule_set);
        let runner = RemoteRunner::new(Arc::clone(&self.conn), broker_id);
        let result = tokio::task::spawn_blocking(move || {
            let rule_set = rule_set.lock().unwrap_or_else(PoisonError::into_inner);
            rule_set.check(&runner)
        })
        .await
        .map_err(|err| RpcError::new(Code::Internal, format!("check panicked: {err}")))?;
        result.map_err(rpc)?;
        Ok(Value::Null)
    }
}

fn rpc(err: RuleSetError) -> RpcError {
    RpcError::from(&err)
}
