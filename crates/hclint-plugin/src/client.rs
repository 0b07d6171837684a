//! Host side: driving a plugin process.

use crate::error::ProtocolError;
use crate::messages::{ApplyConfigParams, ApplyGlobalConfigParams, CheckParams};
use crate::protocol::{
    self, Handshake, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE, MIN_SDK_VERSION, PROTOCOL_VERSION,
    RULE_SET_STREAM, SDK_VERSION,
};
use crate::runner::RunnerServer;
use crate::transport::Connection;
use hclint_core::{
    BodyContent, BodySchema, Config, GlobalConfig, RuleSetError, RuleSetHandle, Runner,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Tunables of a [`PluginClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// How long to wait for the handshake line.
    pub handshake_timeout: Duration,
    /// Deadline of each `Check`.
    pub check_timeout: Duration,
    /// Host version checked against the plugin's constraint.
    pub host_version: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            check_timeout: Duration::from_secs(300),
            host_version: SDK_VERSION.to_string(),
        }
    }
}

/// A connection to one plugin, usable as a [`RuleSetHandle`].
///
/// The client owns a small tokio runtime; its methods block on it, so it
/// must not be used from within another async context.
pub struct PluginClient {
    name: String,
    options: ClientOptions,
    conn: Option<Connection>,
    child: Option<Child>,
    runtime: Runtime,
}

impl PluginClient {
    /// Spawns the plugin binary at `path` and completes the handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started or the handshake
    /// fails or times out.
    pub fn start(
        name: impl Into<String>,
        path: &Path,
        options: ClientOptions,
    ) -> Result<Self, ProtocolError> {
        let name = name.into();
        if !path.is_file() {
            return Err(ProtocolError::Missing(path.to_path_buf()));
        }
        let runtime = build_runtime()?;
        info!(plugin = %name, path = %path.display(), "Starting plugin");

        let (child, conn) = runtime.block_on(async {
            let mut child = Command::new(path)
                .env(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()?;
            let (Some(stdin), Some(stdout), Some(stderr)) =
                (child.stdin.take(), child.stdout.take(), child.stderr.take())
            else {
                return Err(ProtocolError::Handshake(
                    "plugin stdio is not available".to_string(),
                ));
            };
            tokio::spawn(forward_stderr(name.clone(), stderr));

            let mut stdout = BufReader::new(stdout);
            read_handshake(&name, &mut stdout, options.handshake_timeout).await?;
            Ok::<_, ProtocolError>((child, Connection::spawn(stdout, stdin)))
        })?;

        Ok(Self {
            name,
            options,
            conn: Some(conn),
            child: Some(child),
            runtime,
        })
    }

    /// Connects to a plugin already running on the other end of `reader`
    /// and `writer`, e.g. one served in-process by
    /// [`serve_io`](crate::serve_io).
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails or times out.
    pub fn connect<R, W>(
        name: impl Into<String>,
        reader: R,
        writer: W,
        options: ClientOptions,
    ) -> Result<Self, ProtocolError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let name = name.into();
        let runtime = build_runtime()?;
        let conn = runtime.block_on(async {
            let mut reader = BufReader::new(reader);
            read_handshake(&name, &mut reader, options.handshake_timeout).await?;
            Ok::<_, ProtocolError>(Connection::spawn(reader, writer))
        })?;
        Ok(Self {
            name,
            options,
            conn: Some(conn),
            child: None,
            runtime,
        })
    }

    /// Name the plugin was started under.
    #[must_use]
    pub fn plugin_name(&self) -> &str {
        &self.name
    }

    /// `GetName`.
    ///
    /// # Errors
    ///
    /// Returns the plugin's error or a transport failure.
    pub fn get_name(&self) -> Result<String, ProtocolError> {
        self.call(protocol::rule_set::GET_NAME, &())
    }

    /// `GetVersion`.
    ///
    /// # Errors
    ///
    /// Returns the plugin's error or a transport failure.
    pub fn get_version(&self) -> Result<String, ProtocolError> {
        self.call(protocol::rule_set::GET_VERSION, &())
    }

    /// `GetRuleNames`.
    ///
    /// # Errors
    ///
    /// Returns the plugin's error or a transport failure.
    pub fn get_rule_names(&self) -> Result<Vec<String>, ProtocolError> {
        self.call(protocol::rule_set::GET_RULE_NAMES, &())
    }

    /// `GetVersionConstraint`.
    ///
    /// # Errors
    ///
    /// Returns the plugin's error or a transport failure.
    pub fn get_version_constraint(&self) -> Result<Option<String>, ProtocolError> {
        self.call(protocol::rule_set::GET_VERSION_CONSTRAINT, &())
    }

    /// `GetSDKVersion`.
    ///
    /// # Errors
    ///
    /// Returns the plugin's error or a transport failure.
    pub fn get_sdk_version(&self) -> Result<String, ProtocolError> {
        self.call(protocol::rule_set::GET_SDK_VERSION, &())
    }

    /// `GetConfigSchema`.
    ///
    /// # Errors
    ///
    /// Returns the plugin's error or a transport failure.
    pub fn get_config_schema(&self) -> Result<BodySchema, ProtocolError> {
        self.call(protocol::rule_set::GET_CONFIG_SCHEMA, &())
    }

    /// `ApplyGlobalConfig`. The plugin refuses it unless
    /// [`PluginClient::get_version_constraint`] was called first.
    ///
    /// # Errors
    ///
    /// Returns the plugin's error or a transport failure.
    pub fn apply_global_config(&self, config: &GlobalConfig) -> Result<(), ProtocolError> {
        let params = ApplyGlobalConfigParams {
            config: config.clone(),
        };
        self.call::<Value, _>(protocol::rule_set::APPLY_GLOBAL_CONFIG, &params)?;
        Ok(())
    }

    /// `ApplyConfig`.
    ///
    /// # Errors
    ///
    /// Returns the plugin's error or a transport failure.
    pub fn apply_config(&self, content: &BodyContent) -> Result<(), ProtocolError> {
        let params = ApplyConfigParams {
            content: content.clone(),
        };
        self.call::<Value, _>(protocol::rule_set::APPLY_CONFIG, &params)?;
        Ok(())
    }

    /// Checks the plugin's name, SDK version and version constraint.
    ///
    /// # Errors
    ///
    /// Returns the first check that fails.
    pub fn verify(&self) -> Result<(), ProtocolError> {
        let actual = self.get_name()?;
        if actual != self.name {
            return Err(ProtocolError::NameMismatch {
                expected: self.name.clone(),
                actual,
            });
        }

        let sdk_version = self.get_sdk_version()?;
        if !version_satisfies(&sdk_version, &format!(">={MIN_SDK_VERSION}")) {
            return Err(ProtocolError::IncompatibleSdk {
                plugin: self.name.clone(),
                sdk_version,
                minimum: MIN_SDK_VERSION,
            });
        }

        if let Some(constraint) = self.get_version_constraint()? {
            if !version_satisfies(&self.options.host_version, &constraint) {
                return Err(ProtocolError::VersionConstraint {
                    plugin: self.name.clone(),
                    constraint,
                    host_version: self.options.host_version.clone(),
                });
            }
        }
        debug!(plugin = %self.name, sdk_version = %sdk_version, "Plugin verified");
        Ok(())
    }

    /// `Check`: serves `runner` on a fresh broker stream while the plugin's
    /// rules run. The stream is closed when the call returns, fails or
    /// times out.
    ///
    /// # Errors
    ///
    /// Returns the first rule failure, a transport failure, or
    /// [`ProtocolError::Timeout`].
    pub fn check_runner(&self, runner: &dyn Runner) -> Result<(), ProtocolError> {
        let conn = self.connection()?;
        let timeout = self.options.check_timeout;
        let server = RunnerServer::new(runner);
        let (registration, mut requests) = conn.broker().accept();
        let params = serde_json::to_value(CheckParams {
            broker_id: registration.id(),
        })?;
        debug!(plugin = %self.name, broker_id = registration.id(), "Check started");

        self.runtime.block_on(async {
            let call = conn.call(RULE_SET_STREAM, protocol::rule_set::CHECK, params);
            tokio::pin!(call);
            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    result = &mut call => {
                        debug!(plugin = %self.name, "Check finished");
                        return result.map(|_| ());
                    }
                    Some(request) = requests.recv() => {
                        conn.respond(&request, server.handle(&request));
                    }
                    () = &mut deadline => {
                        warn!(plugin = %self.name, "Check timed out after {timeout:?}");
                        return Err(ProtocolError::Timeout(timeout));
                    }
                }
            }
        })
    }

    /// Closes stdin, gives the plugin a moment to exit, then kills it.
    pub fn close(&mut self) {
        drop(self.conn.take());
        let Some(mut child) = self.child.take() else {
            return;
        };
        let name = self.name.clone();
        self.runtime.block_on(async move {
            match tokio::time::timeout(Duration::from_millis(500), child.wait()).await {
                Ok(Ok(status)) => debug!(plugin = %name, %status, "Plugin exited"),
                Ok(Err(err)) => warn!(plugin = %name, "Failed to wait for plugin: {err}"),
                Err(_) => {
                    debug!(plugin = %name, "Killing plugin");
                    if let Err(err) = child.kill().await {
                        warn!(plugin = %name, "Failed to kill plugin: {err}");
                    }
                }
            }
        });
    }

    fn connection(&self) -> Result<&Connection, ProtocolError> {
        self.conn.as_ref().ok_or(ProtocolError::Closed)
    }

    fn call<T, P>(&self, method: &str, params: &P) -> Result<T, ProtocolError>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let conn = self.connection()?;
        let params = serde_json::to_value(params)?;
        let value = self
            .runtime
            .block_on(conn.call(RULE_SET_STREAM, method, params))?;
        Ok(serde_json::from_value(value)?)
    }
}

impl Drop for PluginClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl RuleSetHandle for PluginClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn rule_names(&mut self) -> Result<Vec<String>, RuleSetError> {
        Ok(self.get_rule_names()?)
    }

    fn configure(&mut self, config: &Config) -> Result<(), RuleSetError> {
        self.verify()?;
        self.apply_global_config(&config.global_config(false))?;
        let schema = self.get_config_schema()?;
        let content = config.plugin_config_content(&self.name, &schema)?;
        self.apply_config(&content)?;
        Ok(())
    }

    fn check(&mut self, runner: &dyn Runner) -> Result<(), RuleSetError> {
        Ok(self.check_runner(runner)?)
    }
}

fn build_runtime() -> Result<Runtime, ProtocolError> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?)
}

async fn read_handshake<R>(name: &str, reader: &mut R, timeout: Duration) -> Result<(), ProtocolError>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let read = tokio::time::timeout(timeout, reader.read_line(&mut line))
        .await
        .map_err(|_| ProtocolError::Handshake(format!("no handshake within {timeout:?}")))??;
    if read == 0 {
        return Err(ProtocolError::Handshake(
            "plugin exited before completing the handshake".to_string(),
        ));
    }
    let handshake = Handshake::parse(&line).map_err(ProtocolError::Handshake)?;
    if handshake.core_version != Handshake::CORE_VERSION
        || handshake.protocol_version != PROTOCOL_VERSION
    {
        let remediation = if handshake.protocol_version < PROTOCOL_VERSION {
            "Upgrade the plugin."
        } else {
            "Upgrade hclint."
        };
        return Err(ProtocolError::IncompatibleVersion {
            plugin: name.to_string(),
            plugin_version: handshake.protocol_version,
            host_version: PROTOCOL_VERSION,
            remediation,
        });
    }
    debug!(plugin = name, "Handshake complete");
    Ok(())
}

async fn forward_stderr(name: String, stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(plugin = %name, "{line}");
    }
}

/// Returns true if `version` satisfies the semver requirement. Unparsable
/// versions or requirements never satisfy.
fn version_satisfies(version: &str, requirement: &str) -> bool {
    match (
        semver::Version::parse(version),
        semver::VersionReq::parse(requirement),
    ) {
        (Ok(version), Ok(requirement)) => requirement.matches(&version),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_satisfies() {
        assert!(version_satisfies("0.4.2", ">= 0.4.0"));
        assert!(version_satisfies("0.4.2", ">=0.4.0, <1"));
        assert!(!version_satisfies("0.3.9", ">= 0.4.0"));
        assert!(!version_satisfies("0.4.2", "not a requirement"));
        assert!(!version_satisfies("dev", ">= 0.1.0"));
    }

    #[test]
    fn test_start_missing_binary() {
        let tmp = tempfile::tempdir().unwrap();
        let err = PluginClient::start(
            "missing",
            &tmp.path().join("hclint-ruleset-missing"),
            ClientOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ProtocolError::Missing(_)));
    }

    #[test]
    fn test_incompatible_protocol() {
        let (host, mut plugin) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(host);
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async move {
                use tokio::io::AsyncWriteExt;
                plugin.write_all(b"1|99|stdio|jsonl\n").await.unwrap();
                plugin.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(200)).await;
            });
        });

        let err = PluginClient::connect("future", reader, writer, ClientOptions::default())
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            format!(
                "Incompatible plugin protocol: future speaks version 99, this hclint speaks \
                 version {PROTOCOL_VERSION}. Upgrade hclint."
            )
        );
    }

    #[test]
    fn test_handshake_timeout() {
        let (host, _plugin) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(host);
        let options = ClientOptions {
            handshake_timeout: Duration::from_millis(50),
            ..ClientOptions::default()
        };
        let err = PluginClient::connect("slow", reader, writer, options)
            .err()
            .unwrap();
        assert!(matches!(err, ProtocolError::Handshake(msg) if msg.starts_with("no handshake")));
    }
}
