//! # hclint-plugin
//!
//! Out-of-process rule sets.
//!
//! A plugin is an executable named `hclint-ruleset-<name>` that calls
//! [`serve`] from `main`. The host starts it with [`PluginClient::start`],
//! which runs the handshake, and then drives it through
//! [`RuleSetHandle`](hclint_core::RuleSetHandle) like any built-in rule set.
//!
//! Host and plugin talk over the plugin's stdin/stdout, one JSON frame per
//! line. Calls flow both ways on that one connection: the host calls the
//! plugin's rule set service, and while a `Check` is in flight the plugin
//! calls back into the host's runner through a stream the host registered
//! with its [`Broker`](broker::Broker) for that call only.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broker;
mod client;
mod discovery;
mod error;
pub mod messages;
pub mod protocol;
mod runner;
mod server;
mod transport;

pub use client::{ClientOptions, PluginClient};
pub use discovery::{
    binary_name, find_plugin, install_path, plugin_dir, plugin_path, start_plugins,
    DiscoveryError, DEFAULT_PLUGIN_DIR, PLUGIN_DIR_ENV,
};
pub use error::ProtocolError;
pub use runner::{RemoteRunner, RunnerServer};
pub use server::{serve, serve_io, ServeOpts, LOG_ENV};
pub use transport::Connection;
