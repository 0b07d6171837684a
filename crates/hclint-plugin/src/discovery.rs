//! Finding and starting the plugins enabled in the configuration.

use crate::client::{ClientOptions, PluginClient};
use crate::error::ProtocolError;
use hclint_core::config::PluginConfig;
use hclint_core::Config;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Environment variable overriding the plugin directory.
pub const PLUGIN_DIR_ENV: &str = "HCLINT_PLUGIN_DIR";

/// Plugin directory, relative to the working directory or the home
/// directory.
pub const DEFAULT_PLUGIN_DIR: &str = ".hclint.d/plugins";

/// Prefix of every plugin binary.
pub const BINARY_PREFIX: &str = "hclint-ruleset-";

/// Deepest directory searched for a plugin without `source` and `version`:
/// enough for `<host>/<owner>/<repo>/<version>/<binary>`.
const MAX_SEARCH_DEPTH: usize = 5;

/// Errors that can occur while discovering plugins.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// An enabled plugin has no binary.
    #[error(
        "Plugin \"{name}\" not found in {dir}. Did you install the plugin? \
         Place the {binary} binary in {dir}, or set plugin_dir in .hclint.hcl"
    )]
    NotFound {
        /// Plugin name.
        name: String,
        /// Directory searched.
        dir: String,
        /// Expected binary name.
        binary: String,
    },

    /// The plugin directory could not be read.
    #[error("failed to read plugin directory {path}: {source}")]
    Walk {
        /// Directory.
        path: PathBuf,
        /// Underlying error.
        source: walkdir::Error,
    },

    /// The plugin binary was found but could not be started.
    #[error("failed to start plugin \"{name}\": {source}")]
    Start {
        /// Plugin name.
        name: String,
        /// Underlying error.
        source: ProtocolError,
    },
}

/// Resolves the plugin directory: `flag` (from `--plugin-dir`), then
/// `HCLINT_PLUGIN_DIR`, then `plugin_dir` in the config, then
/// `./.hclint.d/plugins` if it exists, then `~/.hclint.d/plugins`.
#[must_use]
pub fn plugin_dir(flag: Option<&Path>, config: &Config) -> PathBuf {
    if let Some(dir) = flag {
        return expand_home(dir);
    }
    if let Some(dir) = std::env::var_os(PLUGIN_DIR_ENV).filter(|d| !d.is_empty()) {
        return expand_home(Path::new(&dir));
    }
    if let Some(dir) = &config.plugin_dir {
        return expand_home(Path::new(dir));
    }
    let local = PathBuf::from(DEFAULT_PLUGIN_DIR);
    if local.is_dir() {
        return local;
    }
    match home::home_dir() {
        Some(home) => home.join(DEFAULT_PLUGIN_DIR),
        None => local,
    }
}

/// File name of the plugin binary for `name`.
#[must_use]
pub fn binary_name(name: &str) -> String {
    format!("{BINARY_PREFIX}{name}{}", std::env::consts::EXE_SUFFIX)
}

/// Path of an installed plugin relative to the plugin directory:
/// `<source>/<version>/<binary>`. `None` for plugins configured without
/// both `source` and `version`.
#[must_use]
pub fn install_path(plugin: &PluginConfig) -> Option<PathBuf> {
    match (&plugin.source, &plugin.version) {
        (Some(source), Some(version)) if !source.is_empty() && !version.is_empty() => Some(
            Path::new(source)
                .join(version)
                .join(binary_name(&plugin.name)),
        ),
        _ => None,
    }
}

/// Locates the binary of a configured plugin. A plugin with `source` and
/// `version` must sit at its [`install_path`]; any other plugin is
/// searched for with [`find_plugin`].
///
/// # Errors
///
/// Returns [`DiscoveryError::NotFound`] if there is no such binary.
pub fn plugin_path(dir: &Path, plugin: &PluginConfig) -> Result<PathBuf, DiscoveryError> {
    let Some(relative) = install_path(plugin) else {
        return find_plugin(dir, &plugin.name);
    };
    let path = dir.join(relative);
    if path.is_file() {
        debug!(plugin = %plugin.name, path = %path.display(), "Found installed plugin");
        return Ok(path);
    }
    Err(DiscoveryError::NotFound {
        name: plugin.name.clone(),
        dir: path
            .parent()
            .unwrap_or(dir)
            .display()
            .to_string(),
        binary: binary_name(&plugin.name),
    })
}

/// Finds the binary of plugin `name` under `dir`. Binaries may sit
/// directly in `dir` or in nested directories such as
/// `<source>/<version>/`; the first match in sorted order wins.
///
/// # Errors
///
/// Returns [`DiscoveryError::NotFound`] if there is no such binary.
pub fn find_plugin(dir: &Path, name: &str) -> Result<PathBuf, DiscoveryError> {
    let binary = binary_name(name);
    let not_found = || DiscoveryError::NotFound {
        name: name.to_string(),
        dir: dir.display().to_string(),
        binary: binary.clone(),
    };
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "Plugin directory does not exist");
        return Err(not_found());
    }

    for entry in WalkDir::new(dir).max_depth(MAX_SEARCH_DEPTH).sort_by_file_name() {
        let entry = entry.map_err(|source| DiscoveryError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && entry.file_name().to_string_lossy() == binary {
            debug!(plugin = name, path = %entry.path().display(), "Found plugin");
            return Ok(entry.into_path());
        }
    }
    Err(not_found())
}

/// Starts every plugin enabled in `config`, in name order. Stops at the
/// first plugin that cannot be found or started; clients already started
/// are closed when dropped.
///
/// # Errors
///
/// Returns the first discovery or startup failure.
pub fn start_plugins(
    config: &Config,
    dir: &Path,
    options: &ClientOptions,
) -> Result<Vec<PluginClient>, DiscoveryError> {
    let mut clients = Vec::new();
    for plugin in config.enabled_plugins() {
        let path = plugin_path(dir, plugin)?;
        let client = PluginClient::start(&plugin.name, &path, options.clone()).map_err(
            |source| DiscoveryError::Start {
                name: plugin.name.clone(),
                source,
            },
        )?;
        clients.push(client);
    }
    info!("Started {} plugin(s)", clients.len());
    Ok(clients)
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = home::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
