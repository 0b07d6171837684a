//! Configuration file resolution with global fallback.
//!
//! Resolves the configuration file path using a deterministic priority order:
//!
//! 1. `--config` flag (explicit path)
//! 2. `.hclint.hcl` in the working directory
//! 3. `~/.hclint.hcl` (global fallback)
//! 4. No config found → defaults

use anyhow::{Context, Result};
use hclint_core::config::{global_config_path, project_config_path, ConfigError};
use hclint_core::Config;
use std::path::{Path, PathBuf};

/// Where the configuration was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly specified via `--config` flag.
    Explicit(PathBuf),
    /// Found in the working directory.
    Project(PathBuf),
    /// Loaded from the home directory.
    Global(PathBuf),
    /// No config found; defaults will be used.
    Default,
}

impl ConfigSource {
    /// Returns the resolved path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Explicit(p) | Self::Project(p) | Self::Global(p) => Some(p),
            Self::Default => None,
        }
    }

    /// Returns `true` if the config was loaded from the home directory.
    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global(_))
    }

    /// Loads the configuration this source points at. Diagnostics of an
    /// invalid file are rendered to stderr before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(&self) -> Result<Config> {
        let Some(path) = self.path() else {
            return Ok(Config::default());
        };
        if self.is_global() {
            tracing::info!("Using global config: {}", path.display());
        }
        Config::from_file(path)
            .map_err(|err| {
                render(&err);
                err
            })
            .with_context(|| format!("Failed to load config: {}", path.display()))
    }
}

fn render(err: &ConfigError) {
    if let ConfigError::Invalid { file, diags } = err {
        for diag in diags.iter() {
            eprintln!("{:?}", miette::Report::new(diag.to_miette(file)));
        }
    }
}

/// Resolves the configuration file path.
///
/// See module-level docs for resolution order.
#[must_use]
pub fn resolve(working_dir: &Path, explicit: Option<&Path>) -> ConfigSource {
    resolve_inner(working_dir, explicit, global_config_path())
}

/// Testable core: accepts `global` as parameter to avoid depending on the
/// real home directory.
fn resolve_inner(
    working_dir: &Path,
    explicit: Option<&Path>,
    global: Option<PathBuf>,
) -> ConfigSource {
    if let Some(p) = explicit {
        return ConfigSource::Explicit(p.to_path_buf());
    }

    let candidate = project_config_path(working_dir);
    if candidate.is_file() {
        tracing::debug!("Found project config: {}", candidate.display());
        return ConfigSource::Project(candidate);
    }

    if let Some(candidate) = global.filter(|p| p.is_file()) {
        tracing::debug!("Found global config: {}", candidate.display());
        return ConfigSource::Global(candidate);
    }

    ConfigSource::Default
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn explicit_takes_priority_over_project() {
        let tmp = TempDir::new().unwrap();
        let explicit = tmp.path().join("custom.hcl");
        fs::write(&explicit, "").unwrap();

        let project = tmp.path().join("project");
        fs::create_dir(&project).unwrap();
        fs::write(project.join(".hclint.hcl"), "").unwrap();

        let result = resolve_inner(&project, Some(&explicit), None);
        assert_eq!(result, ConfigSource::Explicit(explicit));
    }

    #[test]
    fn explicit_does_not_check_existence() {
        // The missing file is reported when loading.
        let result = resolve_inner(Path::new("/tmp"), Some(Path::new("/nonexistent.hcl")), None);
        assert_eq!(
            result,
            ConfigSource::Explicit(PathBuf::from("/nonexistent.hcl"))
        );
        assert!(result.load().is_err());
    }

    #[test]
    fn project_config_found() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".hclint.hcl"), "").unwrap();

        let result = resolve_inner(tmp.path(), None, None);
        assert_eq!(result, ConfigSource::Project(tmp.path().join(".hclint.hcl")));
    }

    #[test]
    fn global_fallback_when_no_project_config() {
        let project = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let global = home.path().join(".hclint.hcl");
        fs::write(&global, "").unwrap();

        let result = resolve_inner(project.path(), None, Some(global.clone()));
        assert_eq!(result, ConfigSource::Global(global));
        assert!(result.is_global());
    }

    #[test]
    fn global_skipped_when_project_config_exists() {
        let project = TempDir::new().unwrap();
        fs::write(project.path().join(".hclint.hcl"), "").unwrap();
        let home = TempDir::new().unwrap();
        let global = home.path().join(".hclint.hcl");
        fs::write(&global, "").unwrap();

        let result = resolve_inner(project.path(), None, Some(global));
        assert!(matches!(result, ConfigSource::Project(_)));
    }

    #[test]
    fn no_config_anywhere_returns_default() {
        let project = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let result = resolve_inner(project.path(), None, Some(home.path().join(".hclint.hcl")));
        assert_eq!(result, ConfigSource::Default);
        assert!(result.path().is_none());
    }

    #[test]
    fn load_reads_the_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".hclint.hcl");
        fs::write(&path, "config {\n  force = true\n}\n").unwrap();
        let config = ConfigSource::Project(path).load().unwrap();
        assert!(config.force);
    }

    #[test]
    fn load_rejects_invalid_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".hclint.hcl");
        fs::write(&path, "config {\n  unknown = true\n}\n").unwrap();
        let err = ConfigSource::Project(path).load().unwrap_err();
        assert!(format!("{err:#}").contains("Unsupported argument"));
    }
}
