//! Configuration for hclint.
//!
//! The config file is HCL and is read with the same content model and
//! decoder that rules use:
//!
//! ```hcl
//! config {
//!   call_module_type = "local"
//! }
//!
//! rule "terraform_documented_variables" {
//!   enabled = true
//!   exclude = ["internal"]
//! }
//!
//! plugin "example" {
//!   enabled = true
//! }
//! ```
//!
//! `rule` and `plugin` bodies are kept unevaluated. Each rule decodes its own
//! fields later with [`Config::rule_config_content`].

use crate::hclext::{
    block_content, implied_body_schema, partial_content, BodyContent, BodySchema, Decode,
    Diagnostic, Diagnostics, SourceFile,
};
use crate::module::CallModuleType;
use crate::ruleset::{GlobalConfig, RuleGlobalConfig};
use hcl::eval::{Context, Evaluate};
use hcl::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default config file name, looked up in the working directory and then
/// in the home directory.
pub const CONFIG_FILE_NAME: &str = ".hclint.hcl";

/// Top-level configuration for hclint.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Exit with status 0 even if issues are found.
    pub force: bool,
    /// Only rules explicitly enabled run.
    pub disabled_by_default: bool,
    /// Directory plugins are installed in.
    pub plugin_dir: Option<String>,
    /// Which module calls are loaded.
    pub call_module_type: CallModuleType,
    /// Output format name.
    pub format: Option<String>,
    /// Values for root module variables.
    pub variables: BTreeMap<String, Value>,
    /// If not empty, only these rules run.
    pub only: Vec<String>,
    /// Rule blocks by rule name.
    pub rules: BTreeMap<String, RuleConfig>,
    /// Plugin blocks by plugin name.
    pub plugins: BTreeMap<String, PluginConfig>,
}

/// A `rule` block.
#[derive(Debug, Clone, Default)]
pub struct RuleConfig {
    /// Rule name.
    pub name: String,
    /// Whether the rule is enabled.
    pub enabled: bool,
    file: Option<Arc<SourceFile>>,
}

impl RuleConfig {
    /// Creates a rule config that only toggles the rule.
    #[must_use]
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
            file: None,
        }
    }
}

/// A `plugin` block.
#[derive(Debug, Clone, Default)]
pub struct PluginConfig {
    /// Plugin name.
    pub name: String,
    /// Whether the plugin is started.
    pub enabled: bool,
    /// Version to install.
    pub version: Option<String>,
    /// Source to install from.
    pub source: Option<String>,
    file: Option<Arc<SourceFile>>,
}

#[derive(Debug, Default, Decode)]
struct ConfigFile {
    #[hcl(block = "config")]
    config: Option<GlobalSection>,
    #[hcl(block = "rule")]
    rules: Vec<RuleSection>,
    #[hcl(block = "plugin")]
    plugins: Vec<PluginSection>,
}

#[derive(Debug, Default, Decode)]
struct GlobalSection {
    #[hcl(attr = "force")]
    force: Option<bool>,
    #[hcl(attr = "disabled_by_default")]
    disabled_by_default: Option<bool>,
    #[hcl(attr = "plugin_dir")]
    plugin_dir: Option<String>,
    #[hcl(attr = "call_module_type")]
    call_module_type: Option<String>,
    #[hcl(attr = "format")]
    format: Option<String>,
    #[hcl(attr = "variables")]
    variables: Option<Vec<String>>,
}

#[derive(Debug, Default, Decode)]
struct RuleSection {
    #[hcl(label)]
    name: String,
    #[hcl(attr = "enabled")]
    enabled: bool,
}

#[derive(Debug, Default, Decode)]
struct PluginSection {
    #[hcl(label)]
    name: String,
    #[hcl(attr = "enabled")]
    enabled: bool,
    #[hcl(attr = "version")]
    version: Option<String>,
    #[hcl(attr = "source")]
    source: Option<String>,
}

const TOP_LEVEL_BLOCKS: &[&str] = &["config", "rule", "plugin"];
const RULE_META: &[&str] = &["enabled"];
const PLUGIN_META: &[&str] = &["enabled", "version", "source"];

impl Config {
    /// Creates a new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&path.display().to_string(), &content)
    }

    /// Parses configuration text. `name` is used in diagnostics.
    ///
    /// # Errors
    ///
    /// Returns every diagnostic found in the file.
    pub fn parse(name: &str, content: &str) -> Result<Self, ConfigError> {
        let file = Arc::new(SourceFile::new(name, content));
        let invalid = |diags: Diagnostics| ConfigError::Invalid {
            file: Arc::clone(&file),
            diags,
        };

        let body = file.parse().map_err(invalid)?;
        let extracted = partial_content(&body, &file, &implied_body_schema::<ConfigFile>())
            .map_err(invalid)?;

        let mut diags = Diagnostics::new();
        for structure in body.iter() {
            if let Some(attr) = structure.as_attribute() {
                let name = attr.key.as_str();
                diags.push(Diagnostic::error(
                    "Unsupported argument",
                    format!("An argument named \"{name}\" is not expected here."),
                ));
            } else if let Some(block) = structure.as_block() {
                let block_type = block.ident.as_str();
                if !TOP_LEVEL_BLOCKS.contains(&block_type) {
                    diags.push(Diagnostic::error(
                        "Unsupported block type",
                        format!("Blocks of type \"{block_type}\" are not expected here."),
                    ));
                } else if block_type == "config" {
                    if let Err(errs) =
                        block_content(block, &file, &implied_body_schema::<GlobalSection>())
                    {
                        diags.extend(errs);
                    }
                }
            }
        }
        if diags.has_errors() {
            return Err(invalid(diags));
        }

        let decoded = ConfigFile::decode_body(&extracted, None).map_err(invalid)?;
        let mut config = Self::default();
        if let Some(global) = decoded.config {
            config.force = global.force.unwrap_or_default();
            config.disabled_by_default = global.disabled_by_default.unwrap_or_default();
            config.plugin_dir = global.plugin_dir;
            config.format = global.format;
            if let Some(value) = global.call_module_type {
                config.call_module_type = value.parse().map_err(|err: String| {
                    invalid(Diagnostic::error("Invalid \"call_module_type\"", err).into())
                })?;
            }
            for var in global.variables.unwrap_or_default() {
                let (name, value) = parse_variable(&var)?;
                config.variables.insert(name, value);
            }
        }
        for rule in decoded.rules {
            let rule_config = RuleConfig {
                name: rule.name.clone(),
                enabled: rule.enabled,
                file: Some(Arc::clone(&file)),
            };
            config.rules.insert(rule.name, rule_config);
        }
        for plugin in decoded.plugins {
            let plugin_config = PluginConfig {
                name: plugin.name.clone(),
                enabled: plugin.enabled,
                version: plugin.version,
                source: plugin.source,
                file: Some(Arc::clone(&file)),
            };
            config.plugins.insert(plugin.name, plugin_config);
        }
        Ok(config)
    }

    /// Returns the body of `rule "<name>"` extracted with `schema`. The
    /// `enabled` attribute is accepted and removed.
    ///
    /// # Errors
    ///
    /// Returns diagnostics if the body does not fit the schema.
    pub fn rule_config_content(
        &self,
        name: &str,
        schema: &BodySchema,
    ) -> Result<Option<BodyContent>, Diagnostics> {
        match self.rules.get(name).and_then(|r| r.file.as_deref()) {
            Some(file) => section_content(file, "rule", name, schema, RULE_META),
            None => Ok(None),
        }
    }

    /// Returns the body of `plugin "<name>"` extracted with `schema`. The
    /// `enabled`, `version` and `source` attributes are accepted and
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns diagnostics if the body does not fit the schema.
    pub fn plugin_config_content(
        &self,
        name: &str,
        schema: &BodySchema,
    ) -> Result<BodyContent, Diagnostics> {
        match self.plugins.get(name).and_then(|p| p.file.as_deref()) {
            Some(file) => Ok(section_content(file, "plugin", name, schema, PLUGIN_META)?
                .unwrap_or_default()),
            None => Ok(BodyContent::default()),
        }
    }

    /// Settings shared with every rule set.
    #[must_use]
    pub fn global_config(&self, fix: bool) -> GlobalConfig {
        GlobalConfig {
            rules: self
                .rules
                .values()
                .map(|r| {
                    (
                        r.name.clone(),
                        RuleGlobalConfig {
                            name: r.name.clone(),
                            enabled: r.enabled,
                        },
                    )
                })
                .collect(),
            disabled_by_default: self.disabled_by_default,
            only: self.only.clone(),
            fix,
            force: self.force,
        }
    }

    /// Plugins enabled in the config, by name.
    pub fn enabled_plugins(&self) -> impl Iterator<Item = &PluginConfig> {
        self.plugins.values().filter(|p| p.enabled)
    }
}

fn section_content(
    file: &SourceFile,
    block_type: &str,
    name: &str,
    schema: &BodySchema,
    meta: &[&str],
) -> Result<Option<BodyContent>, Diagnostics> {
    let body = file.parse()?;
    let Some(block) = body
        .blocks()
        .filter(|b| {
            b.ident.as_str() == block_type && b.labels.first().is_some_and(|l| l.as_str() == name)
        })
        .last()
    else {
        return Ok(None);
    };

    let mut schema = schema.clone();
    for attr in meta {
        if schema.find_attribute(attr).is_none() {
            schema = schema.attribute(*attr);
        }
    }
    let mut content = block_content(block, file, &schema)?;
    for attr in meta {
        content.attributes.remove(*attr);
    }
    Ok(Some(content))
}

/// Parses a `name=value` variable assignment. The value is read as an HCL
/// expression when it evaluates on its own, and as a plain string otherwise.
///
/// # Errors
///
/// Returns an error if there is no `=` or the name is empty.
pub fn parse_variable(assignment: &str) -> Result<(String, Value), ConfigError> {
    let Some((name, raw)) = assignment.split_once('=') else {
        return Err(ConfigError::InvalidVariable(assignment.to_string()));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(ConfigError::InvalidVariable(assignment.to_string()));
    }
    let value = hcl::edit::parser::parse_expr(raw)
        .ok()
        .and_then(|expr| hcl::Expression::from(expr).evaluate(&Context::new()).ok())
        .unwrap_or_else(|| Value::from(raw));
    Ok((name.to_string(), value))
}

/// Default location of the project config file.
#[must_use]
pub fn project_config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

/// Location of the config file in the home directory, if there is one.
#[must_use]
pub fn global_config_path() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The config file does not fit the expected schema.
    #[error("Failed to load config {}: {diags}", file.name)]
    Invalid {
        /// The config file, for rendering diagnostics.
        file: Arc<SourceFile>,
        /// Everything wrong with it.
        diags: Diagnostics,
    },

    /// A variable assignment is not of the form `name=value`.
    #[error("Invalid variable assignment {0:?}, expected name=value")]
    InvalidVariable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hclext::DecodeTarget;

    const CONFIG: &str = r#"
config {
  force               = true
  disabled_by_default = false
  call_module_type    = "none"
  variables           = ["env=prod", "count=3"]
}

rule "terraform_documented_variables" {
  enabled = true
  exclude = ["internal"]
}

rule "terraform_unused_declarations" {
  enabled = false
}

plugin "example" {
  enabled = true
  version = "0.1.0"
  deep_check = true
}
"#;

    #[derive(Debug, Default, Decode)]
    struct DocumentedVariables {
        #[hcl(attr = "exclude")]
        exclude: Option<Vec<String>>,
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.force);
        assert_eq!(config.call_module_type, CallModuleType::Local);
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let config = Config::parse(".hclint.hcl", CONFIG).unwrap();
        assert!(config.force);
        assert_eq!(config.call_module_type, CallModuleType::None);
        assert_eq!(config.variables["env"], Value::from("prod"));
        assert_eq!(config.variables["count"], Value::from(3));
        assert!(config.rules["terraform_documented_variables"].enabled);
        assert!(!config.rules["terraform_unused_declarations"].enabled);
        assert_eq!(config.plugins["example"].version.as_deref(), Some("0.1.0"));
        assert_eq!(config.enabled_plugins().count(), 1);
    }

    #[test]
    fn test_rule_config_content() {
        let config = Config::parse(".hclint.hcl", CONFIG).unwrap();
        let mut target = DocumentedVariables::default();
        let content = config
            .rule_config_content("terraform_documented_variables", &target.schema())
            .unwrap()
            .unwrap();
        assert!(!content.attributes.contains_key("enabled"));
        assert!(target.decode_content(&content, None).is_empty());
        assert_eq!(target.exclude, Some(vec!["internal".to_string()]));

        assert!(config
            .rule_config_content("terraform_missing", &target.schema())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_rule_config_rejects_unknown_fields() {
        let config = Config::parse(".hclint.hcl", CONFIG).unwrap();
        let diags = config
            .rule_config_content("terraform_documented_variables", &BodySchema::new())
            .unwrap_err();
        assert_eq!(diags.iter().next().unwrap().summary, "Unsupported argument");
    }

    #[test]
    fn test_plugin_config_content() {
        let config = Config::parse(".hclint.hcl", CONFIG).unwrap();
        let content = config
            .plugin_config_content("example", &BodySchema::new().attribute("deep_check"))
            .unwrap();
        assert_eq!(content.attributes.keys().collect::<Vec<_>>(), vec!["deep_check"]);
    }

    #[test]
    fn test_unknown_config_attribute() {
        let err = Config::parse(".hclint.hcl", "config {\n  colour = true\n}\n").unwrap_err();
        let ConfigError::Invalid { diags, .. } = err else {
            panic!("expected diagnostics");
        };
        assert_eq!(diags.iter().next().unwrap().summary, "Unsupported argument");
    }

    #[test]
    fn test_unknown_top_level_block() {
        let err = Config::parse(".hclint.hcl", "tflint {}\n").unwrap_err();
        assert!(err.to_string().contains("Blocks of type \"tflint\" are not expected here."));
    }

    #[test]
    fn test_rule_requires_enabled() {
        let err = Config::parse(".hclint.hcl", "rule \"a\" {}\n").unwrap_err();
        let ConfigError::Invalid { diags, .. } = err else {
            panic!("expected diagnostics");
        };
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Missing required argument");
        assert_eq!(
            diag.detail,
            "The argument \"enabled\" is required, but no definition was found."
        );
    }

    #[test]
    fn test_global_config() {
        let mut config = Config::parse(".hclint.hcl", CONFIG).unwrap();
        config.only = vec!["terraform_unused_declarations".to_string()];
        let global = config.global_config(false);
        assert_eq!(global.rules.len(), 2);
        assert!(!global.rules["terraform_unused_declarations"].enabled);
        assert_eq!(global.only, config.only);
        assert!(global.force);
    }

    #[test]
    fn test_parse_variable() {
        assert_eq!(
            parse_variable("region=us-east-1").unwrap(),
            ("region".to_string(), Value::from("us-east-1"))
        );
        assert_eq!(
            parse_variable("enabled=true").unwrap(),
            ("enabled".to_string(), Value::from(true))
        );
        assert!(parse_variable("novalue").is_err());
        assert!(parse_variable("=x").is_err());
    }
}
