//! Module loading.
//!
//! A module is the set of `*.tf` files in one directory. Local module calls
//! (`source = "./..."`) are followed recursively when enabled.

use crate::hclext::{Diagnostics, Expression, SourceFile};
use crate::runner::eval::{EvalPaths, EvalScope};
use crate::runner::expand::instances;
use hcl::edit::structure::{Block, Body};
use hcl::edit::Span;
use hcl::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Module call arguments that are not input variables.
const META_ARGUMENTS: &[&str] = &[
    "source",
    "version",
    "count",
    "for_each",
    "providers",
    "depends_on",
];

/// Address of a module within the module tree, as a list of call names.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
    /// The root module.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns true for the root module.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path of a module called `name` from this one.
    #[must_use]
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut names = self.0.clone();
        names.push(name.into());
        Self(names)
    }

    /// Call names from the root.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for ModulePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            return write!(f, "root");
        }
        let parts: Vec<String> = self.0.iter().map(|n| format!("module.{n}")).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Which module calls are followed while loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallModuleType {
    /// Only the root module is loaded.
    None,
    /// Modules with `./` or `../` sources are loaded.
    #[default]
    Local,
}

impl std::str::FromStr for CallModuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "local" => Ok(Self::Local),
            other => Err(format!(
                "invalid call module type {other:?}, expected \"none\" or \"local\""
            )),
        }
    }
}

/// A parsed file of a module.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    /// Source handle.
    pub file: SourceFile,
    /// Parsed body.
    pub body: Body,
}

impl ParsedFile {
    /// Parses a source file.
    ///
    /// # Errors
    ///
    /// Returns syntax diagnostics.
    pub fn parse(file: SourceFile) -> Result<Self, Diagnostics> {
        let body = file.parse()?;
        Ok(Self { file, body })
    }
}

/// One loaded module and the modules it calls.
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Address in the module tree.
    pub path: ModulePath,
    /// Directory, relative to the working directory.
    pub dir: String,
    /// Files sorted by name.
    pub files: Vec<ParsedFile>,
    /// Values passed for input variables.
    pub inputs: BTreeMap<String, Value>,
    /// Loaded child modules.
    pub children: Vec<Arc<Module>>,
}

impl Module {
    /// Builds a module from in-memory sources.
    ///
    /// # Errors
    ///
    /// Returns the syntax diagnostics of every file that fails to parse.
    pub fn from_sources<'a>(
        path: ModulePath,
        dir: impl Into<String>,
        sources: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, LoadError> {
        let mut files = Vec::new();
        let mut diags = Diagnostics::new();
        for (name, source) in sources {
            match ParsedFile::parse(SourceFile::new(name, source)) {
                Ok(parsed) => files.push(parsed),
                Err(errs) => diags.extend(errs),
            }
        }
        if !diags.is_empty() {
            return Err(LoadError::Parse(diags));
        }
        files.sort_by(|a, b| a.file.name.cmp(&b.file.name));
        Ok(Self {
            path,
            dir: dir.into(),
            files,
            inputs: BTreeMap::new(),
            children: Vec::new(),
        })
    }

    /// Returns a file by name.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&ParsedFile> {
        self.files.iter().find(|f| f.file.name == name)
    }

    /// Returns the source of every file by name.
    #[must_use]
    pub fn source_files(&self) -> BTreeMap<String, SourceFile> {
        self.files
            .iter()
            .map(|f| (f.file.name.clone(), f.file.clone()))
            .collect()
    }

    /// This module and all its descendants, parents first.
    #[must_use]
    pub fn walk(self: &Arc<Self>) -> Vec<Arc<Module>> {
        let mut modules = vec![Arc::clone(self)];
        for child in &self.children {
            modules.extend(child.walk());
        }
        modules
    }
}

/// Errors that can occur while loading modules.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// IO error reading a module directory or file.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// A module directory does not exist.
    #[error("Module directory {0} does not exist")]
    NotFound(PathBuf),

    /// One or more files failed to parse.
    #[error("Failed to parse configuration: {0}")]
    Parse(Diagnostics),

    /// The file pattern was invalid.
    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// A module calls itself, directly or indirectly.
    #[error("Module call cycle detected at {0}")]
    Cycle(ModulePath),
}

/// Loads a module tree from disk.
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    call_module_type: CallModuleType,
    variables: BTreeMap<String, Value>,
    original_wd: PathBuf,
}

impl Default for ModuleLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleLoader {
    /// Creates a loader following local module calls.
    #[must_use]
    pub fn new() -> Self {
        Self {
            call_module_type: CallModuleType::default(),
            variables: BTreeMap::new(),
            original_wd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Sets which module calls are followed.
    #[must_use]
    pub fn call_module_type(mut self, call_module_type: CallModuleType) -> Self {
        self.call_module_type = call_module_type;
        self
    }

    /// Sets values for the root module's input variables.
    #[must_use]
    pub fn variables(mut self, variables: BTreeMap<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Sets the working directory file names are made relative to.
    #[must_use]
    pub fn original_wd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.original_wd = dir.into();
        self
    }

    /// Loads the module in `dir` and, depending on the call module type,
    /// the local modules it calls.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be read or a file fails to
    /// parse.
    pub fn load(&self, dir: &Path) -> Result<Arc<Module>, LoadError> {
        let root_dir = self.display_dir(dir);
        let mut stack = Vec::new();
        let module = self.load_module(
            dir,
            ModulePath::root(),
            self.variables.clone(),
            &root_dir,
            &mut stack,
        )?;
        Ok(Arc::new(module))
    }

    fn load_module(
        &self,
        dir: &Path,
        path: ModulePath,
        inputs: BTreeMap<String, Value>,
        root_dir: &str,
        stack: &mut Vec<PathBuf>,
    ) -> Result<Module, LoadError> {
        if !dir.is_dir() {
            return Err(LoadError::NotFound(dir.to_path_buf()));
        }
        let canonical = dir.canonicalize().map_err(|e| LoadError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        if stack.contains(&canonical) {
            return Err(LoadError::Cycle(path));
        }

        let dir_name = self.display_dir(dir);
        let files = read_files(dir, &dir_name)?;
        info!(module = %path, dir = %dir_name, files = files.len(), "Loaded module");

        let mut module = Module {
            path,
            dir: dir_name,
            files,
            inputs,
            children: Vec::new(),
        };

        if self.call_module_type == CallModuleType::Local {
            stack.push(canonical);
            let paths = EvalPaths {
                module: module.dir.clone(),
                root: root_dir.to_string(),
                cwd: self.original_wd.display().to_string(),
            };
            let scope = EvalScope::new(&module, paths);
            let mut children = Vec::new();
            for parsed in &module.files {
                for block in parsed.body.blocks().filter(|b| b.ident.as_str() == "module") {
                    let Some(call) = ModuleCall::read(block, &parsed.file, &scope) else {
                        continue;
                    };
                    let child_dir = dir.join(&call.source);
                    let child = self.load_module(
                        &child_dir,
                        module.path.child(&call.name),
                        call.inputs,
                        root_dir,
                        stack,
                    )?;
                    children.push(Arc::new(child));
                }
            }
            stack.pop();
            module.children = children;
        }

        Ok(module)
    }

    fn display_dir(&self, dir: &Path) -> String {
        let relative = dir.strip_prefix(&self.original_wd).unwrap_or(dir);
        let normalized = normalize(relative);
        if normalized.as_os_str().is_empty() {
            ".".to_string()
        } else {
            normalized.display().to_string()
        }
    }
}

struct ModuleCall {
    name: String,
    source: String,
    inputs: BTreeMap<String, Value>,
}

impl ModuleCall {
    fn read(block: &Block, file: &SourceFile, scope: &EvalScope) -> Option<Self> {
        let [label] = block.labels.as_slice() else {
            return None;
        };
        let name = label.as_str().to_string();
        let source_attr = block.body.get_attribute("source")?;
        let source_expr = Expression::from_span(file, source_attr.value.span().unwrap_or_default());
        let Ok(Value::String(source)) = scope.evaluate(&source_expr) else {
            debug!(module = %name, "Skipping module call with unknown source");
            return None;
        };
        if !(source.starts_with("./") || source.starts_with("../")) {
            debug!(module = %name, %source, "Skipping remote module");
            return None;
        }
        let count = instances(block, file, scope);
        if !count.is_created() {
            debug!(module = %name, ?count, "Skipping module that is not created");
            return None;
        }

        let mut inputs = BTreeMap::new();
        for attr in block.body.attributes() {
            let key = attr.key.as_str();
            if META_ARGUMENTS.contains(&key) {
                continue;
            }
            let expr = Expression::from_span(file, attr.value.span().unwrap_or_default());
            if let Ok(value) = scope.evaluate(&expr) {
                inputs.insert(key.to_string(), value);
            }
        }
        Some(Self {
            name,
            source,
            inputs,
        })
    }
}

fn read_files(dir: &Path, display: &str) -> Result<Vec<ParsedFile>, LoadError> {
    let json_pattern = dir.join("*.tf.json");
    for path in glob::glob(&json_pattern.to_string_lossy())?.flatten() {
        warn!(file = %path.display(), "JSON configuration files are not supported; skipping");
    }

    let pattern = dir.join("*.tf");
    let mut paths: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())?
        .flatten()
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    let mut diags = Diagnostics::new();
    for path in paths {
        let source = std::fs::read_to_string(&path).map_err(|e| LoadError::Io {
            path: path.clone(),
            source: e,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = if display == "." {
            file_name
        } else {
            format!("{display}/{file_name}")
        };
        match ParsedFile::parse(SourceFile::new(name, source)) {
            Ok(parsed) => files.push(parsed),
            Err(errs) => diags.extend(errs),
        }
    }
    if diags.is_empty() {
        Ok(files)
    } else {
        Err(LoadError::Parse(diags))
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
