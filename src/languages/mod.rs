//! Language registry.
//!
//! Maps a language identifier to the sandbox image and the command line
//! that turns a source file into a running program. The registry is built
//! once at startup and shared read-only by every job.
//!
//! # Example
//!
//! ```
//! use code_runner::languages::LanguageRegistry;
//!
//! let registry = LanguageRegistry::builtin();
//! let python = registry.lookup("python").expect("python is built in");
//! assert_eq!(python.source_file, "program.py");
//! assert_eq!(python.command_line(), "python3 program.py");
//! ```

mod builtin;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Deadline applied to languages that do not set one.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 15;

/// How to build and run one language inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSpec {
    /// Identifier used in requests (e.g. "python").
    #[serde(default)]
    pub id: String,
    /// Sandbox image reference.
    pub image: String,
    /// Name of the source file written into the workspace.
    #[serde(default)]
    pub source_file: String,
    /// Optional compile step, run before `run`.
    #[serde(default)]
    pub compile: Option<String>,
    /// Command that runs the program.
    pub run: String,
    /// Wall-clock deadline for the whole sandbox run.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl LanguageSpec {
    /// Creates a spec whose source file is `program.<extension>`.
    pub fn new(
        id: impl Into<String>,
        image: impl Into<String>,
        extension: &str,
        run: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
            source_file: format!("program.{extension}"),
            compile: None,
            run: run.into(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }

    /// Sets the compile command.
    pub fn with_compile(mut self, compile: impl Into<String>) -> Self {
        self.compile = Some(compile.into());
        self
    }

    /// Overrides the source file name.
    pub fn with_source_file(mut self, file: impl Into<String>) -> Self {
        self.source_file = file.into();
        self
    }

    /// Sets the execution deadline in seconds.
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// The shell command executed in the sandbox.
    ///
    /// Compile and run are joined with `&&` so a failed compile never runs
    /// and its diagnostics become the error stream.
    pub fn command_line(&self) -> String {
        match self.compile.as_deref() {
            Some(compile) if !compile.trim().is_empty() => format!("{} && {}", compile, self.run),
            _ => self.run.clone(),
        }
    }

    /// Wall-clock deadline as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidLanguage {
            language: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.image.trim().is_empty() {
            return Err(invalid("image must not be empty"));
        }
        if self.run.trim().is_empty() {
            return Err(invalid("run command must not be empty"));
        }
        if self.source_file.is_empty()
            || self.source_file.contains('/')
            || self.source_file.contains('\\')
            || self.source_file == ".."
        {
            return Err(invalid("source file must be a plain file name"));
        }
        if self.timeout_seconds == 0 {
            return Err(invalid("timeout must be at least one second"));
        }
        Ok(())
    }
}

/// Shape of a language override file.
#[derive(Debug, Default, Deserialize)]
struct LanguageOverrides {
    #[serde(default)]
    languages: BTreeMap<String, LanguageSpec>,
}

/// Immutable lookup table from identifier to [`LanguageSpec`].
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    languages: BTreeMap<String, Arc<LanguageSpec>>,
}

impl LanguageRegistry {
    /// Registry containing the built-in language table.
    pub fn builtin() -> Self {
        Self::from_specs(builtin::languages())
    }

    /// Builds a registry from explicit specs, keyed by their `id`.
    pub fn from_specs(specs: impl IntoIterator<Item = LanguageSpec>) -> Self {
        let languages = specs
            .into_iter()
            .map(|spec| (spec.id.clone(), Arc::new(spec)))
            .collect();
        Self { languages }
    }

    /// Built-in table with the entries of a YAML override document merged in.
    ///
    /// An override replaces the whole entry for its identifier.
    pub fn with_overrides_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let overrides: LanguageOverrides = serde_yaml::from_str(yaml)?;
        let mut registry = Self::builtin();

        for (id, mut spec) in overrides.languages {
            let id = id.trim().to_lowercase();
            spec.id = id.clone();
            spec.validate()?;
            tracing::debug!(language = %id, image = %spec.image, "Language override loaded");
            registry.languages.insert(id, Arc::new(spec));
        }

        Ok(registry)
    }

    /// Loads the built-in table merged with the overrides in `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::with_overrides_yaml(&yaml)
    }

    /// Looks up a language by identifier (case-insensitive).
    pub fn lookup(&self, id: &str) -> Option<Arc<LanguageSpec>> {
        self.languages.get(&id.trim().to_lowercase()).cloned()
    }

    /// Supported identifiers in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(String::as_str)
    }

    /// All specs in identifier order.
    pub fn specs(&self) -> impl Iterator<Item = &LanguageSpec> {
        self.languages.values().map(|spec| spec.as_ref())
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
