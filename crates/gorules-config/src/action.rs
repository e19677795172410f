//! Compile action configuration
//!
//! A `CompileConfiguration` is the single description of one package compile.
//! It is built once by the driver and threaded read-only through every stage.

use crate::toolchain::{is_empty_path, Toolchain};
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default import path of the coverage registration package
pub const DEFAULT_COVERDATA_IMPORT: &str = "github.com/bazelbuild/rules_go/go/tools/coverdata";

/// Full configuration of a package compile action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CompileConfiguration {
    /// Package path embedded in compiled symbols (`-p`)
    pub package_path: String,

    /// Import path of the package; defaults to the package path
    #[serde(default)]
    pub import_path: String,

    /// Unfiltered source files (.go, .s, .h, .c, ...)
    #[serde(default)]
    pub sources: Vec<PathBuf>,

    /// Direct dependencies
    #[serde(default, rename = "deps")]
    pub dependencies: Vec<Dependency>,

    /// Native archives whose objects are repacked into the output
    #[serde(default)]
    pub native_archives: Vec<PathBuf>,

    /// Standard library package list
    #[serde(default)]
    pub std_packages: Vec<String>,

    /// File with one standard library package per line, merged into
    /// `std_packages` on load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_list: Option<PathBuf>,

    /// Extra compiler flags
    #[serde(default)]
    pub gc_flags: Vec<String>,

    /// Extra assembler flags
    #[serde(default)]
    pub asm_flags: Vec<String>,

    /// Test package filtering
    #[serde(default)]
    pub test_filter: TestFilter,

    /// Coverage instrumentation, off when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<Coverage>,

    /// Static analyzer, skipped when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<Analyzer>,

    /// How object files are merged into the output archive
    #[serde(default)]
    pub merge: MergeStrategy,

    /// Output archive
    pub output: PathBuf,

    /// Analysis facts output, required with an analyzer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facts_output: Option<PathBuf>,

    /// Toolchain
    pub toolchain: Toolchain,
}

/// A direct dependency of the package being compiled
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Dependency {
    /// Path used by import declarations
    pub import_path: String,
    /// Path the dependency was compiled with (importmap target)
    pub package_path: String,
    /// Compiled archive
    pub archive: PathBuf,
    /// Analysis facts produced for the dependency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facts: Option<PathBuf>,
}

impl Dependency {
    /// Create a dependency whose package path equals its import path
    pub fn new(import_path: impl Into<String>, archive: impl Into<PathBuf>) -> Self {
        let import_path = import_path.into();
        Self {
            package_path: import_path.clone(),
            import_path,
            archive: archive.into(),
            facts: None,
        }
    }

    /// Set the package path
    pub fn with_package_path(mut self, package_path: impl Into<String>) -> Self {
        self.package_path = package_path.into();
        self
    }

    /// Set the facts file
    pub fn with_facts(mut self, facts: impl Into<PathBuf>) -> Self {
        self.facts = Some(facts.into());
        self
    }
}

impl FromStr for Dependency {
    type Err = ConfigError;

    /// Parse `importpath=packagepath=archive[=facts]`
    fn from_str(s: &str) -> ConfigResult<Self> {
        let parts: Vec<&str> = s.split('=').collect();
        let (import_path, package_path, archive, facts) = match parts.as_slice() {
            [i, p, a] => (*i, *p, *a, None),
            [i, p, a, x] => (*i, *p, *a, Some(*x)),
            _ => {
                return Err(ConfigError::invalid(
                    "arc",
                    format!("expected importpath=packagepath=file[=facts], got '{}'", s),
                ))
            }
        };
        if import_path.is_empty() || archive.is_empty() {
            return Err(ConfigError::invalid(
                "arc",
                format!("import path and archive are required in '{}'", s),
            ));
        }
        Ok(Self {
            import_path: import_path.to_string(),
            package_path: if package_path.is_empty() {
                import_path.to_string()
            } else {
                package_path.to_string()
            },
            archive: PathBuf::from(archive),
            facts: facts.filter(|f| !f.is_empty()).map(PathBuf::from),
        })
    }
}

/// Which sources of a mixed library/external-test source set are compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestFilter {
    /// Keep every source
    #[default]
    Off,
    /// Keep only sources of the `_test` package
    Only,
    /// Drop sources of the `_test` package
    Exclude,
}

impl TestFilter {
    /// Get filter name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Only => "only",
            Self::Exclude => "exclude",
        }
    }

    /// Whether a source of package `pkg` is kept
    pub fn keeps(&self, pkg: &str) -> bool {
        let is_test = pkg.ends_with("_test");
        match self {
            Self::Off => true,
            Self::Only => is_test,
            Self::Exclude => !is_test,
        }
    }
}

impl FromStr for TestFilter {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s {
            "off" => Ok(Self::Off),
            "only" => Ok(Self::Only),
            "exclude" => Ok(Self::Exclude),
            other => Err(ConfigError::invalid(
                "testfilter",
                format!("invalid test filter '{}'", other),
            )),
        }
    }
}

impl fmt::Display for TestFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Coverage counter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverMode {
    Set,
    Count,
    Atomic,
}

impl CoverMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Count => "count",
            Self::Atomic => "atomic",
        }
    }
}

impl FromStr for CoverMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s {
            "set" => Ok(Self::Set),
            "count" => Ok(Self::Count),
            "atomic" => Ok(Self::Atomic),
            other => Err(ConfigError::invalid(
                "cover_mode",
                format!("invalid coverage mode '{}'", other),
            )),
        }
    }
}

impl fmt::Display for CoverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Coverage instrumentation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Coverage {
    /// Counter mode
    pub mode: CoverMode,
    /// Sources to instrument; each must also be listed in `sources`
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    /// Import path of the package instrumented files register with
    #[serde(default = "default_coverdata_import")]
    pub coverdata_import: String,
}

fn default_coverdata_import() -> String {
    DEFAULT_COVERDATA_IMPORT.to_string()
}

impl Coverage {
    pub fn new(mode: CoverMode, sources: Vec<PathBuf>) -> Self {
        Self {
            mode,
            sources,
            coverdata_import: default_coverdata_import(),
        }
    }
}

/// Static analyzer settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Analyzer {
    /// Analyzer binary
    pub binary: PathBuf,
}

/// Strategy for appending object files to the output archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Append members in process
    #[default]
    Native,
    /// Run `go tool pack r`
    Pack,
}

impl FromStr for MergeStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s {
            "native" => Ok(Self::Native),
            "pack" => Ok(Self::Pack),
            other => Err(ConfigError::invalid(
                "merge",
                format!("invalid merge strategy '{}'", other),
            )),
        }
    }
}

impl CompileConfiguration {
    /// Create a configuration with no sources or dependencies
    pub fn new(
        package_path: impl Into<String>,
        output: impl Into<PathBuf>,
        toolchain: Toolchain,
    ) -> Self {
        Self {
            package_path: package_path.into(),
            import_path: String::new(),
            sources: Vec::new(),
            dependencies: Vec::new(),
            native_archives: Vec::new(),
            std_packages: Vec::new(),
            package_list: None,
            gc_flags: Vec::new(),
            asm_flags: Vec::new(),
            test_filter: TestFilter::Off,
            coverage: None,
            analyzer: None,
            merge: MergeStrategy::Native,
            output: output.into(),
            facts_output: None,
            toolchain,
        }
    }

    /// Load an action file, resolve its package list and validate it
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let mut config = Self::parse_file(path)?;
        config.resolve_package_list()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse an action file without resolving or validating it
    ///
    /// Used when the file is only a base that other settings override.
    pub fn parse_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError {
                    path: path.to_path_buf(),
                    error: e,
                }
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })
    }

    /// Merge the contents of `package_list` into `std_packages`
    pub fn resolve_package_list(&mut self) -> ConfigResult<()> {
        if let Some(list) = &self.package_list {
            for pkg in load_package_list(list)? {
                if !self.std_packages.contains(&pkg) {
                    self.std_packages.push(pkg);
                }
            }
        }
        Ok(())
    }

    /// Import path, falling back to the package path
    pub fn effective_import_path(&self) -> &str {
        if self.import_path.is_empty() {
            &self.package_path
        } else {
            &self.import_path
        }
    }

    /// Validate the configuration before anything runs
    pub fn validate(&self) -> ConfigResult<()> {
        if self.package_path.is_empty() {
            return Err(ConfigError::MissingField("package_path".to_string()));
        }
        if is_empty_path(&self.output) {
            return Err(ConfigError::MissingField("output".to_string()));
        }

        self.toolchain.validate()?;

        let mut seen = HashSet::new();
        for dep in &self.dependencies {
            if dep.import_path.is_empty() {
                return Err(ConfigError::invalid("deps", "import path cannot be empty"));
            }
            if is_empty_path(&dep.archive) {
                return Err(ConfigError::invalid(
                    "deps",
                    format!("dependency '{}' has no archive", dep.import_path),
                ));
            }
            if !seen.insert(dep.import_path.as_str()) {
                return Err(ConfigError::invalid(
                    "deps",
                    format!("duplicate dependency '{}'", dep.import_path),
                ));
            }
        }

        if let Some(analyzer) = &self.analyzer {
            if is_empty_path(&analyzer.binary) {
                return Err(ConfigError::MissingField("analyzer.binary".to_string()));
            }
            if self.facts_output.as_deref().map_or(true, is_empty_path) {
                return Err(ConfigError::MissingField("facts_output".to_string()));
            }
        }

        if let Some(coverage) = &self.coverage {
            for src in &coverage.sources {
                if !self.sources.contains(src) {
                    return Err(ConfigError::invalid(
                        "coverage.sources",
                        format!("{} is not a source of the package", src.display()),
                    ));
                }
            }
            if coverage.coverdata_import.is_empty() {
                return Err(ConfigError::invalid(
                    "coverage.coverdata_import",
                    "cannot be empty",
                ));
            }
        }

        Ok(())
    }
}

/// Read a package list file: one import path per line, blank lines ignored
pub fn load_package_list(path: &Path) -> ConfigResult<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        error: e,
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
