//! Go toolchain description
//!
//! Everything the compile action would otherwise pick up from the process
//! environment (GOROOT, GOOS, GOCACHE, ...) is spelled out here and handed to
//! subprocesses explicitly.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Newest `go1.N` release tag satisfied by default.
pub const DEFAULT_GO_MINOR: u32 = 21;

/// Toolchain used by a compile action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Toolchain {
    /// Path to the `go` binary; tools are run as `go tool <name>`
    pub go: PathBuf,

    /// GOROOT of the toolchain
    pub goroot: PathBuf,

    /// Target operating system
    #[serde(default = "default_goos")]
    pub goos: String,

    /// Target architecture
    #[serde(default = "default_goarch")]
    pub goarch: String,

    /// Whether cgo is enabled (satisfies the `cgo` build tag)
    #[serde(default)]
    pub cgo_enabled: bool,

    /// Standard library install suffix, `<goos>_<goarch>` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_suffix: Option<String>,

    /// Extra build tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Release tags (`go1.1` ... `go1.N`)
    #[serde(default = "default_release_tags")]
    pub release_tags: Vec<String>,

    /// Compiler cache directory, exported to tools as GOCACHE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Directory under which the per-action work directory is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir_root: Option<PathBuf>,
}

fn default_goos() -> String {
    "linux".to_string()
}

fn default_goarch() -> String {
    "amd64".to_string()
}

/// Release tags `go1.1` through `go1.<DEFAULT_GO_MINOR>`
pub fn default_release_tags() -> Vec<String> {
    (1..=DEFAULT_GO_MINOR).map(|minor| format!("go1.{}", minor)).collect()
}

impl Toolchain {
    /// Create a toolchain for the given go binary and GOROOT with default target
    pub fn new(go: impl Into<PathBuf>, goroot: impl Into<PathBuf>) -> Self {
        Self {
            go: go.into(),
            goroot: goroot.into(),
            goos: default_goos(),
            goarch: default_goarch(),
            cgo_enabled: false,
            install_suffix: None,
            tags: Vec::new(),
            release_tags: default_release_tags(),
            cache_dir: None,
            work_dir_root: None,
        }
    }

    /// Set the target platform
    pub fn with_target(mut self, goos: impl Into<String>, goarch: impl Into<String>) -> Self {
        self.goos = goos.into();
        self.goarch = goarch.into();
        self
    }

    /// Set the work directory root
    pub fn with_work_dir_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_dir_root = Some(root.into());
        self
    }

    /// Standard library install suffix
    pub fn install_suffix(&self) -> String {
        self.install_suffix
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.goos, self.goarch))
    }

    /// Directory holding the compiled standard library archives
    pub fn std_pkg_dir(&self) -> PathBuf {
        self.goroot.join("pkg").join(self.install_suffix())
    }

    /// Standard assembly include directory
    pub fn asm_include_dir(&self) -> PathBuf {
        self.goroot.join("pkg").join("include")
    }

    /// Argument prefix for running a go tool, e.g. `go tool compile`
    pub fn tool_command(&self, tool: &str) -> Vec<String> {
        vec![
            self.go.display().to_string(),
            "tool".to_string(),
            tool.to_string(),
        ]
    }

    /// Environment variables passed to every toolchain subprocess
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();

        env.insert("GOROOT".to_string(), self.goroot.display().to_string());
        env.insert("GOOS".to_string(), self.goos.clone());
        env.insert("GOARCH".to_string(), self.goarch.clone());
        env.insert(
            "CGO_ENABLED".to_string(),
            if self.cgo_enabled { "1" } else { "0" }.to_string(),
        );
        if let Some(cache) = &self.cache_dir {
            env.insert("GOCACHE".to_string(), cache.display().to_string());
        }

        env
    }

    /// Validate the toolchain
    pub fn validate(&self) -> ConfigResult<()> {
        if is_empty_path(&self.go) {
            return Err(ConfigError::MissingField("toolchain.go".to_string()));
        }
        if is_empty_path(&self.goroot) {
            return Err(ConfigError::MissingField("toolchain.goroot".to_string()));
        }
        if self.goos.is_empty() {
            return Err(ConfigError::invalid("toolchain.goos", "cannot be empty"));
        }
        if self.goarch.is_empty() {
            return Err(ConfigError::invalid("toolchain.goarch", "cannot be empty"));
        }
        Ok(())
    }
}

pub(crate) fn is_empty_path(path: &Path) -> bool {
    path.as_os_str().is_empty()
}
