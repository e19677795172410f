//! gorules configuration
//!
//! Describes a single package compile action:
//! - The package being compiled (package path, import path, sources)
//! - Its direct dependencies and their archives
//! - Optional coverage instrumentation and static analysis
//! - The Go toolchain the action runs against
//!
//! A configuration is assembled once, either from a TOML action file or by
//! the command line driver, validated, and then only read.
//!
//! # Example
//!
//! ```no_run
//! use gorules_config::CompileConfiguration;
//! use std::path::Path;
//!
//! let config = CompileConfiguration::from_file(Path::new("action.toml")).unwrap();
//! println!("compiling {}", config.package_path);
//! ```

pub mod action;
pub mod toolchain;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Missing required field '{0}'")]
    MissingField(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use action::{
    load_package_list, Analyzer, CompileConfiguration, CoverMode, Coverage, Dependency,
    MergeStrategy, TestFilter,
};
pub use toolchain::Toolchain;
