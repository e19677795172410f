/// Compile action error types
use gorules_config::ConfigError;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("unrecognized file extension: {}", .0.display())]
    UnrecognizedExtension(PathBuf),

    #[error("{}: {reason}", .path.display())]
    SourceParse { path: PathBuf, reason: String },

    #[error("{0}")]
    MissingDependencies(MissingDependencies),

    #[error("Failed to instrument {} for coverage: {reason}", .path.display())]
    Instrumentation { path: PathBuf, reason: String },

    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Analyzer reported findings; the message is its output verbatim
    #[error("{0}")]
    Analysis(String),

    #[error("{}: {reason}", .path.display())]
    Archive { path: PathBuf, reason: String },

    #[error("I/O error at {}: {error}", .path.display())]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }

    /// Create a source parse error
    pub fn source_parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::SourceParse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an instrumentation error
    pub fn instrumentation(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Instrumentation {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a malformed archive error
    pub fn archive(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Archive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// A subprocess that could not be started or exited unsuccessfully
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("error running {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Display is the captured output verbatim
    #[error("{}", exit_message(.tool, .status, .output))]
    Exit {
        tool: String,
        status: ExitStatus,
        output: String,
    },
}

impl ToolError {
    /// Tool name
    pub fn tool(&self) -> &str {
        match self {
            Self::Launch { tool, .. } | Self::Exit { tool, .. } => tool,
        }
    }
}

fn exit_message(tool: &str, status: &ExitStatus, output: &str) -> String {
    if output.trim().is_empty() {
        format!("{} failed: {}", tool, status)
    } else {
        output.to_string()
    }
}

/// Imports that are neither standard library nor declared dependencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependencies {
    /// (source file, import path) pairs in source order
    pub missing: Vec<(PathBuf, String)>,
    /// Declared dependency import paths
    pub known: Vec<String>,
}

impl fmt::Display for MissingDependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "missing strict dependencies:")?;
        for (file, import) in &self.missing {
            writeln!(f, "\t{}: import of \"{}\"", file.display(), import)?;
        }
        if self.known.is_empty() {
            writeln!(f, "No dependencies were provided.")?;
        } else {
            writeln!(f, "Known dependencies are:")?;
            for known in &self.known {
                writeln!(f, "\t{}", known)?;
            }
        }
        write!(
            f,
            "Check that imports in Go sources match importpath attributes in deps."
        )
    }
}
