//! Subprocess execution for toolchain commands
//!
//! Every tool runs with its stdout and stderr captured; the captured text is
//! what a failing tool reports back to the caller.

use crate::error::ToolError;
use gorules_config::Toolchain;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Flags whose following value is a filesystem path
pub const PATH_FLAGS: [&str; 4] = ["-I", "-o", "-trimpath", "-importcfg"];

/// A fully assembled tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Name used in diagnostics
    name: String,
    /// Program followed by its arguments
    argv: Vec<String>,
    /// Explicit environment entries
    env: BTreeMap<String, String>,
}

impl ToolCommand {
    /// Create a command running `program`
    pub fn new(name: impl Into<String>, program: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            argv: vec![program.as_ref().display().to_string()],
            env: BTreeMap::new(),
        }
    }

    /// Create a `go tool <tool>` command with the toolchain environment
    pub fn go_tool(toolchain: &Toolchain, tool: &str) -> Self {
        Self {
            name: format!("go tool {}", tool),
            argv: toolchain.tool_command(tool),
            env: toolchain.environment(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    /// Append a path argument
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append path arguments
    pub fn path_args<'a, I>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = &'a PathBuf>,
    {
        self.args(paths.into_iter().map(|p| p.display().to_string()))
    }

    /// Make the value after each flag in `flags` absolute
    pub fn absolutize(mut self, flags: &[&str]) -> Self {
        abs_args(&mut self.argv, flags);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Arguments without the program or `go tool <name>` prefix
    pub fn tool_args(&self) -> &[String] {
        let skip = if self.name.starts_with("go tool ") { 3 } else { 1 };
        &self.argv[skip.min(self.argv.len())..]
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Build a `std::process::Command` for this invocation
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]).envs(&self.env);
        cmd
    }

    /// Run to completion, returning the captured output
    pub fn run(&self) -> Result<String, ToolError> {
        debug!(tool = %self.name, argv = ?self.argv, "running tool");

        let output = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ToolError::Launch {
                tool: self.name.clone(),
                source: e,
            })?
            .wait_with_output()
            .map_err(|e| ToolError::Launch {
                tool: self.name.clone(),
                source: e,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(ToolError::Exit {
                tool: self.name.clone(),
                status: output.status,
                output: text,
            });
        }

        Ok(text)
    }
}

/// Replace the value following each of `flags` with an absolute path
pub fn abs_args(args: &mut [String], flags: &[&str]) {
    let mut absolutize_next = false;
    for arg in args.iter_mut() {
        if absolutize_next {
            *arg = abs(Path::new(arg.as_str())).display().to_string();
            absolutize_next = false;
        } else {
            absolutize_next = flags.contains(&arg.as_str());
        }
    }
}

/// Absolute form of `path` relative to the current directory
pub fn abs(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
