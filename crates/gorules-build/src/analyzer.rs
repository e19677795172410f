//! Static analysis running alongside compilation
//!
//! The analyzer is started on a background thread before the compiler and
//! joined after the archive is complete. If the action fails first, dropping
//! the [`AnalyzerTask`] kills the analyzer process and waits for the thread,
//! so no analyzer outlives the action or its work directory.
//!
//! On unix the analyzer leads its own process group and cancellation kills
//! the whole group, including processes started by wrapper scripts.

use crate::error::{BuildResult, ToolError};
use crate::tool::ToolCommand;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Name used for the analyzer in diagnostics
pub const ANALYZER_TOOL: &str = "nogo";

/// Inputs of one analyzer run
#[derive(Debug, Clone)]
pub struct AnalyzerInputs<'a> {
    pub binary: &'a Path,
    pub package_path: &'a str,
    pub importcfg: &'a Path,
    /// Standard library imports of the package
    pub std_imports: &'a [String],
    /// (import path, facts file) for each dependency that has facts
    pub facts: Vec<(String, PathBuf)>,
    pub facts_output: &'a Path,
    pub srcs: &'a [PathBuf],
}

/// Build the analyzer command line
pub fn analyzer_command(inputs: &AnalyzerInputs<'_>) -> ToolCommand {
    let mut cmd = ToolCommand::new(ANALYZER_TOOL, inputs.binary)
        .args(["-p", inputs.package_path])
        .arg("-importcfg")
        .path_arg(inputs.importcfg);
    for import in inputs.std_imports {
        cmd = cmd.arg("-stdimport").arg(import.as_str());
    }
    for (import, facts) in &inputs.facts {
        cmd = cmd
            .arg("-fact")
            .arg(format!("{}={}", import, facts.display()));
    }
    cmd.arg("-x")
        .path_arg(inputs.facts_output)
        .path_args(inputs.srcs)
        .absolutize(&["-importcfg", "-x"])
}

/// Outcome of a completed analyzer run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    pub success: bool,
    pub status: ExitStatus,
    /// Combined stdout and stderr
    pub output: String,
    /// Facts file the analyzer was asked to write
    pub facts: PathBuf,
}

impl AnalysisResult {
    /// Diagnostic for a failed run: the output verbatim, or the exit status
    /// when the analyzer printed nothing
    pub fn failure_message(&self) -> String {
        if self.output.trim().is_empty() {
            format!("{} failed: {}", ANALYZER_TOOL, self.status)
        } else {
            self.output.clone()
        }
    }
}

enum Completion {
    Finished(AnalysisResult),
    Cancelled,
}

/// A running analyzer
///
/// Dropping the task without calling [`AnalyzerTask::join`] cancels it.
pub struct AnalyzerTask {
    cancel: Option<Sender<()>>,
    thread: Option<JoinHandle<Result<Completion, ToolError>>>,
}

impl AnalyzerTask {
    /// Start `cmd` on a background thread, collecting its output in `log`
    pub fn spawn(cmd: ToolCommand, facts: PathBuf, log: PathBuf) -> BuildResult<Self> {
        debug!(argv = ?cmd.argv(), "starting analyzer");
        let (cancel, cancelled) = mpsc::channel();
        let tool = cmd.name().to_string();

        let thread = thread::Builder::new()
            .name("analyzer".to_string())
            .spawn(move || supervise(&cmd, facts, &log, &cancelled))
            .map_err(|source| ToolError::Launch { tool, source })?;

        Ok(Self {
            cancel: Some(cancel),
            thread: Some(thread),
        })
    }

    /// Wait for the analyzer to finish on its own
    pub fn join(mut self) -> Result<AnalysisResult, ToolError> {
        let completion = self.wait();
        self.cancel.take();
        match completion? {
            Completion::Finished(result) => Ok(result),
            Completion::Cancelled => Err(ToolError::Launch {
                tool: ANALYZER_TOOL.to_string(),
                source: io::Error::new(io::ErrorKind::Interrupted, "analysis was cancelled"),
            }),
        }
    }

    /// Stop the analyzer and wait for it to exit
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if self.thread.is_some() {
            match self.wait() {
                Ok(Completion::Cancelled) => debug!("analyzer cancelled"),
                Ok(Completion::Finished(_)) => debug!("analyzer finished before cancellation"),
                Err(e) => warn!(error = %e, "analyzer failed during cancellation"),
            }
        }
    }

    fn wait(&mut self) -> Result<Completion, ToolError> {
        let Some(thread) = self.thread.take() else {
            return Ok(Completion::Cancelled);
        };
        thread.join().unwrap_or_else(|_| {
            Err(ToolError::Launch {
                tool: ANALYZER_TOOL.to_string(),
                source: io::Error::new(io::ErrorKind::Other, "analyzer thread panicked"),
            })
        })
    }
}

impl Drop for AnalyzerTask {
    fn drop(&mut self) {
        self.stop();
    }
}

fn supervise(
    cmd: &ToolCommand,
    facts: PathBuf,
    log: &Path,
    cancelled: &Receiver<()>,
) -> Result<Completion, ToolError> {
    let launch = |source: io::Error| ToolError::Launch {
        tool: cmd.name().to_string(),
        source,
    };

    let stdout = File::create(log).map_err(launch)?;
    let stderr = stdout.try_clone().map_err(launch)?;
    let mut command = cmd.command();
    command.stdin(Stdio::null()).stdout(stdout).stderr(stderr);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let mut child = command.spawn().map_err(launch)?;

    loop {
        if let Some(status) = child.try_wait().map_err(launch)? {
            let output = fs::read(log)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .map_err(launch)?;
            debug!(%status, "analyzer exited");
            return Ok(Completion::Finished(AnalysisResult {
                success: status.success(),
                status,
                output,
                facts,
            }));
        }

        match cancelled.recv_timeout(POLL_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                kill_process_group(&mut child);
                let _ = child.wait();
                return Ok(Completion::Cancelled);
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    // The child leads its own group, so its pid is the group id.
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: killpg only sends a signal to the group created for this child.
        if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
            return;
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_analyzer_command_line() {
        let std_imports = vec!["fmt".to_string(), "os".to_string()];
        let srcs = vec![PathBuf::from("/src/a.go"), PathBuf::from("/src/b.go")];
        let inputs = AnalyzerInputs {
            binary: Path::new("/bin/nogo"),
            package_path: "example.com/p",
            importcfg: Path::new("/work/importcfg"),
            std_imports: &std_imports,
            facts: vec![("example.com/dep".to_string(), PathBuf::from("/deps/dep.x"))],
            facts_output: Path::new("/out/p.x"),
            srcs: &srcs,
        };

        let cmd = analyzer_command(&inputs);
        assert_eq!(cmd.name(), "nogo");
        assert_eq!(
            cmd.tool_args(),
            [
                "-p",
                "example.com/p",
                "-importcfg",
                "/work/importcfg",
                "-stdimport",
                "fmt",
                "-stdimport",
                "os",
                "-fact",
                "example.com/dep=/deps/dep.x",
                "-x",
                "/out/p.x",
                "/src/a.go",
                "/src/b.go",
            ]
        );
    }

    #[cfg(unix)]
    fn shell(script: &str) -> ToolCommand {
        ToolCommand::new(ANALYZER_TOOL, "sh").args(["-c", script])
    }

    #[cfg(unix)]
    #[test]
    fn test_join_collects_output() {
        let dir = TempDir::new().unwrap();
        let task = AnalyzerTask::spawn(
            shell("echo finding; echo more >&2"),
            dir.path().join("p.x"),
            dir.path().join("nogo.out"),
        )
        .unwrap();

        let result = task.join().unwrap();
        assert!(result.success);
        assert!(result.output.contains("finding\n"));
        assert!(result.output.contains("more\n"));
        assert_eq!(result.facts, dir.path().join("p.x"));
    }

    #[cfg(unix)]
    #[test]
    fn test_join_reports_failure() {
        let dir = TempDir::new().unwrap();
        let task = AnalyzerTask::spawn(
            shell("echo 'a.go:1:1: bad thing'; exit 1"),
            dir.path().join("p.x"),
            dir.path().join("nogo.out"),
        )
        .unwrap();

        let result = task.join().unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "a.go:1:1: bad thing\n");
        assert_eq!(result.failure_message(), "a.go:1:1: bad thing\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_silent_failure_reports_status() {
        let dir = TempDir::new().unwrap();
        let task = AnalyzerTask::spawn(
            shell("exit 3"),
            dir.path().join("p.x"),
            dir.path().join("nogo.out"),
        )
        .unwrap();

        let result = task.join().unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "");
        let message = result.failure_message();
        assert!(message.starts_with("nogo failed: "), "{}", message);
        assert!(message.contains('3'), "{}", message);
    }

    #[cfg(unix)]
    #[test]
    fn test_drop_stops_long_running_analyzer() {
        let dir = TempDir::new().unwrap();
        let task = AnalyzerTask::spawn(
            shell("exec sleep 30"),
            dir.path().join("p.x"),
            dir.path().join("nogo.out"),
        )
        .unwrap();

        let started = std::time::Instant::now();
        drop(task);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    /// Zombies awaiting their new parent count as stopped
    #[cfg(unix)]
    fn process_alive(pid: &str) -> bool {
        if let Ok(stat) = fs::read_to_string(format!("/proc/{}/stat", pid)) {
            let state = stat.rsplit(')').next().and_then(|rest| rest.trim().chars().next());
            return state.is_some_and(|s| s != 'Z' && s != 'X');
        }
        std::process::Command::new("kill")
            .args(["-0", pid])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[cfg(unix)]
    #[test]
    fn test_drop_stops_processes_started_by_wrapper() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("child.pid");
        let script = format!(
            "sleep 30 & echo $! > '{0}.tmp'; mv '{0}.tmp' '{0}'; wait",
            pid_file.display()
        );
        let task = AnalyzerTask::spawn(
            shell(&script),
            dir.path().join("p.x"),
            dir.path().join("nogo.out"),
        )
        .unwrap();

        let started = std::time::Instant::now();
        while !pid_file.exists() {
            assert!(started.elapsed() < Duration::from_secs(10), "wrapper never started");
            thread::sleep(POLL_INTERVAL);
        }
        let pid = fs::read_to_string(&pid_file).unwrap();
        drop(task);

        // The orphaned sleep is reaped asynchronously once killed.
        let stopped = std::time::Instant::now();
        while process_alive(pid.trim()) {
            assert!(
                stopped.elapsed() < Duration::from_secs(5),
                "process {} started by the analyzer still running",
                pid.trim()
            );
            thread::sleep(POLL_INTERVAL);
        }
    }

    #[test]
    fn test_missing_binary_is_launch_error() {
        let dir = TempDir::new().unwrap();
        let task = AnalyzerTask::spawn(
            ToolCommand::new(ANALYZER_TOOL, "/definitely/not/nogo"),
            dir.path().join("p.x"),
            dir.path().join("nogo.out"),
        )
        .unwrap();

        let err = task.join().unwrap_err();
        assert!(err.to_string().starts_with("error running nogo: "));
    }
}
