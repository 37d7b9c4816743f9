//! Script execution with output streaming and timeout enforcement

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::error::{Error, Result};

/// Default wall-clock budget for a single script.
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// File extensions eligible for post-deployment execution.
const ELIGIBLE_EXTENSIONS: [&str; 3] = ["cmd", "bat", "ps1"];

/// One script to execute: the file plus its wall-clock budget.
#[derive(Debug, Clone)]
pub struct ScriptJob {
    /// Path to the script file
    pub path: PathBuf,
    /// Wall-clock budget for the whole run
    pub timeout: Duration,
}

impl ScriptJob {
    /// Create a job for the given script with the given timeout
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    /// File name of the script, for logging and error reporting
    pub fn script_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Select the interpreter for this script.
    ///
    /// PowerShell scripts are launched through a PowerShell host with a
    /// remote-signed execution policy; everything else runs directly as an
    /// executable with no arguments.
    pub fn command(&self) -> Command {
        let is_powershell = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("ps1"));

        if is_powershell {
            let mut cmd = Command::new("powershell");
            cmd.arg("-ExecutionPolicy")
                .arg("RemoteSigned")
                .arg("-File")
                .arg(&self.path);
            cmd
        } else {
            Command::new(&self.path)
        }
    }
}

/// Outcome of a successfully completed script.
///
/// A run that hits its timeout never produces a result; it fails with
/// [`Error::Timeout`] instead.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Exit code reported by the process
    pub exit_code: i32,
}

/// Runs external scripts with streamed output and timeout enforcement
pub struct ScriptRunner {
    timeout: Duration,
}

impl ScriptRunner {
    /// Create a runner applying the given per-script timeout
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run a single script to completion.
    ///
    /// Output is forwarded line by line as it arrives; a timeout kills the
    /// process and fails with [`Error::Timeout`]; a non-zero exit code fails
    /// with [`Error::NonZeroExit`].
    pub async fn run(&self, script: &Path) -> Result<ProcessResult> {
        self.run_job(&ScriptJob::new(script, self.timeout)).await
    }

    /// Run a prepared [`ScriptJob`]
    pub async fn run_job(&self, job: &ScriptJob) -> Result<ProcessResult> {
        let name = job.script_name();
        let mut cmd = job.command().prepare();
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        debug!(script = %name, timeout = ?job.timeout, "starting script");
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::spawn_failed(name.clone(), e.to_string()))?;
        let pid = child.id();

        // Stdout and stderr readers run concurrently with the supervised
        // process; they end on their own once the pipes close.
        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, name.clone(), false)));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, name.clone(), true)));

        let status = match time::timeout(job.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(script = %name, pid, timeout = ?job.timeout, "script timed out, killing");
                if let Err(e) = child.kill().await {
                    warn!(script = %name, pid, error = %e, "failed to kill timed-out script");
                }
                drain(stdout_task, stderr_task).await;
                return Err(Error::Timeout {
                    script: name,
                    pid,
                    timeout: job.timeout,
                });
            }
        };

        drain(stdout_task, stderr_task).await;

        let code = status.code().unwrap_or(-1);
        if code != 0 {
            return Err(Error::NonZeroExit {
                script: name,
                pid,
                code,
            });
        }

        debug!(script = %name, "script completed");
        Ok(ProcessResult { exit_code: code })
    }

    /// Run every eligible script under `dir` in lexicographic order.
    ///
    /// The first failure aborts the remaining sequence and propagates; there
    /// is no partial-success policy.
    pub async fn run_all(&self, dir: &Path) -> Result<()> {
        let scripts = discover_scripts(dir)?;
        if scripts.is_empty() {
            debug!(dir = %dir.display(), "no post-deployment scripts found");
            return Ok(());
        }
        info!(dir = %dir.display(), count = scripts.len(), "running post-deployment scripts");
        for script in &scripts {
            self.run(script).await?;
        }
        Ok(())
    }
}

/// Forward non-blank lines from a child pipe to the tracer as they arrive.
async fn forward_lines<R: AsyncRead + Unpin>(reader: R, script: String, is_stderr: bool) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        if is_stderr {
            error!(script = %script, "{}", line);
        } else {
            info!(script = %script, "{}", line);
        }
    }
}

async fn drain(
    stdout_task: Option<tokio::task::JoinHandle<()>>,
    stderr_task: Option<tokio::task::JoinHandle<()>>,
) {
    if let Some(task) = stdout_task {
        let _ = task.await;
    }
    if let Some(task) = stderr_task {
        let _ = task.await;
    }
}

/// List the eligible scripts under `dir` in lexicographic file-name order.
///
/// Only `.cmd`, `.bat` and `.ps1` files are eligible; a missing directory
/// yields an empty batch.
pub fn discover_scripts(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut scripts: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_eligible(path))
        .collect();
    scripts.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(scripts)
}

fn is_eligible(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            ELIGIBLE_EXTENSIONS
                .iter()
                .any(|eligible| ext.eq_ignore_ascii_case(eligible))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligible_extensions() {
        assert!(is_eligible(Path::new("deploy.cmd")));
        assert!(is_eligible(Path::new("deploy.BAT")));
        assert!(is_eligible(Path::new("deploy.ps1")));
        assert!(!is_eligible(Path::new("deploy.sh")));
        assert!(!is_eligible(Path::new("deploy.txt")));
        assert!(!is_eligible(Path::new("deploy")));
    }

    #[test]
    fn test_powershell_interpreter_selection() {
        let job = ScriptJob::new("/scripts/setup.ps1", DEFAULT_SCRIPT_TIMEOUT);
        let cmd = job.command();
        assert_eq!(cmd.get_program(), "powershell");
        assert_eq!(cmd.get_args()[0], "-ExecutionPolicy");
        assert_eq!(cmd.get_args()[1], "RemoteSigned");
        assert_eq!(cmd.get_args()[2], "-File");
        assert_eq!(cmd.get_args()[3], "/scripts/setup.ps1");
    }

    #[test]
    fn test_direct_interpreter_selection() {
        let job = ScriptJob::new("/scripts/setup.cmd", DEFAULT_SCRIPT_TIMEOUT);
        let cmd = job.command();
        assert_eq!(cmd.get_program(), "/scripts/setup.cmd");
        assert!(cmd.get_args().is_empty());
    }
}
