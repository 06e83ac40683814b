//! Child process spawning with process-group cancellation

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Grace period between SIGINT and SIGKILL
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Process errors
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for child: {0}")]
    Wait(#[source] std::io::Error),
}

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    /// Exited on its own; `None` when killed by a signal
    Finished(Option<i32>),
    /// Stopped by the interrupt after cancellation
    Interrupted,
    /// Force-killed after the grace period
    Killed,
    /// Its exit status could not be read
    Failed,
}

impl ChildExit {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Finished(Some(0)))
    }
}

/// One line of child output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub line: String,
    pub is_stderr: bool,
}

/// What to run and where
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub command: String,
    /// Appended to the command, shell-quoted
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    /// Start from an empty environment instead of inheriting
    pub clear_env: bool,
}

impl ProcessSpec {
    pub fn new(command: impl Into<String>, cwd: &Path) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
            env: BTreeMap::new(),
            clear_env: false,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>, clear_env: bool) -> Self {
        self.env = env;
        self.clear_env = clear_env;
        self
    }

    /// Full shell command line
    pub fn command_line(&self) -> String {
        let mut line = self.command.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }
        line
    }
}

/// Quote an argument for `sh`
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// A running task process with merged stdout/stderr lines
pub struct TaskProcess {
    child: Child,
    lines: mpsc::Receiver<OutputLine>,
    pid: Option<u32>,
}

/// Start `spec` through the platform shell in its own process group
pub fn spawn_task_process(spec: &ProcessSpec) -> Result<TaskProcess, ProcessError> {
    let command_line = spec.command_line();
    let mut command = shell_command(&command_line);
    command
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if spec.clear_env {
        command.env_clear();
    }
    command.envs(&spec.env);

    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        command: command_line.clone(),
        source,
    })?;
    let pid = child.id();
    debug!(pid = ?pid, command = %command_line, "spawned task process");

    let (sender, lines) = mpsc::channel(256);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, false, sender.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, true, sender));
    }

    Ok(TaskProcess { child, lines, pid })
}

#[cfg(unix)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(command_line);
    command
}

#[cfg(not(unix))]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(command_line);
    command
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R, is_stderr: bool, sender: mpsc::Sender<OutputLine>) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if sender.send(OutputLine { line, is_stderr }).await.is_err() {
            break;
        }
    }
}

impl TaskProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Stream output into `on_line` until the child exits or `token` fires.
    ///
    /// On cancellation the whole process group gets SIGINT, then SIGKILL if
    /// it outlives `grace`.
    pub async fn wait_with_cancel(
        mut self,
        token: &CancellationToken,
        grace: Duration,
        mut on_line: impl FnMut(OutputLine),
    ) -> Result<ChildExit, ProcessError> {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return Ok(self.terminate(grace, &mut on_line).await);
                }
                line = self.lines.recv() => match line {
                    Some(line) => on_line(line),
                    None => break,
                },
            }
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => Ok(self.terminate(grace, &mut on_line).await),
            status = self.child.wait() => {
                let status = status.map_err(ProcessError::Wait)?;
                Ok(ChildExit::Finished(status.code()))
            }
        }
    }

    async fn terminate(&mut self, grace: Duration, on_line: &mut impl FnMut(OutputLine)) -> ChildExit {
        if let Ok(Some(status)) = self.child.try_wait() {
            self.drain(on_line);
            return ChildExit::Finished(status.code());
        }

        self.signal_group(Signal::Interrupt);
        let exit = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(_)) => ChildExit::Interrupted,
            Ok(Err(err)) => {
                warn!(error = %err, "failed to wait for interrupted child");
                ChildExit::Failed
            }
            Err(_) => {
                warn!(pid = ?self.pid, grace_secs = grace.as_secs(), "child ignored interrupt, killing");
                self.signal_group(Signal::Kill);
                match self.child.wait().await {
                    Ok(_) => ChildExit::Killed,
                    Err(_) => ChildExit::Failed,
                }
            }
        };
        self.drain(on_line);
        exit
    }

    fn drain(&mut self, on_line: &mut impl FnMut(OutputLine)) {
        while let Ok(line) = self.lines.try_recv() {
            on_line(line);
        }
    }

    #[cfg(unix)]
    fn signal_group(&mut self, signal: Signal) {
        let Some(pid) = self.pid else { return };
        let signal = match signal {
            Signal::Interrupt => libc::SIGINT,
            Signal::Kill => libc::SIGKILL,
        };
        // SAFETY: kill only sends a signal; the negative pid targets the
        // group created by process_group(0).
        let result = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
        if result != 0 {
            debug!(pid, signal, "failed to signal process group");
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&mut self, _signal: Signal) {
        let _ = self.child.start_kill();
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Interrupt,
    Kill,
}
