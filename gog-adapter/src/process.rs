//! Subprocess execution and lifecycle management for the gog binary.
//!
//! Two entry points:
//! - [`ProcessRunner::run`] for one-shot commands: waits for exit and captures
//!   all output, bounded by the runner's timeout.
//! - [`ProcessRunner::start`] for the interactive `auth add` flow: returns a
//!   [`ProcessHandle`] whose pipes the caller drives directly.
//!
//! Both inherit the host environment with `HOME` and `XDG_CONFIG_HOME`
//! redirected when the runner has a home directory, so gog keeps its
//! keyring and config under an integration-managed path.

use crate::error::GogError;
use crate::types::CommandResult;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024; // 10 MB
const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Default bound on a one-shot command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Output buffer shared between a drain task and the caller.
pub(crate) type Captured = Arc<Mutex<Vec<u8>>>;

/// Launches gog with a fixed executable path and environment overlay.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    path: PathBuf,
    home: Option<PathBuf>,
    timeout: Duration,
}

impl ProcessRunner {
    /// Creates a runner for the executable at `path`, inheriting the host environment.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            home: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Redirects gog's home and XDG config directory to `dir`.
    #[must_use]
    pub fn with_home(mut self, dir: impl Into<PathBuf>) -> Self {
        self.home = Some(dir.into());
        self
    }

    /// Sets the bound applied to [`ProcessRunner::run`].
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path of the gog executable.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Redirected home directory, if any.
    #[must_use]
    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    /// The variables overlaid on the inherited environment.
    #[must_use]
    pub fn env_overrides(&self) -> Vec<(&'static str, PathBuf)> {
        self.home.as_ref().map_or_else(Vec::new, |home| {
            vec![
                ("HOME", home.clone()),
                ("XDG_CONFIG_HOME", home.join(".config")),
            ]
        })
    }

    fn command(&self, args: &[OsString]) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.args(args).kill_on_drop(true);
        for (key, value) in self.env_overrides() {
            cmd.env(key, value);
        }
        cmd
    }

    fn spawn(&self, mut cmd: Command) -> Result<Child, GogError> {
        cmd.spawn().map_err(|source| GogError::ProcessLaunch {
            path: self.path.clone(),
            source,
        })
    }

    /// Runs gog to completion and captures stdout and stderr in full.
    ///
    /// A non-zero exit code is returned as data in the [`CommandResult`].
    ///
    /// # Errors
    /// Returns [`GogError::ProcessLaunch`] if the executable cannot be spawned,
    /// [`GogError::Timeout`] if it outlives the runner's timeout (the child is
    /// shut down first), and [`GogError::OutputTruncated`] if either stream
    /// exceeds the capture limit.
    pub async fn run(&self, args: &[OsString]) -> Result<CommandResult, GogError> {
        let start_time = Instant::now();
        let mut cmd = self.command(args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = self.spawn(cmd)?;
        let stdout = child.stdout.take().ok_or(GogError::NoStdout)?;
        let stderr = child.stderr.take().ok_or(GogError::NoStderr)?;
        let pid = child.id().ok_or(GogError::NoPid)?;
        tracing::debug!(pid, command = %crate::cmd::display(args), "spawned gog");

        let stdout_buf = Captured::default();
        let stderr_buf = Captured::default();
        let mut stdout_task = tokio::spawn(drain_into(stdout, Arc::clone(&stdout_buf)));
        let mut stderr_task = tokio::spawn(drain_into(stderr, Arc::clone(&stderr_buf)));

        let collected = timeout(self.timeout, async {
            let status = child
                .wait()
                .await
                .map_err(|e| GogError::io("wait for child", e))?;
            let stdout_truncated = join_drain(&mut stdout_task, "stdout").await;
            let stderr_truncated = join_drain(&mut stderr_task, "stderr").await;
            Ok::<_, GogError>((status, stdout_truncated || stderr_truncated))
        })
        .await;
        let elapsed = start_time.elapsed();

        match collected {
            Ok(Ok((status, truncated))) => {
                let stdout = std::mem::take(&mut *stdout_buf.lock().await);
                let stderr = std::mem::take(&mut *stderr_buf.lock().await);
                if truncated {
                    return Err(GogError::OutputTruncated {
                        captured_bytes: stdout.len().max(stderr.len()),
                        limit_bytes: MAX_OUTPUT_BYTES,
                    });
                }

                let exit_code = status.code().unwrap_or(-1);
                tracing::debug!(pid, exit_code, elapsed_ms = elapsed.as_millis(), "gog exited");
                Ok(CommandResult {
                    exit_code,
                    stdout,
                    stderr,
                    duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                })
            }
            Ok(Err(e)) => {
                stdout_task.abort();
                stderr_task.abort();
                Err(e)
            }
            Err(_) => {
                tracing::warn!(pid, ?elapsed, "gog timed out, shutting down");
                if let Err(e) = graceful_shutdown(&mut child, pid).await {
                    tracing::warn!(pid, error = %e, "shutdown after timeout failed");
                }
                // A grandchild may still hold the pipes open; stop reading rather than wait on it.
                stdout_task.abort();
                stderr_task.abort();

                let partial_stdout = String::from_utf8_lossy(&stdout_buf.lock().await).into_owned();
                let partial_stderr = String::from_utf8_lossy(&stderr_buf.lock().await).into_owned();
                Err(GogError::Timeout {
                    elapsed,
                    pid,
                    partial_stdout,
                    partial_stderr,
                })
            }
        }
    }

    /// Starts gog with all three standard streams piped and returns immediately.
    ///
    /// The caller owns the returned handle and decides when to write, close
    /// stdin, or kill. Dropping the handle kills the process.
    ///
    /// # Errors
    /// Returns [`GogError::ProcessLaunch`] if the executable cannot be spawned.
    pub fn start(&self, args: &[OsString]) -> Result<ProcessHandle, GogError> {
        let mut cmd = self.command(args);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = self.spawn(cmd)?;
        let pid = child.id();
        tracing::debug!(?pid, command = %crate::cmd::display(args), "started interactive gog");

        Ok(ProcessHandle {
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            pid,
            exit_code: None,
            child: Some(child),
        })
    }
}

/// Exclusive ownership of one live gog process started by [`ProcessRunner::start`].
///
/// The handle is released (its `Child` dropped) after [`ProcessHandle::wait`]
/// or [`ProcessHandle::kill`]; both are safe to call again afterwards.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Option<Child>,
    pid: Option<u32>,
    exit_code: Option<i32>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl ProcessHandle {
    /// OS process id, if the process was still running when started.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Takes the writable stdin pipe. Dropping it signals end of input.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Takes the readable stdout pipe.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Takes the readable stderr pipe.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Returns `true` once the process has been awaited or killed.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.child.is_none()
    }

    /// Exit code recorded by [`ProcessHandle::wait`], if any.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Waits for the process to exit and releases it.
    ///
    /// Stdin is closed first so a process blocked on input can finish. Returns
    /// `-1` for a signal-terminated or previously killed process.
    ///
    /// # Errors
    /// Returns [`GogError::Io`] if waiting on the child fails.
    pub async fn wait(&mut self) -> Result<i32, GogError> {
        self.stdin = None;
        let Some(child) = self.child.as_mut() else {
            return Ok(self.exit_code.unwrap_or(-1));
        };

        let status = child
            .wait()
            .await
            .map_err(|e| GogError::io("wait for child", e))?;
        let code = status.code().unwrap_or(-1);
        self.exit_code = Some(code);
        self.child = None;
        Ok(code)
    }

    /// Kills the process if it is still running and releases it.
    ///
    /// Idempotent: a handle that already exited or was already killed is left as is.
    ///
    /// # Errors
    /// Returns [`GogError::Io`] if the kill signal cannot be delivered.
    pub async fn kill(&mut self) -> Result<(), GogError> {
        self.stdin = None;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                self.exit_code = status.code();
                tracing::debug!(pid = ?self.pid, "gog already exited, nothing to kill");
                Ok(())
            }
            Ok(None) | Err(_) => {
                child
                    .kill()
                    .await
                    .map_err(|e| GogError::io("kill child", e))?;
                tracing::debug!(pid = ?self.pid, "killed gog");
                Ok(())
            }
        }
    }
}

/// Reads a stream to its end into `buf`, discarding bytes past the capture limit.
///
/// Read errors end the drain quietly: draining is best effort and must never
/// fail the surrounding operation. Returns whether output was truncated.
pub(crate) async fn drain_into(mut stream: impl AsyncRead + Unpin, buf: Captured) -> bool {
    let mut chunk = [0u8; 8192];
    let mut truncated = false;

    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let mut captured = buf.lock().await;
                if captured.len() + n <= MAX_OUTPUT_BYTES {
                    captured.extend_from_slice(&chunk[..n]);
                } else {
                    truncated = true;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "output drain stopped on read error");
                break;
            }
        }
    }

    truncated
}

async fn join_drain(task: &mut JoinHandle<bool>, stream: &str) -> bool {
    match task.await {
        Ok(truncated) => truncated,
        Err(e) => {
            tracing::warn!(stream, error = %e, "output drain task failed");
            false
        }
    }
}

/// Graceful shutdown: `SIGTERM`, wait grace period, then `SIGKILL`.
#[cfg(unix)]
async fn graceful_shutdown(child: &mut Child, pid: u32) -> Result<(), GogError> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let raw_pid = i32::try_from(pid).map_err(|_| GogError::SignalFailed {
        signal: "SIGTERM".to_string(),
        pid,
        reason: "PID value exceeds i32::MAX".to_string(),
    })?;

    signal::kill(Pid::from_raw(raw_pid), Signal::SIGTERM).map_err(|e| GogError::SignalFailed {
        signal: "SIGTERM".to_string(),
        pid,
        reason: e.to_string(),
    })?;

    match timeout(GRACE_PERIOD, child.wait()).await {
        Ok(Ok(_status)) => Ok(()),
        Ok(Err(e)) => Err(GogError::io("graceful_shutdown wait", e)),
        Err(_) => {
            child
                .kill()
                .await
                .map_err(|e| GogError::io("SIGKILL", e))
        }
    }
}

/// Windows: immediate termination, no graceful shutdown for console processes.
#[cfg(windows)]
async fn graceful_shutdown(child: &mut Child, _pid: u32) -> Result<(), GogError> {
    child
        .kill()
        .await
        .map_err(|e| GogError::io("TerminateProcess", e))
}
