use crate::auth::AuthState;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GogError {
    #[error("gog executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("Failed to launch {}: {source}", path.display())]
    ProcessLaunch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` failed with exit code {exit_code}: {stderr}")]
    Command {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("No authorization URL received within {0:?}")]
    UrlTimeout(Duration),

    #[error("gog closed stdout without printing an authorization URL\nOUTPUT: {output}")]
    UrlNotFound { output: String },

    #[error("Authorization rejected (exit code {exit_code}): {detail}")]
    AuthFailed { exit_code: i32, detail: String },

    #[error("Cannot {operation} while the session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: AuthState,
    },

    #[error("Authorization session was cancelled")]
    Cancelled,

    #[error("Process timed out after {elapsed:?} (PID: {pid})")]
    Timeout {
        elapsed: Duration,
        pid: u32,
        partial_stdout: String,
        partial_stderr: String,
    },

    #[error("I/O failure at stage '{stage}': {source}")]
    Io {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to send signal {signal} to PID {pid}: {reason}")]
    SignalFailed {
        signal: String,
        pid: u32,
        reason: String,
    },

    #[error("Child process stdin was not captured")]
    NoStdin,

    #[error("Child process stdout was not captured")]
    NoStdout,

    #[error("Child process stderr was not captured")]
    NoStderr,

    #[error("Could not get PID from child process")]
    NoPid,

    #[error("Output truncated: captured {captured_bytes} bytes (limit: {limit_bytes} bytes)")]
    OutputTruncated {
        captured_bytes: usize,
        limit_bytes: usize,
    },
}

impl GogError {
    /// Whether the caller may recover by starting a fresh authorization attempt
    /// (a new `begin` followed by `submit_code`).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AuthFailed { .. } | Self::Timeout { .. } | Self::Cancelled
        )
    }

    pub(crate) fn io(stage: &str, source: std::io::Error) -> Self {
        Self::Io {
            stage: stage.to_string(),
            source,
        }
    }
}
