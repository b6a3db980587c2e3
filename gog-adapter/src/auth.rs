//! Interactive authorization through `gog auth add <account>`.
//!
//! gog prints a one-time authorization URL (possibly after banner output and
//! wrapped in ANSI colour codes), then blocks reading the code from stdin.
//! [`AuthSession`] drives that exchange as a state machine:
//!
//! ```text
//! Idle -> Starting -> AwaitingUrl -> AwaitingCode -> Submitting -> Succeeded
//!            |             |              |               |
//!            +-------------+--------------+---------------+--> Failed { reason, retryable }
//! ```
//!
//! A URL belongs to the process that printed it. Every [`AuthSession::begin`]
//! discards the previous process and starts a new one, so a rejected code is
//! retried with a fresh URL.
//!
//! An in-flight `begin` or `submit_code` is interrupted by cancelling the
//! session's [`CancellationToken`]; the process is killed and the call returns
//! [`GogError::Cancelled`].

use crate::cmd;
use crate::error::GogError;
use crate::process::{drain_into, Captured, ProcessHandle, ProcessRunner};
use regex::Regex;
use std::borrow::Cow;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at};
use tokio_util::sync::CancellationToken;

/// Default bound on waiting for each stdout line while looking for the URL.
pub const DEFAULT_URL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on gog finishing after the code was submitted.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(120);

/// How long output drains may keep reading once gog has exited.
const OUTPUT_SETTLE: Duration = Duration::from_secs(1);

/// CSI, OSC and single-character escape sequences.
#[allow(clippy::expect_used)]
static ANSI_ESCAPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \x1b\[[0-9;?]*[A-Za-z]               # CSI sequences
        | \x1b\][^\x07\x1b]*(?:\x07|\x1b\\)  # OSC sequences
        | \x1b[A-Za-z]                       # Simple escapes
        ",
    )
    .expect("ANSI regex pattern is valid")
});

#[allow(clippy::expect_used)]
static AUTH_URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https://\S+").expect("URL regex pattern is valid"));

/// Why a session ended in [`AuthState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The binary could not be spawned.
    LaunchFailed,
    /// No stdout line arrived within the URL timeout.
    UrlTimeout,
    /// Stdout ended without an authorization URL.
    UrlNotFound,
    /// gog exited non-zero after the code was submitted.
    Rejected,
    /// gog did not finish within the submit timeout.
    Timeout,
    /// A pipe or wait failed.
    Io,
    /// The caller abandoned the session.
    Cancelled,
}

/// Position of an [`AuthSession`] in the authorization protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Created, no process started yet.
    Idle,
    /// Spawning `gog auth add`.
    Starting,
    /// Reading stdout for the authorization URL.
    AwaitingUrl,
    /// URL surfaced; waiting for [`AuthSession::submit_code`].
    AwaitingCode,
    /// Code written; waiting for gog to exit.
    Submitting,
    /// gog accepted the code.
    Succeeded,
    /// The attempt ended. `retryable` attempts may be restarted with [`AuthSession::begin`].
    Failed {
        /// What ended the attempt.
        reason: FailureReason,
        /// Whether a fresh attempt can be expected to help.
        retryable: bool,
    },
}

impl AuthState {
    /// Returns `true` for `Succeeded` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }
}

/// Removes ANSI escape sequences from one line of output.
#[must_use]
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    ANSI_ESCAPE_PATTERN.replace_all(line, "")
}

/// Extracts the authorization URL from one line of gog output.
///
/// Escape sequences are removed first; the URL is the longest run of
/// non-whitespace characters starting at the first `https://`.
#[must_use]
pub fn extract_auth_url(line: &str) -> Option<String> {
    if !line.contains("https://") {
        return None;
    }
    let clean = strip_ansi(line);
    AUTH_URL_PATTERN
        .find(&clean)
        .map(|m| m.as_str().to_string())
}

/// Normalizes user input into the code gog expects on stdin.
///
/// A pasted redirect URL (anything containing `code=`) yields the value of
/// that parameter up to the next `&`; anything else is used trimmed.
#[must_use]
pub fn normalize_auth_code(input: &str) -> String {
    let input = input.trim();
    input.split_once("code=").map_or_else(
        || input.to_string(),
        |(_, rest)| rest.split('&').next().unwrap_or_default().to_string(),
    )
}

/// One account's interactive authorization attempt against gog.
///
/// Owns at most one live `gog auth add` process. Methods take `&mut self`, so
/// transitions of one session never run concurrently; sessions for different
/// accounts share nothing but must use different redirected homes.
///
/// Dropping the session kills any live process.
#[derive(Debug)]
pub struct AuthSession {
    runner: ProcessRunner,
    account: String,
    url_timeout: Duration,
    submit_timeout: Duration,
    state: AuthState,
    url: Option<String>,
    process: Option<ProcessHandle>,
    banner: Vec<String>,
    stdout_buf: Captured,
    stdout_task: Option<JoinHandle<bool>>,
    stderr_buf: Captured,
    stderr_task: Option<JoinHandle<bool>>,
    cancel: CancellationToken,
}

impl AuthSession {
    /// Creates an idle session for `account`. No process is started until [`AuthSession::begin`].
    #[must_use]
    pub fn new(runner: ProcessRunner, account: impl Into<String>) -> Self {
        Self {
            runner,
            account: account.into(),
            url_timeout: DEFAULT_URL_TIMEOUT,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            state: AuthState::Idle,
            url: None,
            process: None,
            banner: Vec::new(),
            stdout_buf: Captured::default(),
            stdout_task: None,
            stderr_buf: Captured::default(),
            stderr_task: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Installs the token that interrupts [`AuthSession::begin`] and
    /// [`AuthSession::submit_code`].
    ///
    /// A cancelled token stays cancelled: every later call fails with
    /// [`GogError::Cancelled`] until a fresh token is installed.
    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    /// The token currently observed by this session.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Sets the per-line bound used while waiting for the URL.
    #[must_use]
    pub const fn with_url_timeout(mut self, timeout: Duration) -> Self {
        self.url_timeout = timeout;
        self
    }

    /// Sets the bound on gog finishing after a code was submitted.
    #[must_use]
    pub const fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// The account being authorized.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// The URL of the current attempt, once surfaced.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Returns `true` while a gog process is owned by this session.
    #[must_use]
    pub fn has_live_process(&self) -> bool {
        self.process.as_ref().is_some_and(|p| !p.is_released())
    }

    /// PID of the owned process, if any.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(ProcessHandle::pid)
    }

    /// Starts `gog auth add <account>` and waits for it to print the authorization URL.
    ///
    /// Any process left from a previous attempt is killed first. Stdout is read
    /// line by line and decoded lossily; each read is bounded by the URL timeout.
    /// Once the URL is found, stdout keeps being drained in the background.
    ///
    /// # Errors
    /// - [`GogError::ProcessLaunch`] if gog cannot be spawned.
    /// - [`GogError::UrlTimeout`] if a line read exceeds the bound (process killed).
    /// - [`GogError::UrlNotFound`] if stdout ends without a URL.
    /// - [`GogError::Cancelled`] if the cancellation token fires. Retryable.
    ///
    /// The first three leave the session in a non-retryable `Failed` state;
    /// call `begin` again to start over.
    pub async fn begin(&mut self) -> Result<String, GogError> {
        self.reset().await;
        let cancel = self.cancel.clone();
        if cancel.is_cancelled() {
            self.transition(AuthState::Failed {
                reason: FailureReason::Cancelled,
                retryable: true,
            });
            return Err(GogError::Cancelled);
        }
        self.transition(AuthState::Starting);

        let mut handle = match self.runner.start(&cmd::auth_add(&self.account)) {
            Ok(handle) => handle,
            Err(e) => {
                self.transition(AuthState::Failed {
                    reason: FailureReason::LaunchFailed,
                    retryable: false,
                });
                return Err(e);
            }
        };

        if let Some(stderr) = handle.take_stderr() {
            self.stderr_task = Some(tokio::spawn(drain_into(
                stderr,
                Arc::clone(&self.stderr_buf),
            )));
        }
        let stdout = handle.take_stdout();
        self.process = Some(handle);
        let Some(stdout) = stdout else {
            self.abort(FailureReason::Io, false).await;
            return Err(GogError::NoStdout);
        };

        self.transition(AuthState::AwaitingUrl);
        let mut reader = BufReader::new(stdout);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            let read = tokio::select! {
                () = cancel.cancelled() => None,
                read = timeout(self.url_timeout, reader.read_until(b'\n', &mut raw)) => Some(read),
            };
            match read {
                None => {
                    tracing::info!(account = %self.account, "authorization cancelled while waiting for the URL");
                    self.abort(FailureReason::Cancelled, true).await;
                    return Err(GogError::Cancelled);
                }
                Some(Err(_)) => {
                    tracing::warn!(
                        account = %self.account,
                        timeout = ?self.url_timeout,
                        "no authorization URL from gog in time"
                    );
                    self.abort(FailureReason::UrlTimeout, false).await;
                    return Err(GogError::UrlTimeout(self.url_timeout));
                }
                Some(Ok(Err(e))) => {
                    self.abort(FailureReason::Io, false).await;
                    return Err(GogError::io("read authorization URL", e));
                }
                Some(Ok(Ok(0))) => {
                    // gog is exiting; give its last stderr lines a moment to land.
                    self.settle_output().await;
                    let output = self.captured_output(&self.banner.join("\n")).await;
                    self.abort(FailureReason::UrlNotFound, false).await;
                    return Err(GogError::UrlNotFound { output });
                }
                Some(Ok(Ok(_))) => {
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim_end_matches(['\r', '\n']);
                    if let Some(url) = extract_auth_url(line) {
                        tracing::info!(account = %self.account, pid = ?self.pid(), "authorization URL received");
                        self.stdout_task = Some(tokio::spawn(drain_into(
                            reader,
                            Arc::clone(&self.stdout_buf),
                        )));
                        self.url = Some(url.clone());
                        self.transition(AuthState::AwaitingCode);
                        return Ok(url);
                    }
                    self.banner.push(strip_ansi(line).into_owned());
                }
            }
        }
    }

    /// Submits the user's code (or pasted redirect URL) and waits for gog to finish.
    ///
    /// Writes the normalized code and a newline, closes stdin, then waits for
    /// exit while stdout and stderr keep draining. The exit code decides the
    /// outcome; output still arriving after exit (a helper process holding the
    /// pipes) is read for at most a moment and then abandoned.
    ///
    /// # Errors
    /// - [`GogError::InvalidState`] unless the session is `AwaitingCode`; the process is not touched.
    /// - [`GogError::AuthFailed`] if gog exits non-zero, carrying its output. Retryable.
    /// - [`GogError::Timeout`] if gog does not exit within the submit timeout. Retryable.
    /// - [`GogError::Cancelled`] if the cancellation token fires. Retryable.
    pub async fn submit_code(&mut self, input: &str) -> Result<(), GogError> {
        if self.state != AuthState::AwaitingCode {
            return Err(GogError::InvalidState {
                operation: "submit an authorization code",
                state: self.state,
            });
        }
        self.transition(AuthState::Submitting);

        let cancel = self.cancel.clone();
        let submit_timeout = self.submit_timeout;
        let Some(handle) = self.process.as_mut() else {
            self.abort(FailureReason::Io, false).await;
            return Err(GogError::NoStdin);
        };

        let code = normalize_auth_code(input);
        if let Some(mut stdin) = handle.take_stdin() {
            let payload = format!("{code}\n");
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                // gog may already have exited; its exit code decides the outcome.
                tracing::warn!(account = %self.account, error = %e, "could not write code to gog");
            } else if let Err(e) = stdin.flush().await {
                tracing::warn!(account = %self.account, error = %e, "could not flush code to gog");
            }
        }

        let pid = handle.pid().unwrap_or_default();
        let started = Instant::now();
        let waited = tokio::select! {
            () = cancel.cancelled() => None,
            exit = timeout(submit_timeout, handle.wait()) => Some(exit),
        };

        let exit_code = match waited {
            None => {
                tracing::info!(account = %self.account, "authorization cancelled during submission");
                self.abort(FailureReason::Cancelled, true).await;
                return Err(GogError::Cancelled);
            }
            Some(Err(_)) => {
                tracing::warn!(account = %self.account, pid, "gog did not finish after the code was submitted");
                self.abort(FailureReason::Timeout, true).await;
                let partial_stdout = String::from_utf8_lossy(&self.stdout_buf.lock().await).into_owned();
                let partial_stderr = String::from_utf8_lossy(&self.stderr_buf.lock().await).into_owned();
                return Err(GogError::Timeout {
                    elapsed: started.elapsed(),
                    pid,
                    partial_stdout,
                    partial_stderr,
                });
            }
            Some(Ok(Err(e))) => {
                self.abort(FailureReason::Io, true).await;
                return Err(e);
            }
            Some(Ok(Ok(exit_code))) => exit_code,
        };

        self.settle_output().await;
        self.release().await;

        if exit_code == 0 {
            tracing::info!(account = %self.account, "gog accepted the authorization code");
            self.transition(AuthState::Succeeded);
            return Ok(());
        }

        let stdout = String::from_utf8_lossy(&self.stdout_buf.lock().await).into_owned();
        let detail = self.captured_output(&strip_ansi(&stdout)).await;
        tracing::warn!(account = %self.account, exit_code, "gog rejected the authorization code");
        self.transition(AuthState::Failed {
            reason: FailureReason::Rejected,
            retryable: true,
        });
        Err(GogError::AuthFailed { exit_code, detail })
    }

    /// Abandons the session, killing any live process.
    ///
    /// Safe to call in any state and any number of times. Sessions that already
    /// finished keep their terminal state.
    pub async fn cancel(&mut self) {
        match self.state {
            AuthState::Idle | AuthState::Succeeded | AuthState::Failed { .. } => {
                self.release().await;
            }
            AuthState::Starting
            | AuthState::AwaitingUrl
            | AuthState::AwaitingCode
            | AuthState::Submitting => {
                tracing::info!(account = %self.account, state = ?self.state, "authorization cancelled");
                self.abort(FailureReason::Cancelled, true).await;
            }
        }
    }

    fn transition(&mut self, next: AuthState) {
        tracing::debug!(account = %self.account, from = ?self.state, to = ?next, "auth state");
        self.state = next;
    }

    /// Kills the owned process, stops reading its output, and enters `Failed`.
    async fn abort(&mut self, reason: FailureReason, retryable: bool) {
        self.release().await;
        self.transition(AuthState::Failed { reason, retryable });
    }

    /// Kills and forgets the owned process and its pipes. Idempotent.
    async fn release(&mut self) {
        if let Some(mut handle) = self.process.take() {
            if let Err(e) = handle.kill().await {
                tracing::warn!(account = %self.account, error = %e, "failed to kill gog");
            }
        }
        for task in [self.stdout_task.take(), self.stderr_task.take()].into_iter().flatten() {
            task.abort();
        }
    }

    /// Lets the output drains reach end of stream, stopping any still running after [`OUTPUT_SETTLE`].
    async fn settle_output(&mut self) {
        let deadline = tokio::time::Instant::now() + OUTPUT_SETTLE;
        for task in [self.stdout_task.take(), self.stderr_task.take()].into_iter().flatten() {
            let abort = task.abort_handle();
            match timeout_at(deadline, task).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "output drain task ended abnormally"),
                Err(_) => {
                    tracing::debug!(account = %self.account, "output pipe still open after gog exited");
                    abort.abort();
                }
            }
        }
    }

    /// Discards everything from a previous attempt before starting a new one.
    async fn reset(&mut self) {
        self.release().await;
        self.url = None;
        self.banner.clear();
        self.stdout_buf = Captured::default();
        self.stderr_buf = Captured::default();
    }

    /// Combines captured stdout text with everything gog wrote to stderr.
    async fn captured_output(&self, stdout: &str) -> String {
        let stderr = self.stderr_buf.lock().await;
        let stderr = String::from_utf8_lossy(&stderr);
        [stdout.trim(), stderr.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        // The child itself is killed on drop by its handle.
        for task in [self.stdout_task.take(), self.stderr_task.take()].into_iter().flatten() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn strips_colour_codes_before_extracting() {
        let line = "\x1b[32mGo to: https://x.co/a?b=1\x1b[0m";
        assert_eq!(extract_auth_url(line).as_deref(), Some("https://x.co/a?b=1"));
    }

    #[test]
    fn url_is_longest_non_whitespace_token() {
        let line = "Open https://accounts.google.com/o/oauth2/auth?client_id=1&redirect_uri=http%3A%2F%2Flocalhost&state=xyz in a browser";
        assert_eq!(
            extract_auth_url(line).as_deref(),
            Some("https://accounts.google.com/o/oauth2/auth?client_id=1&redirect_uri=http%3A%2F%2Flocalhost&state=xyz")
        );
    }

    #[test]
    fn first_url_on_a_line_wins() {
        let line = "https://first.example/a https://second.example/b";
        assert_eq!(extract_auth_url(line).as_deref(), Some("https://first.example/a"));
    }

    #[test]
    fn lines_without_https_yield_nothing() {
        assert_eq!(extract_auth_url("Opening browser..."), None);
        assert_eq!(extract_auth_url("http://localhost:8080/callback"), None);
    }

    #[test]
    fn strip_ansi_handles_osc_hyperlinks() {
        let line = "\x1b]8;;https://x.co\x07link\x1b]8;;\x07 done";
        assert_eq!(strip_ansi(line), "link done");
    }

    #[test]
    fn code_is_extracted_from_callback_url() {
        assert_eq!(
            normalize_auth_code("http://localhost/cb?code=ABC123&scope=email"),
            "ABC123"
        );
        assert_eq!(normalize_auth_code("http://localhost/cb?state=s&code=XYZ"), "XYZ");
        assert_eq!(normalize_auth_code("  http://localhost/cb?code=4/0Ab-c\n"), "4/0Ab-c");
    }

    #[test]
    fn bare_code_is_trimmed() {
        assert_eq!(normalize_auth_code("  4/0AbCdEf \n"), "4/0AbCdEf");
        assert_eq!(normalize_auth_code("plain"), "plain");
    }

    #[tokio::test]
    async fn submit_before_begin_is_invalid_state() {
        let mut session = AuthSession::new(ProcessRunner::new("/nonexistent/gog"), "me@gmail.com");

        let err = session.submit_code("abc").await.unwrap_err();
        assert!(matches!(
            err,
            GogError::InvalidState { state: AuthState::Idle, .. }
        ));
        assert_eq!(session.state(), AuthState::Idle);
    }

    #[tokio::test]
    async fn launch_failure_is_terminal() {
        let mut session = AuthSession::new(ProcessRunner::new("/nonexistent/gog"), "me@gmail.com");

        let err = session.begin().await.unwrap_err();
        assert!(matches!(err, GogError::ProcessLaunch { .. }));
        assert_eq!(
            session.state(),
            AuthState::Failed {
                reason: FailureReason::LaunchFailed,
                retryable: false
            }
        );
        assert!(!session.has_live_process());
    }

    #[tokio::test]
    async fn cancel_on_idle_session_is_noop() {
        let mut session = AuthSession::new(ProcessRunner::new("/nonexistent/gog"), "me@gmail.com");
        session.cancel().await;
        session.cancel().await;
        assert_eq!(session.state(), AuthState::Idle);
    }
}
