//! Rust adapter for driving the `gog` Gmail CLI (gogcli) as a subprocess.
//!
//! This crate provides discovery of the binary, one-shot command execution
//! with typed JSON results, and the interactive `auth add` authorization
//! protocol, all with isolated `HOME`/`XDG_CONFIG_HOME` redirection.

/// Interactive authorization state machine.
pub mod auth;
/// Command-line argument construction for gog invocations.
pub mod cmd;
/// Discovery and resolution of the gog executable path.
pub mod discovery;
/// Error types returned by adapter operations.
pub mod error;
/// Subprocess execution, handles, and signal handling.
pub mod process;
/// Command results and typed views over gog's JSON output.
pub mod types;

pub use auth::{AuthSession, AuthState, FailureReason};
pub use discovery::{discover_gog, GOG_BIN_ENV_VAR};
pub use error::GogError;
pub use process::{ProcessHandle, ProcessRunner};
pub use types::*;

use serde::de::DeserializeOwned;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// High-level client for the gog CLI.
///
/// Every method issues one command through the shared [`ProcessRunner`]. A
/// non-zero exit becomes [`GogError::Command`] with gog's stderr; stdout that
/// is not the expected JSON degrades to an empty result instead of failing.
#[derive(Debug, Clone)]
pub struct GogCli {
    runner: ProcessRunner,
}

impl GogCli {
    /// Creates a client for the binary at `path` using the host's home directory.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            runner: ProcessRunner::new(path),
        }
    }

    /// Creates a client from a configured runner.
    #[must_use]
    pub const fn from_runner(runner: ProcessRunner) -> Self {
        Self { runner }
    }

    /// Redirects gog's home and config directory to `dir`.
    #[must_use]
    pub fn with_home(self, dir: impl Into<PathBuf>) -> Self {
        Self {
            runner: self.runner.with_home(dir),
        }
    }

    /// Sets the bound applied to each one-shot command.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            runner: self.runner.with_timeout(timeout),
        }
    }

    /// Filesystem path to the gog executable.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.runner.path()
    }

    /// The runner used for every command.
    #[must_use]
    pub const fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// Runs gog and turns a non-zero exit into [`GogError::Command`].
    async fn run_checked(&self, args: &[OsString]) -> Result<CommandResult, GogError> {
        let result = self.runner.run(args).await?;
        if result.success() {
            Ok(result)
        } else {
            Err(GogError::Command {
                command: cmd::display(args),
                exit_code: result.exit_code,
                stderr: result.stderr_text().trim().to_string(),
            })
        }
    }

    /// Runs gog and parses stdout as `T`, falling back to `T::default()` on unparseable output.
    async fn run_json<T: DeserializeOwned + Default>(&self, args: &[OsString]) -> Result<T, GogError> {
        let result = self.run_checked(args).await?;
        Ok(serde_json::from_slice(&result.stdout).unwrap_or_else(|e| {
            tracing::warn!(
                command = %cmd::display(args),
                error = %e,
                "gog output was not the expected JSON, treating it as empty"
            );
            T::default()
        }))
    }

    /// Returns the version string printed by `gog version`.
    ///
    /// # Errors
    /// Returns an error if gog cannot be launched or exits non-zero.
    pub async fn version(&self) -> Result<String, GogError> {
        let result = self.run_checked(&cmd::version()).await?;
        Ok(result.stdout_text().trim().to_string())
    }

    /// Checks if the gog binary runs at all.
    ///
    /// # Errors
    /// Returns an error if the binary cannot be executed or fails its version command.
    pub async fn check_health(&self) -> Result<(), GogError> {
        self.version().await.map(|_| ())
    }

    /// Lists the accounts gog holds tokens for.
    ///
    /// # Errors
    /// Returns an error if gog cannot be launched or exits non-zero.
    pub async fn list_authorized_accounts(&self) -> Result<Vec<String>, GogError> {
        let args = cmd::list_auth();
        let result = self.run_checked(&args).await?;
        match serde_json::from_slice::<AccountListing>(&result.stdout) {
            Ok(listing) => Ok(listing.into_emails()),
            Err(e) => {
                tracing::warn!(error = %e, "unrecognised `auth list` output, treating it as empty");
                Ok(Vec::new())
            }
        }
    }

    /// Returns `true` if `account` appears in gog's authorized accounts.
    ///
    /// # Errors
    /// Returns an error if the account listing fails.
    pub async fn is_authorized(&self, account: &str) -> Result<bool, GogError> {
        let accounts = self.list_authorized_accounts().await?;
        Ok(accounts.iter().any(|a| a.eq_ignore_ascii_case(account)))
    }

    /// Registers an OAuth client credentials file with gog.
    ///
    /// # Errors
    /// Returns an error if gog cannot be launched or exits non-zero.
    pub async fn set_credentials(&self, path: &Path) -> Result<(), GogError> {
        self.run_checked(&cmd::set_credentials(path)).await?;
        tracing::info!(path = %path.display(), "gog credentials set");
        Ok(())
    }

    /// Searches messages, newest first.
    ///
    /// # Errors
    /// Returns an error if gog cannot be launched or exits non-zero.
    pub async fn search_messages(
        &self,
        query: &str,
        limit: u32,
        include_body: bool,
    ) -> Result<Vec<Message>, GogError> {
        let args = cmd::search_messages(query, limit, include_body);
        let listing: Option<MessageListing> = self.run_json(&args).await?;
        Ok(listing.map(MessageListing::into_messages).unwrap_or_default())
    }

    /// Fetches one thread with all its messages.
    ///
    /// # Errors
    /// Returns an error if gog cannot be launched or exits non-zero.
    pub async fn get_thread(&self, thread_id: &str) -> Result<Thread, GogError> {
        self.run_json(&cmd::get_thread(thread_id)).await
    }

    /// Creates an idle authorization session for `account` that uses the
    /// same binary and redirected home as this client.
    #[must_use]
    pub fn auth_session(&self, account: &str) -> AuthSession {
        AuthSession::new(self.runner.clone(), account)
    }
}
