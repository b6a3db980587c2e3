//! Settings for one configured Gmail account.

use gogcli_adapter::process::DEFAULT_COMMAND_TIMEOUT;
use gogcli_adapter::{auth, AuthSession, GogCli, ProcessRunner};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Minimum and default polling interval, in minutes.
pub const MIN_POLLING_INTERVAL_MINUTES: u64 = 5;

/// Number of newest inbox messages fetched per refresh.
pub const DEFAULT_MESSAGE_LIMIT: u32 = 5;

/// Search query used by every refresh.
pub const INBOX_QUERY: &str = "label:INBOX";

/// Configuration for one account's integration.
///
/// Holds everything needed to build the gog client, authorization sessions
/// and the polling coordinator for that account.
#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    /// The Gmail account (email address).
    pub account: String,

    /// Override gog binary location (None = auto-discover).
    pub binary_path: Option<PathBuf>,

    /// Directory gog sees as `HOME`; its tokens and settings live below it.
    ///
    /// Default: `<data_local_dir>/gogcli`
    pub config_dir: PathBuf,

    /// OAuth client credentials file to register with gog.
    ///
    /// Relative paths are resolved against `config_dir`.
    pub credentials_file: Option<PathBuf>,

    /// Minutes between refreshes. Values below 5 are raised to 5.
    pub polling_interval_minutes: u64,

    /// Newest messages fetched per refresh. Default: 5
    pub message_limit: u32,

    /// Search query for refreshes. Default: `label:INBOX`
    pub query: String,

    /// Per-line bound while waiting for the authorization URL. Default: 30 seconds
    pub url_timeout: Duration,

    /// Bound on each one-shot command. Default: 60 seconds
    pub command_timeout: Duration,

    /// Bound on gog finishing after a code was submitted. Default: 120 seconds
    pub submit_timeout: Duration,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            binary_path: None,
            config_dir: default_config_dir(),
            credentials_file: None,
            polling_interval_minutes: MIN_POLLING_INTERVAL_MINUTES,
            message_limit: DEFAULT_MESSAGE_LIMIT,
            query: INBOX_QUERY.to_string(),
            url_timeout: auth::DEFAULT_URL_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            submit_timeout: auth::DEFAULT_SUBMIT_TIMEOUT,
        }
    }
}

impl IntegrationConfig {
    /// Creates a configuration for `account` with default settings.
    #[must_use]
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            ..Self::default()
        }
    }

    /// Uses the gog binary at `path` instead of discovering it.
    #[must_use]
    pub fn with_binary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary_path = Some(path.into());
        self
    }

    /// Redirects gog's home and config directory.
    #[must_use]
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    /// Registers this OAuth client credentials file during setup.
    #[must_use]
    pub fn with_credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    /// Sets the polling interval, raising it to the minimum if needed.
    #[must_use]
    pub fn with_polling_interval(mut self, minutes: u64) -> Self {
        if minutes < MIN_POLLING_INTERVAL_MINUTES {
            tracing::warn!(
                requested = minutes,
                minimum = MIN_POLLING_INTERVAL_MINUTES,
                "polling interval below minimum, clamping"
            );
        }
        self.polling_interval_minutes = minutes.max(MIN_POLLING_INTERVAL_MINUTES);
        self
    }

    /// Sets how many messages each refresh fetches.
    #[must_use]
    pub const fn with_message_limit(mut self, limit: u32) -> Self {
        self.message_limit = limit;
        self
    }

    /// Sets the per-line URL wait bound.
    #[must_use]
    pub const fn with_url_timeout(mut self, timeout: Duration) -> Self {
        self.url_timeout = timeout;
        self
    }

    /// Sets the bound on one-shot commands.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the bound on the code submission phase.
    #[must_use]
    pub const fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// Interval between refreshes, never shorter than five minutes.
    #[must_use]
    pub const fn polling_interval(&self) -> Duration {
        let minutes = if self.polling_interval_minutes < MIN_POLLING_INTERVAL_MINUTES {
            MIN_POLLING_INTERVAL_MINUTES
        } else {
            self.polling_interval_minutes
        };
        Duration::from_secs(minutes.saturating_mul(60))
    }

    /// Credentials file with relative paths resolved against the config directory.
    #[must_use]
    pub fn credentials_path(&self) -> Option<PathBuf> {
        self.credentials_file.as_deref().map(|path| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.config_dir.join(path)
            }
        })
    }

    /// Runner for the binary at `gog_path` with this account's directory and command bound.
    #[must_use]
    pub fn runner(&self, gog_path: &Path) -> ProcessRunner {
        ProcessRunner::new(gog_path)
            .with_home(&self.config_dir)
            .with_timeout(self.command_timeout)
    }

    /// Command client for the binary at `gog_path`.
    #[must_use]
    pub fn client(&self, gog_path: &Path) -> GogCli {
        GogCli::from_runner(self.runner(gog_path))
    }

    /// Idle authorization session for this account with the configured bounds.
    #[must_use]
    pub fn auth_session(&self, gog_path: &Path) -> AuthSession {
        AuthSession::new(self.runner(gog_path), self.account.clone())
            .with_url_timeout(self.url_timeout)
            .with_submit_timeout(self.submit_timeout)
    }

    /// Shell command a user can run to authorize the account by hand.
    #[must_use]
    pub fn manual_auth_hint(&self, gog_path: &Path) -> String {
        format!(
            "Run `HOME={} {} auth add {}` in a terminal",
            self.config_dir.display(),
            gog_path.display(),
            self.account
        )
    }
}

fn default_config_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("gogcli")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = IntegrationConfig::new("me@gmail.com");
        assert_eq!(config.account, "me@gmail.com");
        assert_eq!(config.message_limit, 5);
        assert_eq!(config.query, "label:INBOX");
        assert_eq!(config.polling_interval(), Duration::from_secs(300));
        assert_eq!(config.url_timeout, Duration::from_secs(30));
        assert_eq!(config.submit_timeout, Duration::from_secs(120));
        assert!(config.config_dir.ends_with("gogcli"));
    }

    #[test]
    fn polling_interval_is_clamped() {
        let config = IntegrationConfig::new("a").with_polling_interval(1);
        assert_eq!(config.polling_interval_minutes, 5);

        let config = IntegrationConfig::new("a").with_polling_interval(15);
        assert_eq!(config.polling_interval(), Duration::from_secs(900));

        let mut config = IntegrationConfig::new("a");
        config.polling_interval_minutes = 0;
        assert_eq!(config.polling_interval(), Duration::from_secs(300));
    }

    #[test]
    fn relative_credentials_resolve_against_config_dir() {
        let config = IntegrationConfig::new("a")
            .with_config_dir("/srv/gog")
            .with_credentials_file("client.json");
        assert_eq!(config.credentials_path(), Some(PathBuf::from("/srv/gog/client.json")));

        let config = config.with_credentials_file("/etc/client.json");
        assert_eq!(config.credentials_path(), Some(PathBuf::from("/etc/client.json")));
    }

    #[test]
    fn runner_redirects_home() {
        let config = IntegrationConfig::new("a").with_config_dir("/srv/gog");
        let runner = config.runner(Path::new("/usr/bin/gog"));
        assert_eq!(runner.home(), Some(Path::new("/srv/gog")));
        assert_eq!(runner.path(), Path::new("/usr/bin/gog"));
    }
}
