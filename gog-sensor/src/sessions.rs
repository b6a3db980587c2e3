use crate::config::IntegrationConfig;
use crate::errors::IntegrationError;
use gogcli_adapter::{AuthSession, AuthState};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

struct Entry {
    config_dir: PathBuf,
    session: Arc<Mutex<AuthSession>>,
    /// Interrupts the attempt in flight; replaced by every `begin_auth`.
    cancel: CancellationToken,
    /// Set while an attempt is starting or owns a live gog process.
    active: Arc<AtomicBool>,
}

impl Entry {
    fn new(config: &IntegrationConfig, gog_path: &Path) -> Self {
        Self {
            config_dir: config.config_dir.clone(),
            session: Arc::new(Mutex::new(config.auth_session(gog_path))),
            cancel: CancellationToken::new(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    fn handles(&self) -> (Arc<Mutex<AuthSession>>, CancellationToken, Arc<AtomicBool>) {
        (
            Arc::clone(&self.session),
            self.cancel.clone(),
            Arc::clone(&self.active),
        )
    }
}

/// Authorization sessions of the configured accounts, keyed by account.
///
/// Each account owns one [`AuthSession`]. Two accounts may not authorize
/// through the same redirected directory at the same time, since gog keeps
/// one pending flow per home; such a request fails with
/// [`IntegrationError::ConfigDirBusy`].
///
/// The registry lock is never held across a gog operation, and
/// [`AuthRegistry::cancel`] interrupts an attempt that is still waiting for
/// its URL or for gog to accept a code.
#[derive(Clone, Default)]
pub struct AuthRegistry {
    sessions: Arc<Mutex<HashMap<String, Entry>>>,
}

impl AuthRegistry {
    /// Returns a new, empty `AuthRegistry`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) authorization for the configured account and returns the URL.
    ///
    /// An attempt of the same account still in flight is cancelled.
    ///
    /// # Errors
    /// Returns [`IntegrationError::ConfigDirBusy`] if another account is
    /// authorizing through the same directory, or the adapter error from
    /// [`AuthSession::begin`].
    pub async fn begin_auth(
        &self,
        config: &IntegrationConfig,
        gog_path: &Path,
    ) -> Result<String, IntegrationError> {
        let (session, cancel, active) = {
            let mut sessions = self.sessions.lock().await;

            if let Some(holder) = busy_holder(&sessions, &config.account, &config.config_dir) {
                return Err(IntegrationError::ConfigDirBusy {
                    dir: config.config_dir.clone(),
                    holder,
                });
            }

            let replace = sessions
                .get(&config.account)
                .map_or(true, |entry| entry.config_dir != config.config_dir);
            if replace {
                if let Some(old) = sessions.insert(config.account.clone(), Entry::new(config, gog_path)) {
                    old.cancel.cancel();
                }
            }
            let Some(entry) = sessions.get_mut(&config.account) else {
                return Err(IntegrationError::UnknownAccount(config.account.clone()));
            };

            std::mem::replace(&mut entry.cancel, CancellationToken::new()).cancel();
            // Marked before the registry lock is released so the busy check of
            // another account sees this directory as in use.
            entry.active.store(true, Ordering::SeqCst);
            entry.handles()
        };

        let mut session = session.lock().await;
        session.set_cancellation(cancel.clone());
        tracing::info!(account = %config.account, "starting authorization");
        let result = session.begin().await;
        // A cancelled attempt leaves the flag to whoever cancelled it.
        if !cancel.is_cancelled() {
            active.store(session.has_live_process(), Ordering::SeqCst);
        }
        Ok(result?)
    }

    /// Submits the user's code for a pending authorization.
    ///
    /// # Errors
    /// Returns [`IntegrationError::UnknownAccount`] if no session exists,
    /// or the adapter error from [`AuthSession::submit_code`].
    pub async fn submit_code(&self, account: &str, input: &str) -> Result<(), IntegrationError> {
        let (session, cancel, active) = self.handles(account).await?;
        let mut session = session.lock().await;
        let result = session.submit_code(input).await;
        if !cancel.is_cancelled() {
            active.store(session.has_live_process(), Ordering::SeqCst);
        }
        Ok(result?)
    }

    /// Cancels the account's authorization, if any. Idempotent.
    ///
    /// An attempt in flight is interrupted rather than waited for.
    pub async fn cancel(&self, account: &str) {
        if let Ok((session, cancel, active)) = self.handles(account).await {
            cancel.cancel();
            session.lock().await.cancel().await;
            active.store(false, Ordering::SeqCst);
        }
    }

    /// Cancels and forgets the account's session.
    pub async fn remove(&self, account: &str) {
        let entry = self.sessions.lock().await.remove(account);
        if let Some(entry) = entry {
            entry.cancel.cancel();
            entry.session.lock().await.cancel().await;
        }
    }

    /// Current state of the account's session.
    ///
    /// Waits for an operation in flight on that account to finish.
    pub async fn state(&self, account: &str) -> Option<AuthState> {
        let (session, _, _) = self.handles(account).await.ok()?;
        let state = session.lock().await.state();
        Some(state)
    }

    /// Accounts with a registered session.
    pub async fn accounts(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    async fn handles(
        &self,
        account: &str,
    ) -> Result<(Arc<Mutex<AuthSession>>, CancellationToken, Arc<AtomicBool>), IntegrationError> {
        self.sessions
            .lock()
            .await
            .get(account)
            .map(Entry::handles)
            .ok_or_else(|| IntegrationError::UnknownAccount(account.to_string()))
    }
}

/// Finds another account whose session is using `dir`.
fn busy_holder(sessions: &HashMap<String, Entry>, account: &str, dir: &Path) -> Option<String> {
    sessions
        .iter()
        .find(|(other, entry)| {
            other.as_str() != account
                && entry.config_dir == dir
                && entry.active.load(Ordering::SeqCst)
        })
        .map(|(other, _)| other.clone())
}
