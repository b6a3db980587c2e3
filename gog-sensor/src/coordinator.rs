//! Scheduled inbox refreshes for one account.
//!
//! Each refresh runs one inbox search and then fetches the thread of every
//! returned message concurrently. A failed thread fetch is logged and leaves
//! that message without a thread; only a failed search fails the refresh.

use crate::config::IntegrationConfig;
use crate::errors::IntegrationError;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use gogcli_adapter::{GogCli, Message, Thread};
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;

/// One inbox message merged with its thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboxMessage {
    /// The message as returned by the search.
    #[serde(flatten)]
    pub message: Message,
    /// The owning thread; `None` if it could not be fetched.
    #[serde(rename = "_thread", skip_serializing_if = "Option::is_none")]
    pub thread: Option<Thread>,
}

/// State published after every refresh attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Messages of the last successful refresh, newest first.
    pub messages: Vec<InboxMessage>,
    /// When the last successful refresh completed.
    pub last_success: Option<DateTime<Utc>>,
    /// Error of the most recent refresh, cleared by the next success.
    pub last_error: Option<String>,
}

/// Polls one account's inbox and publishes [`Snapshot`]s.
#[derive(Debug)]
pub struct InboxCoordinator {
    account: String,
    client: GogCli,
    query: String,
    limit: u32,
    interval: Duration,
    snapshot: watch::Sender<Snapshot>,
    refresh_requested: Notify,
}

impl InboxCoordinator {
    /// Creates a coordinator for the configured account using `client`.
    #[must_use]
    pub fn new(config: &IntegrationConfig, client: GogCli) -> Self {
        let (snapshot, _) = watch::channel(Snapshot::default());
        Self {
            account: config.account.clone(),
            client,
            query: config.query.clone(),
            limit: config.message_limit,
            interval: config.polling_interval(),
            snapshot,
            refresh_requested: Notify::new(),
        }
    }

    /// Creates a coordinator that runs the binary at `gog_path`.
    #[must_use]
    pub fn from_config(config: &IntegrationConfig, gog_path: &Path) -> Self {
        Self::new(config, config.client(gog_path))
    }

    /// The polled account.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Time between scheduled refreshes.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Receiver that observes every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    /// Copy of the latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Runs one refresh cycle and publishes its outcome.
    ///
    /// On failure the previous messages are kept and only `last_error` changes.
    ///
    /// # Errors
    /// Returns [`IntegrationError::UpdateFailed`] if the inbox search fails.
    pub async fn refresh(&self) -> Result<Vec<InboxMessage>, IntegrationError> {
        match self.fetch_inbox().await {
            Ok(messages) => {
                let now = Utc::now();
                tracing::info!(account = %self.account, count = messages.len(), "inbox refreshed");
                let published = messages.clone();
                self.snapshot.send_modify(|snapshot| {
                    snapshot.messages = published;
                    snapshot.last_success = Some(now);
                    snapshot.last_error = None;
                });
                Ok(messages)
            }
            Err(e) => {
                tracing::warn!(account = %self.account, error = %e, "inbox refresh failed");
                let message = e.to_string();
                self.snapshot
                    .send_modify(|snapshot| snapshot.last_error = Some(message));
                Err(e)
            }
        }
    }

    /// Searches the inbox and merges every message with its thread.
    ///
    /// # Errors
    /// Returns [`IntegrationError::UpdateFailed`] if the search fails.
    pub async fn fetch_inbox(&self) -> Result<Vec<InboxMessage>, IntegrationError> {
        let messages = self
            .client
            .search_messages(&self.query, self.limit, true)
            .await
            .map_err(IntegrationError::UpdateFailed)?;

        let fetches = messages.into_iter().map(|message| async move {
            let thread = self.fetch_thread_for(&message).await;
            InboxMessage { message, thread }
        });
        Ok(join_all(fetches).await)
    }

    /// Fetches one thread on demand.
    ///
    /// # Errors
    /// Returns the adapter error if gog fails.
    pub async fn get_thread(&self, thread_id: &str) -> Result<Thread, IntegrationError> {
        Ok(self.client.get_thread(thread_id).await?)
    }

    /// Asks a running [`InboxCoordinator::run`] loop to refresh now.
    pub fn request_refresh(&self) {
        self.refresh_requested.notify_one();
    }

    /// Refreshes immediately and then every interval until `shutdown` resolves.
    ///
    /// Failed refreshes are published in the snapshot and do not stop the loop.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(account = %self.account, interval = ?self.interval, "polling started");
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {}
                () = self.refresh_requested.notified() => {
                    tracing::debug!(account = %self.account, "manual refresh requested");
                    ticker.reset();
                }
            }
            // Errors are already recorded in the snapshot.
            let _ = self.refresh().await;
        }
        tracing::info!(account = %self.account, "polling stopped");
    }

    async fn fetch_thread_for(&self, message: &Message) -> Option<Thread> {
        let Some(thread_id) = message.thread_id.as_deref() else {
            tracing::warn!(message_id = %message.id, "message has no thread id, skipping thread fetch");
            return None;
        };
        match self.client.get_thread(thread_id).await {
            Ok(thread) => Some(thread),
            Err(e) => {
                tracing::warn!(thread_id, error = %e, "failed to fetch thread");
                None
            }
        }
    }
}

/// Requests a refresh from the coordinators of `accounts`, or from all when empty.
///
/// Unknown accounts are logged and skipped.
pub fn request_refresh(coordinators: &[Arc<InboxCoordinator>], accounts: &[String]) {
    if accounts.is_empty() {
        coordinators.iter().for_each(|c| c.request_refresh());
        return;
    }
    for account in accounts {
        match coordinators
            .iter()
            .find(|c| c.account().eq_ignore_ascii_case(account))
        {
            Some(coordinator) => coordinator.request_refresh(),
            None => tracing::warn!(%account, "no coordinator for account, refresh skipped"),
        }
    }
}
