//! Shared data types: raw command results and the typed views over gog's JSON output.
//!
//! Only the fields the integration acts on are typed (`id`, `threadId`,
//! `labelIds`, nested `messages`). Everything else is kept in a flattened
//! map and passed through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of a one-shot gog invocation.
///
/// A non-zero `exit_code` is data, not an error; callers decide what it means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Process exit code (`-1` when terminated by a signal).
    pub exit_code: i32,
    /// Everything the process wrote to stdout.
    pub stdout: Vec<u8>,
    /// Everything the process wrote to stderr.
    pub stderr: Vec<u8>,
    /// Wall-clock duration of the invocation.
    pub duration_ms: u64,
}

impl CommandResult {
    /// Returns `true` when the process exited with code zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout decoded lossily as UTF-8.
    #[must_use]
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr decoded lossily as UTF-8.
    #[must_use]
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// One message as returned by `gmail messages search --json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Gmail message id.
    pub id: String,
    /// Identifier of the owning thread.
    #[serde(rename = "threadId", default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Label ids (`INBOX`, `UNREAD`, `STARRED`, ...).
    #[serde(rename = "labelIds", default)]
    pub label_ids: Vec<String>,
    /// Remaining fields (`payload`, `snippet`, ...), untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Returns `true` if the message carries the given label.
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.label_ids.iter().any(|l| l == label)
    }
}

/// A thread as returned by `gmail thread get --json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// Thread id, when the binary reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Messages of the thread in chronological order.
    #[serde(default)]
    pub messages: Vec<ThreadMessage>,
    /// Remaining fields, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Thread {
    /// Returns `true` for the empty mapping substituted for unparseable output.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.messages.is_empty() && self.extra.is_empty()
    }
}

/// Entry of a thread's `messages` sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    /// Gmail message id.
    pub id: String,
    /// Label ids of this message.
    #[serde(rename = "labelIds", default)]
    pub label_ids: Vec<String>,
    /// Remaining fields, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Shapes accepted from `gmail messages search --json`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum MessageListing {
    Bare(Vec<Message>),
    Wrapped { messages: Vec<Message> },
}

impl MessageListing {
    pub(crate) fn into_messages(self) -> Vec<Message> {
        match self {
            Self::Bare(messages) | Self::Wrapped { messages } => messages,
        }
    }
}

/// Shapes accepted from `auth list --json`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum AccountListing {
    Wrapped { accounts: Vec<AccountEntry> },
    Bare(Vec<AccountEntry>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum AccountEntry {
    Detailed { email: String },
    Plain(String),
}

impl AccountListing {
    pub(crate) fn into_emails(self) -> Vec<String> {
        let entries = match self {
            Self::Wrapped { accounts } | Self::Bare(accounts) => accounts,
        };
        entries
            .into_iter()
            .map(|entry| match entry {
                AccountEntry::Detailed { email } | AccountEntry::Plain(email) => email,
            })
            .collect()
    }
}
