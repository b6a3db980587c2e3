#![deny(missing_docs)]
//! Gmail inbox sensors backed by the `gog` CLI.
//!
//! Sits on top of [`gogcli_adapter`] and supplies the integration glue:
//! setup validation (binary, credentials, authorization), a registry of
//! interactive authorization sessions keyed by account, a polling coordinator
//! that merges inbox messages with their threads, and the mapping of those
//! messages to sensor-style summaries.

/// Polling coordinator and refresh snapshots.
pub mod coordinator;
/// Integration settings.
pub mod config;
/// Error types for the integration.
pub mod errors;
/// Authorization sessions keyed by account.
pub mod sessions;
/// Binary provisioning and setup validation.
pub mod setup;
/// Sensor-style summaries of inbox messages.
pub mod summary;

pub use config::IntegrationConfig;
pub use coordinator::{InboxCoordinator, InboxMessage, Snapshot};
pub use errors::IntegrationError;
pub use sessions::AuthRegistry;
pub use setup::{ensure_binary, validate_setup, BinaryInstaller, SetupStatus};
pub use summary::EmailSummary;
