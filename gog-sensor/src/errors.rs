use gogcli_adapter::GogError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors relating to the gog integration.
#[derive(Debug, Error)]
pub enum IntegrationError {
    /// Error from the gog adapter.
    #[error("gog adapter error: {0}")]
    Adapter(#[from] GogError),

    /// The binary could not be found, installed, or run.
    #[error("Cannot connect to gog: {0}")]
    CannotConnect(String),

    /// gog holds no token for the account.
    #[error("Account {account} is not authorized. {hint}")]
    AccountNotAuthorized {
        /// The account that is missing from `auth list`.
        account: String,
        /// Command the user can run to authorize it by hand.
        hint: String,
    },

    /// The OAuth client credentials file does not exist.
    #[error("Credentials file not found: {}", .0.display())]
    CredentialsFileNotFound(PathBuf),

    /// The installer capability failed.
    #[error("Failed to install gog: {0}")]
    Install(String),

    /// No session or coordinator exists for the account.
    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    /// Another account's live authorization is using the redirected directory.
    #[error("Config directory {} is in use by the authorization of {holder}", dir.display())]
    ConfigDirBusy {
        /// The shared redirected directory.
        dir: PathBuf,
        /// Account whose session currently holds it.
        holder: String,
    },

    /// A refresh cycle failed because the inbox search failed.
    #[error("Error communicating with gog: {0}")]
    UpdateFailed(#[source] GogError),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
