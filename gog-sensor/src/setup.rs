//! Provisioning of the gog binary and validation of an account's setup.

use crate::config::IntegrationConfig;
use crate::errors::IntegrationError;
use async_trait::async_trait;
use gogcli_adapter::{discover_gog, GogCli};
use std::path::{Path, PathBuf};

/// Oldest gog release the integration is tested against.
pub const MIN_GOG_VERSION: semver::Version = semver::Version::new(0, 9, 0);

/// Capability that downloads and unpacks the gog binary.
#[async_trait]
pub trait BinaryInstaller: Send + Sync {
    /// Installs gog and returns the path of the executable.
    async fn install(&self) -> anyhow::Result<PathBuf>;
}

/// Outcome of [`validate_setup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupStatus {
    /// The binary works and the account is authorized.
    Ready {
        /// Output of `gog version`.
        version: String,
    },
    /// The binary works but gog holds no token for the account.
    NeedsAuthorization {
        /// Output of `gog version`.
        version: String,
        /// Command the user can run to authorize by hand.
        hint: String,
    },
}

/// Locates a working gog binary, installing it when none is usable.
///
/// # Errors
/// Returns [`IntegrationError::CannotConnect`] when no binary works and no
/// installer is available, or [`IntegrationError::Install`] when the installer fails.
pub async fn ensure_binary(
    explicit_path: Option<&Path>,
    installer: Option<&dyn BinaryInstaller>,
) -> Result<PathBuf, IntegrationError> {
    let problem = match discover_gog(explicit_path) {
        Ok(path) => match GogCli::new(&path).check_health().await {
            Ok(()) => return Ok(path),
            Err(e) => format!("{} is not usable: {e}", path.display()),
        },
        Err(e) => e.to_string(),
    };

    let Some(installer) = installer else {
        return Err(IntegrationError::CannotConnect(problem));
    };
    tracing::info!(reason = %problem, "installing gog");
    let path = installer
        .install()
        .await
        .map_err(|e| IntegrationError::Install(format!("{e:#}")))?;

    GogCli::new(&path)
        .check_health()
        .await
        .map_err(|e| IntegrationError::Install(format!("installed binary does not run: {e}")))?;
    tracing::info!(path = %path.display(), "gog installed");
    Ok(path)
}

/// Checks that gog runs, registers credentials, and looks the account up.
///
/// Never starts an authorization flow; an unauthorized account is reported
/// as [`SetupStatus::NeedsAuthorization`].
///
/// # Errors
/// Returns [`IntegrationError::CannotConnect`] if gog fails to run or list
/// accounts, and [`IntegrationError::CredentialsFileNotFound`] if the
/// configured credentials file is missing.
pub async fn validate_setup(
    config: &IntegrationConfig,
    gog_path: &Path,
) -> Result<SetupStatus, IntegrationError> {
    tokio::fs::create_dir_all(&config.config_dir).await?;
    let client = config.client(gog_path);

    let version = client
        .version()
        .await
        .map_err(|e| IntegrationError::CannotConnect(format!("gog version failed: {e}")))?;
    check_version(&version);

    if let Some(credentials) = config.credentials_path() {
        if !credentials.exists() {
            return Err(IntegrationError::CredentialsFileNotFound(credentials));
        }
        client
            .set_credentials(&credentials)
            .await
            .map_err(|e| IntegrationError::CannotConnect(format!("failed to set credentials: {e}")))?;
    }

    let authorized = client
        .is_authorized(&config.account)
        .await
        .map_err(|e| IntegrationError::CannotConnect(format!("gog auth list failed: {e}")))?;

    if authorized {
        tracing::info!(account = %config.account, %version, "account already authorized");
        Ok(SetupStatus::Ready { version })
    } else {
        tracing::info!(account = %config.account, "account needs authorization");
        Ok(SetupStatus::NeedsAuthorization {
            version,
            hint: config.manual_auth_hint(gog_path),
        })
    }
}

/// Parses gog's version output and warns when it predates [`MIN_GOG_VERSION`].
///
/// Version problems are warnings, never blockers.
pub fn check_version(raw: &str) -> Option<semver::Version> {
    let Some(version) = extract_version(raw) else {
        tracing::warn!(raw_version = %raw, "could not parse gog version");
        return None;
    };
    if version < MIN_GOG_VERSION {
        tracing::warn!(
            detected = %version,
            minimum = %MIN_GOG_VERSION,
            "gog {version} is older than the minimum tested version {MIN_GOG_VERSION}"
        );
    } else {
        tracing::debug!(%version, "gog version detected");
    }
    Some(version)
}

/// Finds the first whitespace-separated token that parses as a version.
///
/// - "0.9.1" -> 0.9.1
/// - "gog v0.9.1 (abc1234)" -> 0.9.1
fn extract_version(raw: &str) -> Option<semver::Version> {
    raw.split_whitespace().find_map(|token| {
        let token = token.strip_prefix('v').unwrap_or(token);
        semver::Version::parse(token).ok()
    })
}
