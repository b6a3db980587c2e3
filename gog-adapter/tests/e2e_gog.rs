//! End-to-end tests against a real gog installation.
//!
//! These tests require the gog CLI to be installed locally. They are marked
//! `#[ignore]` to prevent CI failures in environments without the CLI.
//!
//! ## Running E2E Tests
//!
//! ```bash
//! cargo test -p gogcli-adapter -- --ignored
//! ```
//!
//! Only commands that need no Google account are exercised; the interactive
//! flow is started and then cancelled, so no token is ever written.

#![allow(clippy::expect_used)]

use gogcli_adapter::{discover_gog, AuthState, FailureReason, GogCli};
use std::time::Duration;

/// Discovers gog with an isolated home, returns None if not available.
fn get_gog_cli(home: &std::path::Path) -> Option<GogCli> {
    discover_gog(None).ok().map(|path| GogCli::new(path).with_home(home))
}

#[tokio::test]
#[ignore = "Requires gog CLI installed"]
async fn e2e_version_and_empty_account_list() {
    let home = tempfile::tempdir().expect("tempdir");
    let Some(cli) = get_gog_cli(home.path()) else {
        eprintln!("Skipping: gog CLI not found");
        return;
    };

    let version = cli.version().await.expect("gog version");
    assert!(!version.is_empty());

    // A fresh home holds no tokens.
    assert!(!cli.is_authorized("nobody@example.com").await.unwrap_or(false));
}

#[tokio::test]
#[ignore = "Requires gog CLI installed"]
async fn e2e_auth_add_prints_url_then_cancels() {
    let home = tempfile::tempdir().expect("tempdir");
    let Some(cli) = get_gog_cli(home.path()) else {
        eprintln!("Skipping: gog CLI not found");
        return;
    };

    let mut session = cli
        .auth_session("nobody@example.com")
        .with_url_timeout(Duration::from_secs(15));

    match session.begin().await {
        Ok(url) => {
            assert!(url.starts_with("https://"), "unexpected URL: {url}");
            assert_eq!(session.state(), AuthState::AwaitingCode);
            session.cancel().await;
            assert_eq!(
                session.state(),
                AuthState::Failed {
                    reason: FailureReason::Cancelled,
                    retryable: true
                }
            );
        }
        // Without client credentials gog refuses before printing a URL.
        Err(e) => {
            eprintln!("gog did not offer a URL: {e}");
            assert!(session.state().is_terminal());
        }
    }
    assert!(!session.has_live_process());
}
