//! Command-line argument builders for gog invocations.
//!
//! ## Command Reference
//!
//! | Operation | Arguments |
//! |-----------|-----------|
//! | version check | `version` |
//! | authorized accounts | `auth list --json` |
//! | OAuth client credentials | `auth credentials set <path>` |
//! | interactive authorization | `auth add <account>` |
//! | inbox search | `gmail messages search <query> --max=<n> --json [--include-body]` |
//! | thread fetch | `gmail thread get <threadId> --json` |
//!
//! `auth add` is the only interactive command: gog prints an authorization
//! URL on stdout and then reads the code (or the full redirect URL) from stdin.

use std::ffi::OsString;
use std::path::Path;

fn args<const N: usize>(parts: [&str; N]) -> Vec<OsString> {
    parts.into_iter().map(OsString::from).collect()
}

/// `gog version`
#[must_use]
pub fn version() -> Vec<OsString> {
    args(["version"])
}

/// `gog auth list --json`
#[must_use]
pub fn list_auth() -> Vec<OsString> {
    args(["auth", "list", "--json"])
}

/// `gog auth credentials set <path>`
#[must_use]
pub fn set_credentials(path: &Path) -> Vec<OsString> {
    let mut out = args(["auth", "credentials", "set"]);
    out.push(path.as_os_str().to_owned());
    out
}

/// `gog auth add <account>`
#[must_use]
pub fn auth_add(account: &str) -> Vec<OsString> {
    args(["auth", "add", account])
}

/// `gog gmail messages search <query> --max=<n> --json [--include-body]`
#[must_use]
pub fn search_messages(query: &str, limit: u32, include_body: bool) -> Vec<OsString> {
    let mut out = args(["gmail", "messages", "search", query]);
    out.push(OsString::from(format!("--max={limit}")));
    out.push(OsString::from("--json"));
    if include_body {
        out.push(OsString::from("--include-body"));
    }
    out
}

/// `gog gmail thread get <threadId> --json`
#[must_use]
pub fn get_thread(thread_id: &str) -> Vec<OsString> {
    args(["gmail", "thread", "get", thread_id, "--json"])
}

/// Renders an argument list for error messages and logs.
#[must_use]
pub fn display(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
