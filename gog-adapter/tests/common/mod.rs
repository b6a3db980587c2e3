//! Fake `gog` binaries for process-level tests.
//!
//! Each test writes a small POSIX shell script that impersonates the parts of
//! the gog CLI it needs, so the real subprocess, pipe and signal paths are
//! exercised without a Google account.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Writes an executable `gog` script with `body` into `dir`.
pub fn fake_gog(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("gog");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake gog");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake gog");
    path
}

/// `auth add` that prints a banner and a coloured URL, then accepts `GOOD` or `ABC123`.
///
/// Records the raw stdin line in `$HOME/received_code`, bumps `$HOME/attempts`,
/// and writes its PID to `$HOME/pid`.
pub const INTERACTIVE_AUTH: &str = r#"
if [ "$1 $2" != "auth add" ]; then echo "unexpected: $*" >&2; exit 64; fi
echo $$ > "$HOME/pid"
n=$(cat "$HOME/attempts" 2>/dev/null || echo 0)
n=$((n + 1))
echo "$n" > "$HOME/attempts"
echo "Authorizing $3"
printf '\033[1mVisit the following URL to authorize gog:\033[0m\n'
printf '\033[32mGo to: https://accounts.example/auth?attempt=%s\033[0m\n' "$n"
printf 'Paste the code: '
head -n 1 > "$HOME/received_code"
code=$(tr -d '\n' < "$HOME/received_code")
if [ "$code" = "GOOD" ] || [ "$code" = "ABC123" ]; then
  echo "Authorized $3"
  exit 0
fi
echo "invalid_grant: code $code rejected" >&2
exit 1
"#;

/// Reads the PID a fake script recorded in `$HOME/pid`.
pub fn recorded_pid(home: &Path) -> i32 {
    recorded_pid_file(home, "pid")
}

/// Reads a PID a fake script recorded in `$HOME/<name>`.
pub fn recorded_pid_file(home: &Path, name: &str) -> i32 {
    std::fs::read_to_string(home.join(name))
        .expect("pid file")
        .trim()
        .parse()
        .expect("numeric pid")
}

/// Returns `true` if a process with `pid` still exists (zombies included).
pub fn process_exists(pid: i32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}
