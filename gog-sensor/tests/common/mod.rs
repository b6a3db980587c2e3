//! Fake `gog` binaries for the integration tests.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::TempDir;

/// A fake gog script plus the directory it runs with as `HOME`.
pub struct FakeGog {
    dir: TempDir,
    pub path: PathBuf,
    pub home: PathBuf,
}

impl FakeGog {
    /// Writes an executable script with `body`; every invocation is appended to a call log.
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let home = dir.path().join("home");
        std::fs::create_dir_all(&home).expect("create home");
        let path = dir.path().join("gog");
        std::fs::write(
            &path,
            format!(
                "#!/bin/sh\necho \"$*\" >> '{}'\n{body}\n",
                dir.path().join("calls").display()
            ),
        )
        .expect("write fake gog");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod fake gog");
        Self {
            dir,
            path,
            home,
        }
    }

    /// Arguments of every invocation so far, one string per call.
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("calls"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Five inbox messages; fetching thread `t3` fails.
pub const INBOX: &str = r#"
case "$1 $2" in
  "version ") echo "gog v0.9.2" ;;
  "auth list") echo '{"accounts":[{"email":"me@gmail.com"}]}' ;;
  "gmail messages")
    printf '{"messages":['
    for i in 1 2 3 4 5; do
      [ "$i" -gt 1 ] && printf ','
      printf '{"id":"m%s","threadId":"t%s","labelIds":["INBOX"],"payload":{"headers":[{"name":"From","value":"sender%s@example.com"},{"name":"Subject","value":"Message %s"}]}}' "$i" "$i" "$i" "$i"
    done
    echo ']}'
    ;;
  "gmail thread")
    if [ "$4" = "t3" ]; then echo "thread t3: not found" >&2; exit 1; fi
    echo "{\"id\":\"$4\",\"messages\":[{\"id\":\"m${4#t}\",\"labelIds\":[\"INBOX\"]}]}"
    ;;
  *) echo "unknown command: $*" >&2; exit 64 ;;
esac
"#;

/// Interactive `auth add` that prints a URL and accepts the code `GOOD`.
pub const INTERACTIVE_AUTH: &str = r#"
case "$1 $2" in
  "version ") echo "gog 0.9.0"; exit 0 ;;
  "auth list") echo '{"accounts":[]}'; exit 0 ;;
  "auth add") ;;
  *) exit 64 ;;
esac
echo "Go to: https://accounts.example/auth?account=$3"
read -r code
if [ "$code" = "GOOD" ]; then echo "Authorized $3"; exit 0; fi
echo "invalid_grant" >&2
exit 1
"#;
