//! Fake engine executables for unit tests

use std::io::Write;
use std::path::{Path, PathBuf};

/// Behaviour of a fake engine
#[derive(Debug, Clone, Copy)]
pub enum FakeEngine {
    /// Writes the first half of the input
    Halve,
    /// Writes the input twice
    Grow,
    /// Prints an error, leaves a partial file and exits 1
    Fail,
    /// Exits 0 without writing anything
    NoOutput,
    /// Never finishes
    Hang,
    /// Fails at once but leaves a background process holding its output pipes
    Detach,
}

const PREAMBLE: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "10.06.0"
  exit 0
fi
out=""
in=""
for arg in "$@"; do
  case "$arg" in
    -sOutputFile=*) out="${arg#-sOutputFile=}" ;;
    -*) ;;
    *) in="$arg" ;;
  esac
done
"#;

/// Write a fake engine script into `dir` and return its path
pub fn fake_engine(dir: &Path, behaviour: FakeEngine) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let body = match behaviour {
        FakeEngine::Halve => "size=$(wc -c < \"$in\")\nhead -c $((size / 2)) \"$in\" > \"$out\"\n",
        FakeEngine::Grow => "cat \"$in\" \"$in\" > \"$out\"\n",
        FakeEngine::Fail => {
            "echo \"Unrecoverable error, exit code 1\" >&2\nprintf 'partial' > \"$out\"\nexit 1\n"
        }
        FakeEngine::NoOutput => "exit 0\n",
        FakeEngine::Hang => "exec sleep 30\n",
        FakeEngine::Detach => {
            "sleep 5 &\necho \"Unrecoverable error, exit code 1\" >&2\nexit 1\n"
        }
    };

    let path = dir.join(format!("gs-{:?}", behaviour).to_lowercase());
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(PREAMBLE.as_bytes()).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file.sync_all().unwrap();
    drop(file);

    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
