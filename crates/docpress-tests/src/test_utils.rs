//! Shared utilities for docpress integration tests
//!
//! Fake engine scripts, PDF payload generation, multipart request building
//! and collaborator stores that fail on demand.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use docpress_config::Config;
use docpress_engine::EngineLocator;
use docpress_types::{
    EntitlementStore, Error, PlanRecord, Result, UsageRecord, UsageStore, UsageSummary,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// One mebibyte
pub const MIB: usize = 1024 * 1024;

/// Common payload sizes for policy scenarios
pub struct CommonPayloadSizes;

impl CommonPayloadSizes {
    /// Comfortably inside every limit
    pub const SMALL: usize = 64 * 1024;
    /// Under the free limit
    pub const FREE_OK: usize = 5 * MIB;
    /// Exactly the free limit
    pub const FREE_LIMIT: usize = 20 * MIB;
    /// Over the free limit, under the premium one
    pub const PREMIUM_ONLY: usize = 25 * MIB;
}

/// Generate a PDF-looking payload of exactly `size` bytes
///
/// The payload starts with a PDF header and is padded with a repeating,
/// deterministic pattern.
pub fn sample_pdf(size: usize) -> Vec<u8> {
    let header = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n1 0 obj\n<< /Type /Catalog >>\nendobj\n";
    let mut data = Vec::with_capacity(size.max(header.len()));
    data.extend_from_slice(header);
    let mut i = 0usize;
    while data.len() < size {
        data.push(b"0123456789abcdef \n"[(i * 7 + 13) % 18]);
        i += 1;
    }
    data.truncate(size.max(header.len()));
    data
}

/// Behaviour of a fake engine executable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineBehaviour {
    /// Writes the first half of the input
    Halve,
    /// Copies the input unchanged
    Copy,
    /// Prints diagnostics, leaves a partial file and exits 3
    Fail,
    /// Sleeps far longer than any test timeout
    Hang,
}

const ENGINE_PREAMBLE: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "10.06.0"
  exit 0
fi
: > "$0.args"
for arg in "$@"; do
  printf '%s\n' "$arg" >> "$0.args"
done
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

/// Write a fake engine into `dir`
///
/// Every compression run writes its argument vector, one argument per line,
/// next to the script (see [`recorded_args`]).
#[cfg(unix)]
pub fn write_fake_engine(dir: &Path, behaviour: EngineBehaviour) -> PathBuf {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let body = match behaviour {
        EngineBehaviour::Halve => {
            "size=$(wc -c < \"$in\")\nhead -c $((size / 2)) \"$in\" > \"$out\"\n"
        }
        EngineBehaviour::Copy => "cat \"$in\" > \"$out\"\n",
        EngineBehaviour::Fail => {
            "echo \"Error: /syntaxerror in --run--\" >&2\n\
             echo \"GPL Ghostscript: Unrecoverable error, exit code 1\" >&2\n\
             printf 'partial' > \"$out\"\nexit 3\n"
        }
        EngineBehaviour::Hang => "exec sleep 60\n",
    };

    let path = dir.join(format!("fake-gs-{:?}", behaviour).to_lowercase());
    let mut file = fs::File::create(&path).expect("Failed to create fake engine");
    file.write_all(ENGINE_PREAMBLE.as_bytes())
        .expect("Failed to write fake engine");
    file.write_all(body.as_bytes())
        .expect("Failed to write fake engine");
    file.sync_all().expect("Failed to sync fake engine");
    drop(file);

    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("Failed to make fake engine executable");
    path
}

/// Arguments of the last run of the fake engine at `engine`
pub fn recorded_args(engine: &Path) -> Vec<String> {
    let mut log = engine.as_os_str().to_os_string();
    log.push(".args");
    fs::read_to_string(PathBuf::from(log))
        .map(|text| text.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// A locator whose only candidate does not exist
pub fn missing_engine_locator() -> EngineLocator {
    EngineLocator::new(
        vec!["/nonexistent/docpress-tests/gs".to_string()],
        Duration::from_millis(500),
    )
}

/// Isolated directories for one test
pub struct TestEnvironment {
    root: TempDir,
}

impl TestEnvironment {
    /// Create a fresh environment with empty scratch and engine directories
    pub fn new() -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(root.path().join("scratch")).expect("Failed to create scratch dir");
        fs::create_dir_all(root.path().join("bin")).expect("Failed to create bin dir");
        Self { root }
    }

    /// Directory the pipeline allocates temp artifacts in
    pub fn scratch(&self) -> PathBuf {
        self.root.path().join("scratch")
    }

    /// Directory fake engines are written to
    pub fn bin(&self) -> PathBuf {
        self.root.path().join("bin")
    }

    /// Root of the environment
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Configuration pointing at this environment's scratch directory
    pub fn config(&self, engine: Option<&Path>) -> Config {
        let mut config = Config::default();
        config.scratch.directory = Some(self.scratch());
        config.engine.path = engine.map(Path::to_path_buf);
        config.engine.probe_timeout_secs = 5;
        config.engine.invocation_timeout_secs = 30;
        config
    }

    /// Files currently present in the scratch directory
    pub fn scratch_entries(&self) -> Vec<PathBuf> {
        fs::read_dir(self.scratch())
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `multipart/form-data` request bodies
#[derive(Debug)]
pub struct MultipartForm {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartForm {
    /// Start an empty form
    pub fn new() -> Self {
        Self {
            boundary: "docpress-integration-boundary".to_string(),
            body: Vec::new(),
        }
    }

    /// Add a file part
    pub fn file(mut self, name: &str, file_name: &str, mime: &str, data: &[u8]) -> Self {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                name, file_name, mime
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Add a PDF file part under the `pdf` field
    pub fn pdf(self, file_name: &str, data: &[u8]) -> Self {
        self.file("pdf", file_name, "application/pdf", data)
    }

    /// Add a text part
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n", name, value)
                .as_bytes(),
        );
        self
    }

    /// Finish the form into a POST request for `uri`
    pub fn into_request(mut self, uri: &str, cookie: Option<&str>) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        let mut builder = Request::builder().method("POST").uri(uri).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", self.boundary),
        );
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder
            .body(Body::from(self.body))
            .expect("Failed to build request")
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

/// Usage store whose writes always fail
#[derive(Debug, Default)]
pub struct FailingUsageStore;

#[async_trait]
impl UsageStore for FailingUsageStore {
    async fn insert(&self, _record: UsageRecord) -> Result<()> {
        Err(Error::store("usage database unavailable"))
    }

    async fn list(&self, _user_id: &str, _limit: usize) -> Result<Vec<UsageRecord>> {
        Err(Error::store("usage database unavailable"))
    }

    async fn summary(&self, _user_id: &str) -> Result<UsageSummary> {
        Err(Error::store("usage database unavailable"))
    }
}

/// Entitlement store whose lookups always fail
#[derive(Debug, Default)]
pub struct FailingEntitlementStore;

#[async_trait]
impl EntitlementStore for FailingEntitlementStore {
    async fn lookup(&self, _user_id: &str) -> Result<Option<PlanRecord>> {
        Err(Error::store("subscription service timed out"))
    }
}
