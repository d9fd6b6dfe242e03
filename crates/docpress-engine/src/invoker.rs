//! Engine subprocess execution

use crate::packager::ResultPackager;
use crate::temp::TempResourceManager;
use bytes::Bytes;
use docpress_config::{EngineConfig, ScratchConfig};
use docpress_types::{CompressionResult, Error, QualityTier, RequestId, Result};
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Extra time granted to drain engine output after the run deadline
const DIAGNOSTIC_GRACE: Duration = Duration::from_millis(500);

/// Fixed engine parameters
#[derive(Debug, Clone)]
pub struct InvokerSettings {
    /// Upper bound on one engine run
    pub timeout: Duration,
    /// Captured stdout and stderr are each cut at this size
    pub max_diagnostic_bytes: usize,
    /// `-dCompatibilityLevel` value
    pub compatibility_level: String,
    /// `-dColorImageResolution` value
    pub color_image_resolution: u32,
    /// Prefix of input artifacts
    pub input_prefix: String,
    /// Prefix of output artifacts
    pub output_prefix: String,
}

impl InvokerSettings {
    /// Settings from the engine and scratch configuration
    pub fn from_config(engine: &EngineConfig, scratch: &ScratchConfig) -> Self {
        Self {
            timeout: engine.invocation_timeout(),
            max_diagnostic_bytes: engine.max_diagnostic_bytes,
            compatibility_level: engine.compatibility_level.clone(),
            color_image_resolution: engine.color_image_resolution,
            input_prefix: scratch.input_prefix.clone(),
            output_prefix: scratch.output_prefix.clone(),
        }
    }
}

impl Default for InvokerSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default(), &ScratchConfig::default())
    }
}

/// Runs the engine on a payload through a pair of scratch files
#[derive(Debug, Clone)]
pub struct CompressionInvoker {
    temp: TempResourceManager,
    settings: InvokerSettings,
}

impl CompressionInvoker {
    /// Create an invoker
    pub fn new(temp: TempResourceManager, settings: InvokerSettings) -> Self {
        Self { temp, settings }
    }

    /// Scratch manager used for artifacts
    pub fn temp(&self) -> &TempResourceManager {
        &self.temp
    }

    /// Engine parameters
    pub fn settings(&self) -> &InvokerSettings {
        &self.settings
    }

    /// Compress `payload` with `engine`.
    ///
    /// Both scratch files are removed on every exit path, including timeouts
    /// and the future being dropped. The call returns within the configured
    /// timeout plus a short grace period for draining diagnostics, even when
    /// the engine leaves descendants holding its output pipes open.
    pub async fn invoke(
        &self,
        request_id: RequestId,
        payload: &[u8],
        tier: QualityTier,
        engine: &Path,
    ) -> Result<CompressionResult> {
        let input = self.temp.allocate(&self.settings.input_prefix, request_id);
        let output = self.temp.allocate(&self.settings.output_prefix, request_id);

        tokio::fs::write(input.path(), payload).await?;

        let args = engine_args(&self.settings, tier, input.path(), output.path());
        debug!(
            "Running {} with {} arguments for request {}",
            engine.display(),
            args.len(),
            request_id
        );

        let mut child = Command::new(engine)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Engine {
                message: format!("Failed to start {}: {}", engine.display(), e),
                exit_code: None,
                diagnostics: String::new(),
            })?;

        let deadline = Instant::now() + self.settings.timeout;
        let drain_until = deadline + DIAGNOSTIC_GRACE;
        let cap = self.settings.max_diagnostic_bytes;
        let stdout_reader = tokio::spawn(drain_capped(child.stdout.take(), cap, drain_until));
        let stderr_reader = tokio::spawn(drain_capped(child.stderr.take(), cap, drain_until));

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(Error::engine(format!("Failed to wait for engine: {}", e)));
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill engine for request {}: {}", request_id, e);
                }
                stdout_reader.abort();
                stderr_reader.abort();
                warn!(
                    "Engine timed out after {:?} for request {}",
                    self.settings.timeout, request_id
                );
                return Err(Error::timeout(self.settings.timeout));
            }
        };

        let diagnostics = collect_diagnostics(stderr_reader, stdout_reader).await;

        if !status.success() {
            warn!("Engine exited with {} for request {}", status, request_id);
            debug!("Engine diagnostics for request {}: {}", request_id, diagnostics);
            return Err(Error::Engine {
                message: format!("Engine exited with {}", status),
                exit_code: status.code(),
                diagnostics,
            });
        }

        let bytes = match tokio::fs::read(output.path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::Engine {
                    message: "Engine did not produce an output file".to_string(),
                    exit_code: status.code(),
                    diagnostics,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if bytes.is_empty() {
            return Err(Error::Engine {
                message: "Engine produced an empty output file".to_string(),
                exit_code: status.code(),
                diagnostics,
            });
        }

        input.release().await;
        output.release().await;

        Ok(ResultPackager::package(
            payload.len() as u64,
            Bytes::from(bytes),
        ))
    }
}

/// Engine argument vector. The tier only ever contributes a whitelisted preset.
pub fn engine_args(
    settings: &InvokerSettings,
    tier: QualityTier,
    input: &Path,
    output: &Path,
) -> Vec<OsString> {
    let mut output_arg = OsString::from("-sOutputFile=");
    output_arg.push(output.as_os_str());

    vec![
        OsString::from("-sDEVICE=pdfwrite"),
        OsString::from(format!(
            "-dCompatibilityLevel={}",
            settings.compatibility_level
        )),
        OsString::from(tier.engine_setting()),
        OsString::from("-dNOPAUSE"),
        OsString::from("-dQUIET"),
        OsString::from("-dBATCH"),
        OsString::from("-dSAFER"),
        OsString::from("-dDownsampleColorImages=true"),
        OsString::from(format!(
            "-dColorImageResolution={}",
            settings.color_image_resolution
        )),
        OsString::from("-dColorImageDownsampleType=/Bicubic"),
        output_arg,
        input.as_os_str().to_os_string(),
    ]
}

/// Read a pipe to the end or until `until`, keeping at most `cap` bytes.
///
/// Output cut short by the deadline is reported as truncated.
async fn drain_capped<R>(reader: Option<R>, cap: usize, until: Instant) -> (Vec<u8>, bool)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return (Vec::new(), false);
    };

    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];

    loop {
        match tokio::time::timeout_at(until, reader.read(&mut chunk)).await {
            Err(_) => {
                debug!("Stopped draining engine output at the deadline");
                truncated = true;
                break;
            }
            Ok(Ok(0) | Err(_)) => break,
            Ok(Ok(n)) => {
                let room = cap.saturating_sub(kept.len());
                if n > room {
                    truncated = true;
                }
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }

    (kept, truncated)
}

async fn collect_diagnostics(
    stderr: JoinHandle<(Vec<u8>, bool)>,
    stdout: JoinHandle<(Vec<u8>, bool)>,
) -> String {
    let mut parts = Vec::new();
    for handle in [stderr, stdout] {
        let (bytes, truncated) = handle.await.unwrap_or_default();
        let mut text = String::from_utf8_lossy(&bytes).trim().to_string();
        if truncated {
            text.push_str("...[truncated]");
        }
        if !text.is_empty() {
            parts.push(text);
        }
    }
    parts.join("\n")
}
