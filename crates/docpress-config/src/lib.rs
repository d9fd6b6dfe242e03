//! Configuration management system for docpress
//!
//! This crate provides layered configuration for the docpress service:
//! serialized defaults, an optional YAML/TOML/JSON file, and environment
//! variable overrides, validated after loading.
//!
//! # Examples
//!
//! ```rust
//! use docpress_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("docpress.yaml")
//!     .add_env_prefix("DOCPRESS")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Free tier limit: {}", config.policy.free_max_bytes);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use docpress_types::QualityTier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

const MIB: u64 = 1024 * 1024;

/// Main configuration structure for docpress
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Size and feature gates
    pub policy: PolicyConfig,
    /// Compression engine configuration
    pub engine: EngineConfig,
    /// Scratch directory configuration
    pub scratch: ScratchConfig,
    /// Usage recording configuration
    pub usage: UsageConfig,
    /// Session resolution configuration
    pub auth: AuthConfig,
    /// Plan records
    pub entitlements: EntitlementsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind_addr: String,
    /// Largest accepted request body
    pub max_body_bytes: u64,
    /// Path of the compression endpoint
    pub route: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            max_body_bytes: 512 * MIB,
            route: "/api/compress-pdf".to_string(),
        }
    }
}

/// Size and feature gates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Free callers are rejected at or above this size
    pub free_max_bytes: u64,
    /// Premium callers are rejected at or above this size
    pub premium_max_bytes: u64,
    /// Tiers reserved for premium callers
    pub premium_tiers: Vec<QualityTier>,
    /// MIME type a request must declare
    pub expected_mime: String,
    /// Require the payload to start with `%PDF-`
    pub require_pdf_header: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            free_max_bytes: 20 * MIB,
            premium_max_bytes: 500 * MIB,
            premium_tiers: vec![QualityTier::Screen],
            expected_mime: "application/pdf".to_string(),
            require_pdf_header: true,
        }
    }
}

/// Compression engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Explicit engine path, probed before the built-in candidates
    pub path: Option<PathBuf>,
    /// Additional candidates probed after the built-in ones
    pub extra_candidates: Vec<String>,
    /// Timeout of a single `--version` probe
    pub probe_timeout_secs: u64,
    /// Timeout of a compression run
    pub invocation_timeout_secs: u64,
    /// Engine processes allowed to run at once
    pub max_concurrent_invocations: usize,
    /// Captured stdout/stderr is truncated to this many bytes
    pub max_diagnostic_bytes: usize,
    /// Output PDF compatibility level
    pub compatibility_level: String,
    /// Colour image downsampling resolution
    pub color_image_resolution: u32,
}

impl EngineConfig {
    /// Probe timeout as a duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Invocation timeout as a duration
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: None,
            extra_candidates: Vec::new(),
            probe_timeout_secs: 5,
            invocation_timeout_secs: 120,
            max_concurrent_invocations: num_cpus::get().max(1),
            max_diagnostic_bytes: 64 * 1024,
            compatibility_level: "1.4".to_string(),
            color_image_resolution: 150,
        }
    }
}

/// Scratch directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchConfig {
    /// Directory for temp artifacts, the OS temp dir when unset
    pub directory: Option<PathBuf>,
    /// File name prefix of input artifacts
    pub input_prefix: String,
    /// File name prefix of output artifacts
    pub output_prefix: String,
    /// File extension of all artifacts
    pub extension: String,
}

impl ScratchConfig {
    /// Resolved scratch directory
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            directory: None,
            input_prefix: "input".to_string(),
            output_prefix: "output".to_string(),
            extension: "pdf".to_string(),
        }
    }
}

/// Usage store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageBackend {
    /// Process memory, lost on restart
    #[default]
    Memory,
    /// Append-only JSON lines file
    Jsonl,
}

/// Usage recording configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Store backend
    pub backend: UsageBackend,
    /// File of the `jsonl` backend
    pub path: PathBuf,
    /// Upper bound on a single usage write
    pub record_timeout_secs: u64,
}

impl UsageConfig {
    /// Record timeout as a duration
    pub fn record_timeout(&self) -> Duration {
        Duration::from_secs(self.record_timeout_secs)
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            backend: UsageBackend::Memory,
            path: PathBuf::from("docpress-usage.jsonl"),
            record_timeout_secs: 5,
        }
    }
}

/// Session resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Cookie carrying the session token
    pub session_cookie: String,
    /// Session token to user id
    #[serde(default)]
    pub sessions: HashMap<String, String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_cookie: "docpress_session".to_string(),
            sessions: HashMap::new(),
        }
    }
}

/// Plan records keyed by user id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitlementsConfig {
    /// User id to plan name (`pro` is premium)
    #[serde(default)]
    pub plans: HashMap<String, String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Enable JSON formatting
    pub json_format: bool,
    /// Log file path
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            log_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let config = Config::default();
        assert_eq!(config.policy.free_max_bytes, 20 * 1024 * 1024);
        assert_eq!(config.policy.premium_tiers, vec![QualityTier::Screen]);
        assert!(config.server.max_body_bytes >= config.policy.premium_max_bytes);
        assert!(config.engine.max_concurrent_invocations >= 1);
    }

    #[test]
    fn test_scratch_directory_fallback() {
        let scratch = ScratchConfig::default();
        assert_eq!(scratch.resolved_directory(), std::env::temp_dir());
    }
}
