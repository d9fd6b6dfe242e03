//! Configuration builder for flexible configuration loading

use crate::{Config, ConfigError, ConfigResult};
use config::{ConfigBuilder as ConfigBuilderInner, Environment, File, FileFormat};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration builder for loading configuration from multiple sources
#[derive(Debug)]
pub struct ConfigBuilder {
    inner: ConfigBuilderInner<config::builder::DefaultState>,
    sources: Vec<ConfigSource>,
    env_separator: String,
}

#[derive(Debug, Clone)]
enum ConfigSource {
    File { path: PathBuf, format: FileFormat },
    Defaults,
    Environment { prefix: String },
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            inner: config::Config::builder(),
            sources: Vec::new(),
            env_separator: "__".to_string(),
        }
    }

    /// Add default configuration values
    pub fn add_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Add a configuration file source. Missing files are skipped.
    pub fn add_source_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = Self::detect_format(&path);
        self.sources.push(ConfigSource::File { path, format });
        self
    }

    /// Add environment variable source with prefix.
    ///
    /// `DOCPRESS_ENGINE__PATH` overrides `engine.path` for prefix `DOCPRESS`.
    pub fn add_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.sources.push(ConfigSource::Environment {
            prefix: prefix.into(),
        });
        self
    }

    /// Set environment variable separator (default: "__")
    pub fn env_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.env_separator = separator.into();
        self
    }

    /// Build and validate the configuration
    pub fn build(mut self) -> ConfigResult<Config> {
        // Defaults are always the base layer
        let defaults = Config::default();
        let defaults_value = serde_yaml::to_value(&defaults)
            .map_err(|e| ConfigError::other(format!("Failed to serialize defaults: {}", e)))?;
        self.inner = self
            .inner
            .add_source(config::Config::try_from(&defaults_value)?);

        for source in &self.sources {
            match source {
                ConfigSource::File { path, format } => {
                    if path.exists() {
                        self.inner = self
                            .inner
                            .add_source(File::from(path.clone()).format(*format));
                    }
                }
                ConfigSource::Environment { prefix } => {
                    self.inner = self.inner.add_source(
                        Environment::with_prefix(prefix)
                            .prefix_separator("_")
                            .separator(&self.env_separator),
                    );
                }
                ConfigSource::Defaults => {}
            }
        }

        let config = self.inner.build()?;
        let result: Config = config.try_deserialize()?;

        Self::validate(&result)?;

        Ok(result)
    }

    /// Try to build the configuration, returning defaults on error
    pub fn build_or_default(self) -> Config {
        self.build().unwrap_or_default()
    }

    fn detect_format(path: &Path) -> FileFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }

    /// Validate a loaded configuration
    pub fn validate(config: &Config) -> ConfigResult<()> {
        if config.server.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::validation(format!(
                "Bind address '{}' is not a valid socket address",
                config.server.bind_addr
            )));
        }

        if !config.server.route.starts_with('/') {
            return Err(ConfigError::validation("Route must start with '/'"));
        }

        let policy = &config.policy;
        if policy.free_max_bytes == 0 || policy.premium_max_bytes == 0 {
            return Err(ConfigError::validation(
                "Size limits must be greater than 0",
            ));
        }

        if policy.premium_max_bytes < policy.free_max_bytes {
            return Err(ConfigError::validation(
                "Premium size limit must not be below the free size limit",
            ));
        }

        if config.server.max_body_bytes < policy.premium_max_bytes {
            return Err(ConfigError::validation(
                "Maximum body size must cover the premium size limit",
            ));
        }

        if policy.expected_mime.trim().is_empty() {
            return Err(ConfigError::validation("Expected MIME type must not be empty"));
        }

        let engine = &config.engine;
        if engine.probe_timeout_secs == 0
            || engine.invocation_timeout_secs == 0
            || config.usage.record_timeout_secs == 0
        {
            return Err(ConfigError::validation("Timeouts must be greater than 0"));
        }

        if engine.max_concurrent_invocations == 0 {
            return Err(ConfigError::validation(
                "Concurrent invocations must be greater than 0",
            ));
        }

        if engine.compatibility_level.is_empty()
            || !engine
                .compatibility_level
                .chars()
                .all(|c| c.is_ascii_digit() || c == '.')
        {
            return Err(ConfigError::validation(
                "Compatibility level must look like '1.4'",
            ));
        }

        if config.scratch.extension.trim().is_empty() {
            return Err(ConfigError::validation("Scratch extension must not be empty"));
        }

        if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::validation(
                "Log level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
