//! Error types and handling for docpress
//!
//! This module provides the error taxonomy of the compression pipeline. Every
//! variant maps to an [`ErrorKind`] used by the HTTP layer to choose a status
//! code, and to an [`ErrorSeverity`] used for logging.

use crate::QualityTier;
use std::time::Duration;

/// Remediation hint attached to engine discovery failures
pub const ENGINE_INSTALL_HINT: &str =
    "Download from: https://www.ghostscript.com/download/gsdnld.html";

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// Low severity - caller fault, nothing wrong with the service
    Low,
    /// Medium severity - the attempt failed but the service is healthy
    Medium,
    /// High severity - the service is misconfigured
    High,
    /// Critical severity - the process cannot continue
    Critical,
}

/// Main error type for docpress operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    /// The request is malformed (missing payload, wrong type, unknown tier)
    #[error("Invalid request: {message}")]
    Validation {
        /// What is wrong with the request
        message: String,
    },

    /// Payload exceeds the caller's size entitlement
    #[error("Payload of {actual} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge {
        /// Maximum payload size for the caller, in bytes
        limit: u64,
        /// Actual payload size, in bytes
        actual: u64,
        /// Whether the limit is the premium one
        premium: bool,
    },

    /// Requested quality tier requires a premium plan
    #[error("Quality tier '{tier}' requires a premium plan")]
    FeatureNotEntitled {
        /// The tier that was requested
        tier: QualityTier,
    },

    /// No compression engine found in any candidate location
    #[error("Compression engine not found (probed {} candidates)", .candidates.len())]
    EngineNotFound {
        /// Candidates that were probed
        candidates: Vec<String>,
    },

    /// The engine ran but did not produce a usable artifact
    #[error("Compression engine failed: {message}")]
    Engine {
        /// Summary of the failure
        message: String,
        /// Exit code of the engine process, if it exited normally
        exit_code: Option<i32>,
        /// Captured diagnostic output of the engine
        diagnostics: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {seconds} seconds")]
    Timeout {
        /// Number of seconds after which the operation timed out
        seconds: u64,
    },

    /// All engine slots are busy
    #[error("All {limit} compression slots are busy")]
    Saturated {
        /// Configured concurrency limit
        limit: usize,
    },

    /// A collaborator store failed
    #[error("Store error: {message}")]
    Store {
        /// Error message from the store
        message: String,
    },

    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    /// Malformed request
    Validation,
    /// Size gate rejection
    PayloadTooLarge,
    /// Feature gate rejection
    FeatureNotEntitled,
    /// Engine executable missing
    EngineNotFound,
    /// Engine run failed
    EngineError,
    /// Timeout
    Timeout,
    /// Engine slots exhausted
    Saturated,
    /// Collaborator store failure
    Store,
    /// I/O related errors
    Io,
    /// Configuration errors
    Config,
    /// Other errors
    Other,
}

impl ErrorKind {
    /// Stable name used in structured error responses
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "ValidationError",
            Self::PayloadTooLarge => "PayloadTooLarge",
            Self::FeatureNotEntitled => "FeatureNotEntitled",
            Self::EngineNotFound => "EngineNotFound",
            Self::EngineError => "EngineError",
            Self::Timeout => "Timeout",
            Self::Saturated => "Saturated",
            Self::Store => "StoreError",
            Self::Io => "IoError",
            Self::Config => "ConfigError",
            Self::Other => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::FeatureNotEntitled { .. } => ErrorKind::FeatureNotEntitled,
            Self::EngineNotFound { .. } => ErrorKind::EngineNotFound,
            Self::Engine { .. } => ErrorKind::EngineError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Saturated { .. } => ErrorKind::Saturated,
            Self::Store { .. } => ErrorKind::Store,
            Self::Io { .. } => ErrorKind::Io,
            Self::Config { .. } => ErrorKind::Config,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Validation { .. }
            | Self::PayloadTooLarge { .. }
            | Self::FeatureNotEntitled { .. } => ErrorSeverity::Low,
            Self::Engine { .. } | Self::Timeout { .. } | Self::Saturated { .. } => {
                ErrorSeverity::Medium
            }
            Self::Store { .. } | Self::Io { .. } | Self::Other { .. } => ErrorSeverity::Medium,
            Self::EngineNotFound { .. } | Self::Config { .. } => ErrorSeverity::High,
        }
    }

    /// Check if the caller caused this error
    pub fn is_client_fault(&self) -> bool {
        self.severity() == ErrorSeverity::Low
    }

    /// Check if the caller may reasonably try again.
    ///
    /// The pipeline itself never retries. Engine failures are usually
    /// deterministic for a given input, so a caller retry should change
    /// something (for example the quality tier).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Engine { .. } | Self::Timeout { .. } | Self::Saturated { .. } => true,
            Self::Store { .. } | Self::Io { .. } => true,
            Self::Validation { .. }
            | Self::PayloadTooLarge { .. }
            | Self::FeatureNotEntitled { .. }
            | Self::EngineNotFound { .. }
            | Self::Config { .. }
            | Self::Other { .. } => false,
        }
    }

    /// Remediation hint for the caller, if there is one
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::PayloadTooLarge { premium: false, .. } => {
                Some("Upgrade to Premium for larger file sizes".to_string())
            }
            Self::PayloadTooLarge { premium: true, .. } => {
                Some("Split the document into smaller files".to_string())
            }
            Self::FeatureNotEntitled { tier } => Some(format!(
                "Upgrade to Premium to unlock the {} preset",
                tier
            )),
            Self::EngineNotFound { .. } => Some(ENGINE_INSTALL_HINT.to_string()),
            Self::Engine { .. } => {
                Some("Try a different quality setting or check that the PDF is valid".to_string())
            }
            Self::Saturated { .. } => Some("Retry in a moment".to_string()),
            _ => None,
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a timeout error for `after`, rounded up to whole seconds
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout {
            seconds: after.as_secs() + u64::from(after.subsec_nanos() > 0),
        }
    }

    /// Create a new engine error without process details
    pub fn engine<S: Into<String>>(message: S) -> Self {
        Self::Engine {
            message: message.into(),
            exit_code: None,
            diagnostics: String::new(),
        }
    }

    /// Create a new store error
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_size_rejection_is_client_fault(
            limit in 1u64..,
            actual in 1u64..,
            premium in any::<bool>(),
        ) {
            let error = Error::PayloadTooLarge { limit, actual, premium };
            prop_assert_eq!(error.kind(), ErrorKind::PayloadTooLarge);
            prop_assert!(error.is_client_fault());
            prop_assert!(!error.is_retryable());
            prop_assert!(error.hint().is_some());
        }

        #[test]
        fn test_retryable_errors_are_not_client_faults(message in ".*") {
            let errors = vec![
                Error::engine(message.clone()),
                Error::store(message.clone()),
                Error::Io { message: message.clone() },
                Error::Timeout { seconds: 1 },
            ];
            for error in errors {
                prop_assert!(error.is_retryable());
                prop_assert!(!error.is_client_fault());
            }
        }
    }

    #[test]
    fn test_error_severity_ordering() {
        assert!(ErrorSeverity::Low < ErrorSeverity::Medium);
        assert!(ErrorSeverity::Medium < ErrorSeverity::High);
        assert!(ErrorSeverity::High < ErrorSeverity::Critical);
    }

    #[test]
    fn test_engine_not_found_is_operator_problem() {
        let error = Error::EngineNotFound {
            candidates: vec!["gs".to_string(), "/usr/bin/gs".to_string()],
        };

        assert_eq!(error.kind(), ErrorKind::EngineNotFound);
        assert_eq!(error.severity(), ErrorSeverity::High);
        assert!(!error.is_retryable());
        assert_eq!(error.hint().as_deref(), Some(ENGINE_INSTALL_HINT));
        assert!(error.to_string().contains("2 candidates"));
    }

    #[test]
    fn test_feature_gate_hint_names_tier() {
        let error = Error::FeatureNotEntitled {
            tier: QualityTier::Screen,
        };

        assert_eq!(error.kind().as_str(), "FeatureNotEntitled");
        assert!(error.hint().unwrap().contains("screen"));
        assert!(error.to_string().contains("screen"));
    }

    #[test]
    fn test_timeout_rounds_up_to_whole_seconds() {
        assert_eq!(Error::timeout(Duration::from_millis(300)), Error::Timeout { seconds: 1 });
        assert_eq!(Error::timeout(Duration::from_secs(2)), Error::Timeout { seconds: 2 });
        assert_eq!(Error::timeout(Duration::from_millis(2001)), Error::Timeout { seconds: 3 });
        assert!(Error::timeout(Duration::from_millis(1)).to_string().contains("1 seconds"));
    }

    #[test]
    fn test_premium_size_hint_does_not_upsell() {
        let free = Error::PayloadTooLarge {
            limit: 20,
            actual: 25,
            premium: false,
        };
        let premium = Error::PayloadTooLarge {
            limit: 500,
            actual: 600,
            premium: true,
        };

        assert!(free.hint().unwrap().contains("Upgrade to Premium"));
        assert!(!premium.hint().unwrap().contains("Upgrade"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "scratch file");
        let error = Error::from(io_error);

        assert_eq!(error.kind(), ErrorKind::Io);
        assert_eq!(error.severity(), ErrorSeverity::Medium);
        assert!(error.to_string().contains("scratch file"));
    }

    #[test]
    fn test_engine_error_keeps_diagnostics() {
        let error = Error::Engine {
            message: "exit status 1".to_string(),
            exit_code: Some(1),
            diagnostics: "Error: /syntaxerror in obj".to_string(),
        };

        assert_eq!(error.kind(), ErrorKind::EngineError);
        assert!(error.is_retryable());
        match error {
            Error::Engine { diagnostics, .. } => assert!(diagnostics.contains("syntaxerror")),
            _ => unreachable!(),
        }
    }
}
