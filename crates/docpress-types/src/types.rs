//! Core data types for docpress
//!
//! This module provides the request, entitlement, result and usage types that
//! flow through the compression pipeline.

use crate::{Error, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use uuid::Uuid;

/// File size in bytes
pub type FileSize = u64;

/// Leading bytes of every PDF document
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Unique identifier for a compression request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RequestId(Uuid);

impl RequestId {
    /// Create a new request ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fidelity/size preset offered to the compression engine.
///
/// Variants are ordered from smallest/lowest-fidelity to
/// largest/highest-fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum QualityTier {
    /// ~72 DPI, smallest output
    Screen,
    /// ~150 DPI, balanced
    #[default]
    Ebook,
    /// ~300 DPI
    Printer,
    /// ~300 DPI, colour preserving, print ready
    Prepress,
}

impl QualityTier {
    /// All tiers, lowest fidelity first
    pub const ALL: [QualityTier; 4] = [
        QualityTier::Screen,
        QualityTier::Ebook,
        QualityTier::Printer,
        QualityTier::Prepress,
    ];

    /// Lowercase wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Screen => "screen",
            Self::Ebook => "ebook",
            Self::Printer => "printer",
            Self::Prepress => "prepress",
        }
    }

    /// Engine argument selecting this preset.
    ///
    /// This is the only place a tier reaches the engine command line.
    pub fn engine_setting(self) -> &'static str {
        match self {
            Self::Screen => "-dPDFSETTINGS=/screen",
            Self::Ebook => "-dPDFSETTINGS=/ebook",
            Self::Printer => "-dPDFSETTINGS=/printer",
            Self::Prepress => "-dPDFSETTINGS=/prepress",
        }
    }

    /// Nominal image resolution of the preset
    pub fn nominal_dpi(self) -> u32 {
        match self {
            Self::Screen => 72,
            Self::Ebook => 150,
            Self::Printer | Self::Prepress => 300,
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                Error::validation(format!(
                    "Unknown quality '{}', expected one of: screen, ebook, printer, prepress",
                    wanted
                ))
            })
    }
}

/// Identity material carried by a request, before resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    /// User id from an authenticated session
    pub session: Option<String>,
    /// User id declared by the client (lookup-only hint)
    pub hint: Option<String>,
}

impl CallerIdentity {
    /// No identity at all
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Identity backed by an authenticated session
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            session: Some(user_id.into()),
            hint: None,
        }
    }

    /// Identity declared by the client only
    pub fn client_asserted(user_id: impl Into<String>) -> Self {
        Self {
            session: None,
            hint: Some(user_id.into()),
        }
    }
}

/// Where a resolved identity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum IdentitySource {
    /// Server-side session
    Authenticated,
    /// Client-declared hint
    ClientAsserted,
}

/// Outcome of identity resolution.
///
/// `ClientAsserted` identities may be used to look up entitlements and to
/// attribute usage, never to authorize anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedIdentity {
    /// Identity from an authenticated session
    Authenticated(String),
    /// Identity from a client-declared hint
    ClientAsserted(String),
    /// No identity
    Anonymous,
}

impl ResolvedIdentity {
    /// The user id, if any
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Authenticated(id) | Self::ClientAsserted(id) => Some(id),
            Self::Anonymous => None,
        }
    }

    /// Where the identity came from, if any
    pub fn source(&self) -> Option<IdentitySource> {
        match self {
            Self::Authenticated(_) => Some(IdentitySource::Authenticated),
            Self::ClientAsserted(_) => Some(IdentitySource::ClientAsserted),
            Self::Anonymous => None,
        }
    }

    /// Short label for logs and response metadata
    pub fn label(&self) -> &'static str {
        match self {
            Self::Authenticated(_) => "authenticated",
            Self::ClientAsserted(_) => "client_asserted",
            Self::Anonymous => "anonymous",
        }
    }
}

/// A document submitted for compression
#[derive(Debug, Clone)]
pub struct CompressionRequest {
    /// Raw document bytes
    pub payload: Bytes,
    /// MIME type declared by the client
    pub declared_mime: String,
    /// Requested preset
    pub quality_tier: QualityTier,
    /// Identity material
    pub caller: CallerIdentity,
    /// Original file name, if the client sent one
    pub file_name: Option<String>,
}

impl CompressionRequest {
    /// Create a new request for a PDF payload with default settings
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            declared_mime: "application/pdf".to_string(),
            quality_tier: QualityTier::default(),
            caller: CallerIdentity::anonymous(),
            file_name: None,
        }
    }

    /// Set the declared MIME type
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.declared_mime = mime.into();
        self
    }

    /// Set the quality tier
    pub fn with_tier(mut self, tier: QualityTier) -> Self {
        self.quality_tier = tier;
        self
    }

    /// Set the caller identity
    pub fn with_caller(mut self, caller: CallerIdentity) -> Self {
        self.caller = caller;
        self
    }

    /// Set the file name
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Payload size in bytes
    pub fn size(&self) -> FileSize {
        self.payload.len() as FileSize
    }

    /// File name to report, falling back to a generic name
    pub fn display_name(&self) -> &str {
        self.file_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("document.pdf")
    }

    /// Check the request invariants. Performs no I/O.
    pub fn validate(&self, expected_mime: &str, require_pdf_header: bool) -> Result<()> {
        if self.payload.is_empty() {
            return Err(Error::validation("No PDF file provided"));
        }
        if !self.declared_mime.trim().eq_ignore_ascii_case(expected_mime) {
            return Err(Error::validation("File must be a PDF"));
        }
        if require_pdf_header && !self.payload.starts_with(PDF_MAGIC) {
            return Err(Error::validation("File content is not a PDF document"));
        }
        Ok(())
    }
}

/// Plan record returned by the entitlement collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlanRecord {
    /// User the plan belongs to
    pub user_id: String,
    /// Plan name, `pro` for premium
    pub plan_type: String,
    /// Last change of the plan
    pub updated_at: Option<DateTime<Utc>>,
}

impl PlanRecord {
    /// Plan name granting premium entitlement
    pub const PREMIUM_PLAN: &'static str = "pro";

    /// Create a plan record
    pub fn new(user_id: impl Into<String>, plan_type: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            plan_type: plan_type.into(),
            updated_at: None,
        }
    }

    /// Whether the plan is premium
    pub fn is_premium(&self) -> bool {
        self.plan_type.eq_ignore_ascii_case(Self::PREMIUM_PLAN)
    }
}

/// Per-request entitlement of a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementDecision {
    /// Whether the caller is premium
    pub is_premium: bool,
    /// Payloads of this size or more are rejected
    pub max_allowed_bytes: FileSize,
    /// Tiers the caller may request
    pub allowed_quality_tiers: BTreeSet<QualityTier>,
    /// The entitlement lookup failed and the decision fell back to free
    pub lookup_failed: bool,
}

impl EntitlementDecision {
    /// Check whether a tier is allowed
    pub fn allows(&self, tier: QualityTier) -> bool {
        self.allowed_quality_tiers.contains(&tier)
    }
}

/// Size reduction as a percentage with two decimals.
///
/// Stored as hundredths of a percent. Negative when the output grew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompressionRatio(i64);

impl CompressionRatio {
    /// Compute `round((1 - compressed / original) * 100, 2)`.
    ///
    /// Rounds half away from zero. An empty original yields zero.
    pub fn from_sizes(original: FileSize, compressed: FileSize) -> Self {
        if original == 0 {
            return Self(0);
        }
        let original = i128::from(original);
        let saved = (original - i128::from(compressed)) * 10_000;
        let quotient = saved / original;
        let remainder = saved % original;
        let rounded = if remainder.abs() * 2 >= original {
            quotient + saved.signum()
        } else {
            quotient
        };
        Self(rounded as i64)
    }

    /// Hundredths of a percent
    pub fn hundredths(self) -> i64 {
        self.0
    }

    /// Percentage as a float
    pub fn percent(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// The output is not smaller than the input
    pub fn is_ineffective(self) -> bool {
        self.0 <= 0
    }
}

impl std::fmt::Display for CompressionRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// Output of a successful compression. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionResult {
    output: Bytes,
    original_size: FileSize,
    compressed_size: FileSize,
    ratio: CompressionRatio,
}

impl CompressionResult {
    /// Build a result from the original size and the compressed bytes
    pub fn new(original_size: FileSize, output: Bytes) -> Self {
        let compressed_size = output.len() as FileSize;
        Self {
            ratio: CompressionRatio::from_sizes(original_size, compressed_size),
            output,
            original_size,
            compressed_size,
        }
    }

    /// Compressed document bytes
    pub fn output(&self) -> &Bytes {
        &self.output
    }

    /// Consume the result and return the compressed bytes
    pub fn into_output(self) -> Bytes {
        self.output
    }

    /// Size of the submitted document
    pub fn original_size(&self) -> FileSize {
        self.original_size
    }

    /// Size of the compressed document
    pub fn compressed_size(&self) -> FileSize {
        self.compressed_size
    }

    /// Size reduction
    pub fn ratio(&self) -> CompressionRatio {
        self.ratio
    }

    /// Bytes saved, negative when the output grew
    pub fn bytes_saved(&self) -> i64 {
        self.original_size as i64 - self.compressed_size as i64
    }
}

/// Append-only record of a successful compression
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UsageRecord {
    /// Record id
    pub id: Uuid,
    /// User the compression is attributed to
    pub user_id: String,
    /// Where the user id came from
    pub identity_source: IdentitySource,
    /// Name of the submitted file
    pub file_name: String,
    /// Size of the submitted document
    pub original_size: FileSize,
    /// Size of the compressed document
    pub compressed_size: FileSize,
    /// Preset used
    pub quality_tier: QualityTier,
    /// Request that produced the record
    pub request_id: RequestId,
    /// When the compression completed
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    /// Bytes saved, negative when the output grew
    pub fn bytes_saved(&self) -> i64 {
        self.original_size as i64 - self.compressed_size as i64
    }
}

/// Aggregated usage of one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UsageSummary {
    /// Number of compressions
    pub count: u64,
    /// Total bytes saved across all compressions
    pub bytes_saved: i64,
}

impl UsageSummary {
    /// Fold one record into the summary
    pub fn add(&mut self, record: &UsageRecord) {
        self.count += 1;
        self.bytes_saved += record.bytes_saved();
    }
}

/// Outcome of the best-effort usage write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Record written
    Recorded,
    /// No identity, nothing to write
    Skipped,
    /// Write failed; the compression result stands
    Failed(String),
}

impl RecordOutcome {
    /// Value for the recording-success response indicator
    pub fn indicator(&self) -> &'static str {
        match self {
            Self::Recorded => "true",
            Self::Skipped => "skipped",
            Self::Failed(_) => "false",
        }
    }

    /// Whether the write failed
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}
