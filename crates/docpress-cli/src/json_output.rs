//! JSON output structures for the docpress CLI

use docpress_engine::CompressionOutcome;
use docpress_types::Error;
use serde::{Deserialize, Serialize};

/// Complete JSON output for a compression run
#[derive(Debug, Serialize, Deserialize)]
pub struct CompressResultJson {
    /// Operation metadata
    pub metadata: OperationMetadata,
    /// Compression statistics
    pub stats: CompressionStatsJson,
    /// Usage recording outcome: `true`, `false` or `skipped`
    pub usage_recorded: String,
    /// Reason the usage write failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_error: Option<String>,
    /// Overall result
    pub result: OperationResult,
}

/// Operation metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// docpress version
    pub version: String,
    /// Request id
    pub request_id: String,
    /// Timestamp when the operation finished
    pub timestamp: String,
    /// Input path
    pub input_path: String,
    /// Output path, absent on failure
    pub output_path: Option<String>,
}

/// Compression statistics in JSON format
#[derive(Debug, Serialize, Deserialize)]
pub struct CompressionStatsJson {
    /// Quality preset
    pub quality: String,
    /// Original size in bytes
    pub original_size: u64,
    /// Compressed size in bytes
    pub compressed_size: u64,
    /// Bytes saved, negative when the output grew
    pub bytes_saved: i64,
    /// Reduction percentage with two decimals
    pub compression_ratio: String,
    /// Duration in seconds
    pub duration_seconds: f64,
}

/// Overall operation result
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResult {
    /// Whether the operation was successful
    pub success: bool,
    /// Error kind on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Result message
    pub message: String,
    /// Remediation hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// JSON output for a failed run
#[derive(Debug, Serialize, Deserialize)]
pub struct CompressErrorJson {
    /// Operation metadata
    pub metadata: OperationMetadata,
    /// Overall result
    pub result: OperationResult,
}

impl CompressResultJson {
    /// Create a CompressResultJson from a pipeline outcome
    pub fn new(
        input_path: String,
        output_path: String,
        outcome: &CompressionOutcome,
        duration_seconds: f64,
    ) -> Self {
        let result = &outcome.result;
        let ratio = result.ratio();
        let message = if ratio.is_ineffective() {
            "Compression completed but the output is not smaller than the input".to_string()
        } else {
            format!("Compression completed, saved {}%", ratio)
        };

        Self {
            metadata: OperationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                request_id: outcome.request_id.to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                input_path,
                output_path: Some(output_path),
            },
            stats: CompressionStatsJson {
                quality: outcome.quality_tier.to_string(),
                original_size: result.original_size(),
                compressed_size: result.compressed_size(),
                bytes_saved: result.bytes_saved(),
                compression_ratio: ratio.to_string(),
                duration_seconds,
            },
            usage_recorded: outcome.record.indicator().to_string(),
            usage_error: match &outcome.record {
                docpress_types::RecordOutcome::Failed(reason) => Some(reason.clone()),
                _ => None,
            },
            result: OperationResult {
                success: true,
                kind: None,
                message,
                hint: None,
            },
        }
    }
}

impl CompressErrorJson {
    /// Create a CompressErrorJson from a pipeline error
    pub fn new(input_path: String, request_id: String, error: &Error) -> Self {
        Self {
            metadata: OperationMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                request_id,
                timestamp: chrono::Utc::now().to_rfc3339(),
                input_path,
                output_path: None,
            },
            result: OperationResult {
                success: false,
                kind: Some(error.kind().as_str().to_string()),
                message: error.to_string(),
                hint: error.hint(),
            },
        }
    }
}
