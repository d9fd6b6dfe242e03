//! Result statistics and response metadata

use bytes::Bytes;
use docpress_types::{
    CompressionResult, FileSize, QualityTier, RecordOutcome, RequestId,
};

/// Engine name reported to callers
pub const COMPRESSION_METHOD: &str = "ghostscript";

/// Builds immutable results and the metadata sent back with them
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultPackager;

impl ResultPackager {
    /// Compute statistics for a finished compression.
    ///
    /// A ratio of zero or below is reported as is.
    pub fn package(original_size: FileSize, output: Bytes) -> CompressionResult {
        CompressionResult::new(original_size, output)
    }

    /// Response metadata as `(name, value)` pairs
    pub fn metadata(
        result: &CompressionResult,
        tier: QualityTier,
        request_id: RequestId,
        file_name: &str,
        record: &RecordOutcome,
    ) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("content-type", "application/pdf".to_string()),
            ("content-disposition", content_disposition(file_name)),
            ("x-original-size", result.original_size().to_string()),
            ("x-compressed-size", result.compressed_size().to_string()),
            ("x-compression-ratio", result.ratio().to_string()),
            ("x-compression-method", COMPRESSION_METHOD.to_string()),
            ("x-quality-tier", tier.to_string()),
            ("x-request-id", request_id.to_string()),
            ("x-usage-recorded", record.indicator().to_string()),
        ];

        if let RecordOutcome::Failed(reason) = record {
            headers.push(("x-usage-error", sanitize_header_value(reason)));
        }

        headers
    }
}

/// `attachment; filename="compressed-<name>"`
pub fn content_disposition(file_name: &str) -> String {
    format!(
        "attachment; filename=\"compressed-{}\"",
        sanitize_file_name(file_name)
    )
}

/// Reduce a client file name to printable ASCII without path or quoting characters
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .filter(|c| !matches!(c, '"' | '\\' | ';'))
        .collect();

    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "document.pdf".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Printable ASCII only, capped at 200 characters
fn sanitize_header_value(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { ' ' })
        .take(200)
        .collect::<String>()
        .trim()
        .to_string()
}
