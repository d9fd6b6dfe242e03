//! Mapping of pipeline errors onto HTTP responses

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use docpress_types::{Error, ErrorKind, RequestId};
use serde::Serialize;

const MIB: f64 = 1024.0 * 1024.0;

/// Structured error body: `{ kind, error, details, hint? }`
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Stable error kind
    pub kind: String,
    /// Short human-readable summary
    pub error: String,
    /// Human-readable detail
    pub details: String,
    /// Remediation hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// An error on its way to the client
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
    request_id: Option<RequestId>,
    retry_after: bool,
}

impl ApiError {
    /// Build an error response directly
    pub fn new(status: StatusCode, kind: &str, error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                kind: kind.to_string(),
                error: error.into(),
                details: details.into(),
                hint: None,
            },
            request_id: None,
            retry_after: false,
        }
    }

    /// 401 for endpoints that need a session
    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            "Authentication required",
            "This endpoint requires a valid session",
        )
    }

    /// Attach the request id header
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// HTTP status of the response
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// JSON body of the response
    pub fn body(&self) -> &ErrorBody {
        &self.body
    }
}

/// HTTP status for an error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::FeatureNotEntitled => StatusCode::FORBIDDEN,
        ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::Saturated => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::EngineNotFound
        | ErrorKind::EngineError
        | ErrorKind::Store
        | ErrorKind::Io
        | ErrorKind::Config
        | ErrorKind::Other => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn format_limit(bytes: u64) -> String {
    if bytes % (1024 * 1024) == 0 {
        format!("{}", bytes / (1024 * 1024))
    } else {
        format!("{:.1}", bytes as f64 / MIB)
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let (summary, details) = match &error {
            Error::Validation { message } => (message.clone(), error.to_string()),
            Error::PayloadTooLarge { limit, actual, .. } => (
                "File too large".to_string(),
                format!(
                    "File size: {:.1}MB. Limit: {}MB",
                    *actual as f64 / MIB,
                    format_limit(*limit)
                ),
            ),
            Error::FeatureNotEntitled { .. } => ("Premium feature".to_string(), error.to_string()),
            Error::EngineNotFound { candidates } => (
                "Ghostscript not found".to_string(),
                format!("Probed: {}", candidates.join(", ")),
            ),
            Error::Engine {
                message,
                diagnostics,
                ..
            } => {
                let details = if diagnostics.is_empty() {
                    message.clone()
                } else {
                    format!("{}: {}", message, diagnostics)
                };
                ("Compression failed".to_string(), details)
            }
            Error::Timeout { .. } => ("Compression timed out".to_string(), error.to_string()),
            Error::Saturated { .. } => ("Server busy".to_string(), error.to_string()),
            _ => ("Internal server error".to_string(), error.to_string()),
        };

        Self {
            status: status_for(error.kind()),
            body: ErrorBody {
                kind: error.kind().as_str().to_string(),
                error: summary,
                details,
                hint: error.hint(),
            },
            request_id: None,
            retry_after: matches!(error, Error::Saturated { .. }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        let headers = response.headers_mut();
        if self.retry_after {
            headers.insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        if let Some(request_id) = self.request_id {
            if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                headers.insert("x-request-id", value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpress_types::QualityTier;
    use rstest::rstest;

    #[rstest]
    #[case(Error::validation("No PDF file provided"), StatusCode::BAD_REQUEST)]
    #[case(Error::FeatureNotEntitled { tier: QualityTier::Screen }, StatusCode::FORBIDDEN)]
    #[case(Error::PayloadTooLarge { limit: 1, actual: 2, premium: false }, StatusCode::PAYLOAD_TOO_LARGE)]
    #[case(Error::Saturated { limit: 4 }, StatusCode::SERVICE_UNAVAILABLE)]
    #[case(Error::Timeout { seconds: 120 }, StatusCode::GATEWAY_TIMEOUT)]
    #[case(Error::EngineNotFound { candidates: vec![] }, StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(Error::engine("exit status 1"), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(Error::store("down"), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_status_mapping(#[case] error: Error, #[case] expected: StatusCode) {
        assert_eq!(ApiError::from(error).status(), expected);
    }

    #[test]
    fn test_payload_too_large_body() {
        let error = ApiError::from(Error::PayloadTooLarge {
            limit: 20 * 1024 * 1024,
            actual: 25 * 1024 * 1024,
            premium: false,
        });
        assert_eq!(error.body().kind, "PayloadTooLarge");
        assert_eq!(error.body().details, "File size: 25.0MB. Limit: 20MB");
        assert_eq!(
            error.body().hint.as_deref(),
            Some("Upgrade to Premium for larger file sizes")
        );
    }

    #[test]
    fn test_engine_error_surfaces_diagnostics() {
        let error = ApiError::from(Error::Engine {
            message: "Engine exited with exit status: 1".to_string(),
            exit_code: Some(1),
            diagnostics: "Error: /undefined in obj".to_string(),
        });
        assert_eq!(error.body().kind, "EngineError");
        assert!(error.body().details.contains("/undefined in obj"));
        assert!(error.body().hint.is_some());
    }

    #[test]
    fn test_saturated_sets_retry_after() {
        let response = ApiError::from(Error::Saturated { limit: 2 }).into_response();
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1");
    }

    #[test]
    fn test_hint_omitted_when_absent() {
        let body = ApiError::from(Error::validation("File must be a PDF")).body().clone();
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("hint").is_none());
        assert_eq!(json["error"], "File must be a PDF");
    }
}
