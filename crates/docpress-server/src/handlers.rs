//! Request handlers

use crate::error::ApiError;
use crate::session::session_token;
use crate::AppState;
use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use docpress_types::{CallerIdentity, CompressionRequest, Error, QualityTier, RequestId};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Multipart field carrying the document
pub const FIELD_PDF: &str = "pdf";
/// Multipart field carrying the preset name
pub const FIELD_QUALITY: &str = "quality";
/// Multipart field carrying the client-asserted user id
pub const FIELD_USER_ID: &str = "user_id";

const DEFAULT_USAGE_LIMIT: usize = 20;
const MAX_USAGE_LIMIT: usize = 100;

/// Fields pulled out of the multipart form
#[derive(Debug, Default)]
struct UploadForm {
    payload: Option<Bytes>,
    mime: Option<String>,
    file_name: Option<String>,
    quality: Option<String>,
    user_id: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                FIELD_PDF => {
                    form.mime = field.content_type().map(str::to_string);
                    form.file_name = field.file_name().map(str::to_string);
                    form.payload = Some(field.bytes().await.map_err(multipart_error)?);
                }
                FIELD_QUALITY => form.quality = Some(field.text().await.map_err(multipart_error)?),
                FIELD_USER_ID => form.user_id = Some(field.text().await.map_err(multipart_error)?),
                other => debug!("Ignoring multipart field '{}'", other),
            }
        }
        Ok(form)
    }

    fn quality_tier(&self) -> Result<QualityTier, Error> {
        match self.quality.as_deref().map(str::trim) {
            None | Some("") => Ok(QualityTier::default()),
            Some(value) => value.parse(),
        }
    }
}

fn multipart_error(error: axum::extract::multipart::MultipartError) -> ApiError {
    let status = error.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(status, "PayloadTooLarge", "File too large", error.body_text())
    } else {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "ValidationError",
            "Malformed upload",
            error.body_text(),
        )
    }
}

async fn caller_identity(state: &AppState, headers: &HeaderMap, hint: Option<String>) -> CallerIdentity {
    let session = match session_token(headers, &state.session_cookie) {
        Some(token) => state.sessions.resolve(&token).await,
        None => None,
    };
    CallerIdentity { session, hint }
}

/// `POST /api/compress-pdf`
pub async fn compress_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let request_id = RequestId::new();
    match compress(&state, &headers, multipart, request_id).await {
        Ok(response) => response,
        Err(error) => error.with_request_id(request_id).into_response(),
    }
}

async fn compress(
    state: &AppState,
    headers: &HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
    request_id: RequestId,
) -> Result<Response, ApiError> {
    let multipart = multipart.map_err(|rejection| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "ValidationError",
            "Malformed upload",
            rejection.body_text(),
        )
    })?;
    let form = UploadForm::read(multipart).await?;

    let Some(payload) = form.payload.clone() else {
        return Err(Error::validation("No PDF file provided").into());
    };
    let tier = form.quality_tier()?;
    let caller = caller_identity(state, headers, form.user_id.clone()).await;

    let mut request = CompressionRequest::new(payload)
        .with_mime(
            form.mime
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        )
        .with_tier(tier)
        .with_caller(caller);
    if let Some(name) = form.file_name {
        request = request.with_file_name(name);
    }

    let outcome = state.pipeline.process_with_id(request_id, request).await?;

    let mut response = Response::new(Body::from(outcome.result.output().clone()));
    *response.status_mut() = StatusCode::OK;
    let response_headers = response.headers_mut();
    for (name, value) in outcome.metadata() {
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                response_headers.insert(HeaderName::from_static(name), value);
            }
            Err(e) => warn!("Dropping response header {}: {}", name, e),
        }
    }
    Ok(response)
}

/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "engine_available": state.pipeline.engine_available().await,
        "available_slots": state.pipeline.available_slots(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Query parameters for the usage listing
#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    /// Maximum records to return
    pub limit: Option<usize>,
}

/// `GET /api/usage`: history for the authenticated caller
pub async fn usage_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Value>, ApiError> {
    let token = session_token(&headers, &state.session_cookie).ok_or_else(ApiError::unauthorized)?;
    let user_id = state
        .sessions
        .resolve(&token)
        .await
        .ok_or_else(ApiError::unauthorized)?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_USAGE_LIMIT)
        .clamp(1, MAX_USAGE_LIMIT);
    let store = state.pipeline.usage_store();
    let records = store.list(&user_id, limit).await?;
    let summary = store.summary(&user_id).await?;

    Ok(Json(json!({
        "user_id": user_id,
        "summary": summary,
        "records": records,
    })))
}
