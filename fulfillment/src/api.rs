//! HTTP surface of the fulfillment service.
//!
//! The tenant session comes from headers set by the upstream auth proxy:
//! `X-Shop-Domain` names the tenant and `X-Shop-Access-Token` carries the
//! platform credential used for the upload endpoint.

use crate::config::UploadConfig;
use crate::engine::DecisionEngine;
use crate::errors::{BatchError, ParseError};
use crate::gateway::{GatewayFactory, Session};
use crate::normalizer::{self, FileFormat};
use crate::orchestrator::BatchOrchestrator;
use crate::report;
use crate::settings::{SettingsStore, SettingsUpdate, TenantSettings};
use crate::store::ReportStore;
use crate::tracking::TrackingUrlResolver;
use crate::types::{FulfillmentResult, ReportStats};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, FromRequestParts, Multipart, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

pub const SHOP_DOMAIN_HEADER: &str = "x-shop-domain";
pub const ACCESS_TOKEN_HEADER: &str = "x-shop-access-token";

const UPLOAD_FIELD: &str = "file";
/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BatchOrchestrator>,
    pub reports: Arc<dyn ReportStore>,
    pub settings: Arc<SettingsStore>,
    pub gateways: Arc<dyn GatewayFactory>,
    pub upload: UploadConfig,
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.upload.max_file_size.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/api/orders/bulk-fulfill", post(bulk_fulfill))
        .route("/api/orders/fulfillment-report", get(get_report))
        .route("/api/orders/fulfillment-report/download", get(download_report))
        .route("/api/settings", get(get_settings).post(save_settings))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Missing {0} header")]
    Unauthenticated(&'static str),

    #[error("No file uploaded")]
    NoFile,

    #[error("Allowed file types: {}", FileFormat::ALLOWED_EXTENSIONS.join(", "))]
    InvalidFileType,

    #[error("Maximum size is {0} bytes")]
    FileTooLarge(usize),

    #[error("Could not read upload: {0}")]
    Upload(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("No fulfillment report available.")]
    ReportNotFound,

    #[error("No settings provided")]
    NoSettings,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn from_multipart(err: MultipartError, max_file_size: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::FileTooLarge(max_file_size)
        } else {
            ApiError::Upload(err.body_text())
        }
    }

    fn status_and_error(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::NoFile => (StatusCode::BAD_REQUEST, "No file uploaded"),
            ApiError::InvalidFileType => (StatusCode::BAD_REQUEST, "Invalid file type"),
            ApiError::FileTooLarge(_) => (StatusCode::BAD_REQUEST, "File too large"),
            ApiError::Upload(_) => (StatusCode::BAD_REQUEST, "Invalid upload"),
            ApiError::Parse(_) => (StatusCode::BAD_REQUEST, "Invalid spreadsheet"),
            ApiError::Batch(BatchError::NoOrders) => {
                (StatusCode::BAD_REQUEST, "No orders found in file")
            }
            ApiError::Batch(BatchError::TooManyOrders { .. }) => {
                (StatusCode::BAD_REQUEST, "Too many orders")
            }
            ApiError::Batch(BatchError::Store(_)) | ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error during fulfillment",
            ),
            ApiError::ReportNotFound => (StatusCode::NOT_FOUND, "Not found"),
            ApiError::NoSettings => (StatusCode::BAD_REQUEST, "No settings provided"),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_error();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            // The missing-report response carries only the message.
            error: (!matches!(self, ApiError::ReportNotFound)).then_some(error),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// The tenant named by `X-Shop-Domain`.
pub struct Tenant(pub String);

/// A tenant plus its platform access token.
pub struct TenantSession(pub Session);

fn required_header(headers: &HeaderMap, name: &'static str) -> Result<String, ApiError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
        .ok_or(ApiError::Unauthenticated(name))
}

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        required_header(&parts.headers, SHOP_DOMAIN_HEADER).map(Tenant)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for TenantSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(TenantSession(Session {
            shop: required_header(&parts.headers, SHOP_DOMAIN_HEADER)?,
            access_token: required_header(&parts.headers, ACCESS_TOKEN_HEADER)?,
        }))
    }
}

#[derive(Serialize)]
struct BulkFulfillResponse {
    summary: Vec<FulfillmentResult>,
    stats: ReportStats,
}

#[derive(Serialize)]
struct ReportResponse {
    report: Vec<FulfillmentResult>,
}

#[derive(Serialize)]
struct SaveSettingsResponse {
    message: &'static str,
    settings: TenantSettings,
}

/// An upload spooled to a temporary file. The file is removed when this
/// value is dropped.
struct Upload {
    file: NamedTempFile,
    format: FileFormat,
}

/// Streams the `file` field to a temporary file, enforcing the size limit
/// while reading.
async fn receive_upload(multipart: &mut Multipart, config: &UploadConfig) -> Result<Upload, ApiError> {
    let max = config.max_file_size;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_multipart(e, max))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let format = FileFormat::from_file_name(&file_name).map_err(|_| ApiError::InvalidFileType)?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("bulkship-upload-").suffix(format.extension());
        let file = match &config.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| ApiError::Internal(format!("Could not create temp file: {e}")))?;

        let handle = file
            .reopen()
            .map_err(|e| ApiError::Internal(format!("Could not open temp file: {e}")))?;
        let mut out = tokio::fs::File::from_std(handle);

        let mut size = 0usize;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::from_multipart(e, max))?
        {
            size += chunk.len();
            if size > max {
                return Err(ApiError::FileTooLarge(max));
            }
            out.write_all(&chunk)
                .await
                .map_err(|e| ApiError::Internal(format!("Could not write temp file: {e}")))?;
        }
        out.flush()
            .await
            .map_err(|e| ApiError::Internal(format!("Could not write temp file: {e}")))?;

        tracing::debug!(file_name = %file_name, size, "upload received");
        return Ok(Upload { file, format });
    }

    Err(ApiError::NoFile)
}

async fn bulk_fulfill(
    State(state): State<AppState>,
    TenantSession(session): TenantSession,
    mut multipart: Multipart,
) -> Result<Json<BulkFulfillResponse>, ApiError> {
    let upload = receive_upload(&mut multipart, &state.upload).await?;
    let settings = state.settings.get(&session.shop);

    let bytes = tokio::fs::read(upload.file.path())
        .await
        .map_err(|e| ApiError::Internal(format!("Could not read temp file: {e}")))?;
    drop(upload.file);

    let default_company = settings.default_tracking_company.clone();
    let format = upload.format;
    let records = tokio::task::spawn_blocking(move || {
        normalizer::parse(&bytes, format, &default_company)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Spreadsheet parsing failed: {e}")))??;

    let engine = Arc::new(DecisionEngine::new(
        state.gateways.for_session(&session),
        TrackingUrlResolver::from_settings(&settings),
    ));

    let report = state.orchestrator.run(&session.shop, records, engine).await?;

    Ok(Json(BulkFulfillResponse {
        summary: report.results.clone(),
        stats: report::summarize(&report),
    }))
}

async fn get_report(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
) -> Result<Json<ReportResponse>, ApiError> {
    let report = state.reports.get(&tenant).ok_or(ApiError::ReportNotFound)?;

    Ok(Json(ReportResponse {
        report: report.results.clone(),
    }))
}

async fn download_report(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
) -> Result<Response, ApiError> {
    let report = state.reports.get(&tenant).ok_or(ApiError::ReportNotFound)?;
    let body = report::render(&report).map_err(|e| ApiError::Internal(e.to_string()))?;

    let disposition = format!(
        "attachment; filename=fulfillment_report_{}.{}",
        Utc::now().timestamp_millis(),
        report::FILE_EXTENSION
    );

    Ok((
        [
            (header::CONTENT_TYPE, report::CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

async fn get_settings(State(state): State<AppState>, Tenant(tenant): Tenant) -> Json<TenantSettings> {
    Json(state.settings.get(&tenant))
}

async fn save_settings(
    State(state): State<AppState>,
    Tenant(tenant): Tenant,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SaveSettingsResponse>, ApiError> {
    if update.is_empty() {
        return Err(ApiError::NoSettings);
    }

    Ok(Json(SaveSettingsResponse {
        message: "Settings saved successfully",
        settings: state.settings.save(&tenant, update),
    }))
}
