//! HTTP front end.
//!
//! `POST /api/compress-pdf` takes a multipart form with a `file` field (the
//! PDF) and a `quality` field, and answers with the recompressed PDF. Per-image
//! failures are logged here and never reach the caller.

use crate::{compress_pdf_bytes, CompressOptions, QualityTier};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: SocketAddr,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
    /// Compress uncompressed PDF streams on save
    pub compress_streams: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            compress_streams: true,
        }
    }
}

struct AppState {
    compress_streams: bool,
}

/// Errors surfaced to HTTP callers as plain text.
#[derive(Debug)]
pub enum ApiError {
    MissingFile,
    InvalidQuality,
    InvalidForm,
    PayloadTooLarge,
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingFile => (StatusCode::BAD_REQUEST, "No file provided"),
            ApiError::InvalidQuality => (StatusCode::BAD_REQUEST, "Quality must be between 0.1 and 1.0"),
            ApiError::InvalidForm => (StatusCode::BAD_REQUEST, "Invalid form data"),
            ApiError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "File too large"),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to compress PDF"),
        };
        (status, message).into_response()
    }
}

/// Build the router
pub fn router(config: &ServerConfig) -> Router {
    let state = Arc::new(AppState {
        compress_streams: config.compress_streams,
    });

    Router::new()
        .route("/health", get(health))
        .route("/api/compress-pdf", post(compress_pdf))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .with_state(state)
}

/// Serve until the process is stopped.
pub async fn serve(config: ServerConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(&config)).await
}

async fn health() -> &'static str {
    "OK"
}

fn form_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        log::warn!("Rejecting upload over the body limit: {}", e);
        ApiError::PayloadTooLarge
    } else {
        log::warn!("Rejecting malformed multipart body: {}", e);
        ApiError::InvalidForm
    }
}

async fn compress_pdf(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut file = None;
    let mut quality = None;

    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let bytes = field.bytes().await.map_err(form_error)?;
                file = Some(bytes);
            }
            Some("quality") => {
                let text = field.text().await.map_err(form_error)?;
                quality = Some(text);
            }
            _ => {}
        }
    }

    let file = file.filter(|bytes| !bytes.is_empty()).ok_or(ApiError::MissingFile)?;
    let quality = match quality {
        Some(text) => text.parse::<QualityTier>().map_err(|_| ApiError::InvalidQuality)?,
        None => QualityTier::default(),
    };

    let options = CompressOptions {
        quality,
        compress_streams: state.compress_streams,
    };
    let input_len = file.len();

    let (output, report) = tokio::task::spawn_blocking(move || compress_pdf_bytes(&file, &options))
        .await
        .map_err(|e| {
            log::error!("Compression worker failed: {}", e);
            ApiError::Internal
        })?
        .map_err(|e| {
            log::error!("Compression failed: {}", e);
            ApiError::Internal
        })?;

    log::info!(
        "Compressed PDF at quality {}: {} -> {} bytes, {}/{} images recompressed",
        quality,
        input_len,
        output.len(),
        report.recompressed_images,
        report.total_images
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"compressed.pdf\""),
        ],
        output,
    )
        .into_response())
}
