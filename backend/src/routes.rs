use std::io::ErrorKind;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Query, State, rejection::QueryRejection},
    http::{
        HeaderMap, HeaderName, HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

use crate::{
    config::DOWNLOAD_FILENAME_HEADER,
    cookies::{cookies_status, upload_cookies},
    error::ApiError,
    materialize::{MaterializedFile, ascii_fallback, content_disposition},
    orchestrator::run_download,
    request::{DownloadParams, DownloadRequest},
    state::AppState,
};

const MAX_COOKIES_UPLOAD_BYTES: usize = 1024 * 1024;
const EXTENSION_DOWNLOAD_NAME: &str = "clipfetch_extension.zip";

pub fn build_router(state: AppState) -> Result<Router, ApiError> {
    let cors = state.config.cors_layer()?;

    Ok(Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/download",
            get(download_from_query).post(download_from_body),
        )
        .route(
            "/api/upload-cookies",
            post(upload_cookies).layer(DefaultBodyLimit::max(MAX_COOKIES_UPLOAD_BYTES)),
        )
        .route("/api/cookies-status", get(cookies_status))
        .route("/api/download-extension", get(download_extension))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn download_from_query(
    State(state): State<AppState>,
    query: Result<Query<DownloadParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = query.map_err(|rejection| {
        ApiError::bad_request(format!("Invalid query string: {}", rejection.body_text()))
    })?;
    let request = DownloadRequest::from_params(params)?;
    let file = run_download(&state, &request).await?;
    file_response(file)
}

async fn download_from_body(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = DownloadRequest::from_json_body(&body)?;
    let file = run_download(&state, &request).await?;
    file_response(file)
}

fn file_response(file: MaterializedFile) -> Result<Response, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(file.mime_type));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(file.bytes.len()));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(&file.filename))
            .map_err(|_| ApiError::internal("Could not build the download header."))?,
    );
    headers.insert(
        HeaderName::from_static(DOWNLOAD_FILENAME_HEADER),
        HeaderValue::from_str(&ascii_fallback(&file.filename))
            .map_err(|_| ApiError::internal("Could not build the file name header."))?,
    );

    Ok((headers, Body::from(file.bytes)).into_response())
}

async fn download_extension(State(state): State<AppState>) -> Result<Response, ApiError> {
    let path = &state.config.extension_archive;
    let file = tokio::fs::File::open(path).await.map_err(|error| {
        if error.kind() == ErrorKind::NotFound {
            ApiError::not_found("The browser extension package is not available.")
        } else {
            ApiError::internal(format!("Could not open the extension package: {error}"))
        }
    })?;
    let metadata = file.metadata().await.map_err(|error| {
        ApiError::internal(format!("Could not read the extension package: {error}"))
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(EXTENSION_DOWNLOAD_NAME))
            .map_err(|_| ApiError::internal("Could not build the download header."))?,
    );

    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}
