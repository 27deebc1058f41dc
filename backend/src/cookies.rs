use std::path::Path;

use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: &'static str,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CookiesStatus {
    pub has_cookies: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

pub async fn upload_cookies(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        ApiError::bad_request(format!("Invalid multipart body: {}", rejection.body_text()))
    })?;
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::bad_request(format!("Invalid multipart body: {error}")))?
    {
        if field.name() != Some("cookies") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|error| {
            ApiError::bad_request(format!("Could not read the uploaded file: {error}"))
        })?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, contents) = upload.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
    if filename.trim().is_empty() {
        return Err(ApiError::bad_request("No file selected"));
    }
    if contents.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::bad_request("The uploaded cookies file is empty"));
    }

    store_cookies(&state.config.cookies_path, &contents).await?;
    info!(
        "Stored {} bytes of cookies from {:?} at {:?}",
        contents.len(),
        filename,
        state.config.cookies_path
    );

    Ok(Json(UploadResponse {
        success: true,
        message: "Cookies uploaded successfully!",
        uploaded_at: Utc::now(),
    }))
}

pub async fn cookies_status(State(state): State<AppState>) -> Json<CookiesStatus> {
    let metadata = tokio::fs::metadata(&state.config.cookies_path)
        .await
        .ok()
        .filter(|metadata| metadata.is_file());

    Json(CookiesStatus {
        has_cookies: metadata.is_some(),
        updated_at: metadata
            .and_then(|metadata| metadata.modified().ok())
            .map(DateTime::<Utc>::from),
    })
}

/// Writes next to the target and renames, so readers see the old or the new file, never half.
pub async fn store_cookies(path: &Path, contents: &[u8]) -> Result<(), ApiError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|error| {
            ApiError::internal(format!("Could not prepare the cookies directory: {error}"))
        })?;
    }

    let staging = path.with_file_name(format!(".cookies-{}.tmp", Uuid::new_v4().simple()));
    tokio::fs::write(&staging, contents)
        .await
        .map_err(|error| ApiError::internal(format!("Could not save cookies: {error}")))?;

    if let Err(error) = tokio::fs::rename(&staging, path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(ApiError::internal(format!("Could not save cookies: {error}")));
    }

    Ok(())
}
