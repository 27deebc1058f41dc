//! Turning the resolver's on-disk output into an in-memory response body.
//!
//! The whole file is read before it is deleted, so the response never
//! streams from a path that cleanup may already have removed.

use std::{io::ErrorKind, path::Path};

use axum::body::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::{error::ApiError, request::TargetFormat, resolver::ResolvedArtifact};

pub const MAX_FILENAME_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct MaterializedFile {
    pub bytes: Bytes,
    pub filename: String,
    pub mime_type: &'static str,
}

pub async fn materialize(
    artifact: &ResolvedArtifact,
    format: TargetFormat,
    request_id: Uuid,
    max_bytes: u64,
) -> Result<MaterializedFile, ApiError> {
    // Post-processing may have changed the container after the path was reported.
    let path = artifact.path.with_extension(format.extension());

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => {
            return Err(ApiError::artifact_missing(format!(
                "Failed to generate {} file",
                format.extension().to_uppercase()
            )));
        }
        Err(error) if error.kind() == ErrorKind::NotFound => {
            return Err(ApiError::artifact_missing(format!(
                "Failed to generate {} file",
                format.extension().to_uppercase()
            )));
        }
        Err(error) => {
            return Err(ApiError::internal(format!(
                "Could not inspect the downloaded file: {error}"
            )));
        }
    };

    if metadata.len() > max_bytes {
        remove_artifact(&path).await;
        return Err(ApiError::payload_too_large(max_bytes));
    }

    let read = tokio::fs::read(&path).await;
    remove_artifact(&path).await;
    let bytes = read.map_err(|error| {
        ApiError::internal(format!("Could not read the downloaded file: {error}"))
    })?;

    let stem = sanitize_title(&artifact.title)
        .unwrap_or_else(|| format!("download_{}", &request_id.simple().to_string()[..8]));

    Ok(MaterializedFile {
        bytes: Bytes::from(bytes),
        filename: format!("{stem}.{}", format.extension()),
        mime_type: format.mime_type(),
    })
}

async fn remove_artifact(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await
        && error.kind() != ErrorKind::NotFound
    {
        warn!("Could not delete downloaded file {:?}: {error}", path);
    }
}

/// Collapses every run of non-word characters to one `_`, caps the length
/// and trims `_` from both ends. `None` when nothing usable remains.
pub fn sanitize_title(title: &str) -> Option<String> {
    let mut collapsed = String::with_capacity(title.len());
    let mut in_separator = false;

    for character in title.chars() {
        if character.is_alphanumeric() || character == '_' {
            collapsed.push(character);
            in_separator = false;
        } else if !in_separator {
            collapsed.push('_');
            in_separator = true;
        }
    }

    let capped = collapsed.chars().take(MAX_FILENAME_CHARS).collect::<String>();
    let trimmed = capped.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `filename*` is only added when the name cannot be sent as plain ASCII.
pub fn content_disposition(filename: &str) -> String {
    if filename.is_ascii() {
        return format!("attachment; filename=\"{filename}\"");
    }

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_fallback(filename),
        urlencoding::encode(filename)
    )
}

pub fn ascii_fallback(filename: &str) -> String {
    filename
        .chars()
        .map(|character| if character.is_ascii() { character } else { '_' })
        .collect()
}
