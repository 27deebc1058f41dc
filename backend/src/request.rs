use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Audio,
    Video,
}

impl TargetFormat {
    /// Only the exact value `mp4` selects video; everything else, unknown values included, is audio.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some("mp4") => Self::Video,
            _ => Self::Audio,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Audio => "mp3",
            Self::Video => "mp4",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Audio => "audio/mpeg",
            Self::Video => "video/mp4",
        }
    }
}

/// Raw parameters as they arrive in a JSON body or a query string.
#[derive(Debug, Default, Deserialize)]
pub struct DownloadParams {
    pub url: Option<String>,
    pub format: Option<String>,
}

/// JSON bodies may carry a `format` of any type; non-strings select audio.
#[derive(Debug, Deserialize)]
struct JsonDownloadParams {
    url: Option<String>,
    #[serde(default)]
    format: Value,
}

impl From<JsonDownloadParams> for DownloadParams {
    fn from(params: JsonDownloadParams) -> Self {
        Self {
            url: params.url,
            format: params.format.as_str().map(ToString::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub format: TargetFormat,
}

impl DownloadRequest {
    pub fn from_params(params: DownloadParams) -> Result<Self, ApiError> {
        let url = params
            .url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::bad_request("URL is required"))?;

        Ok(Self {
            url: url.to_string(),
            format: TargetFormat::from_param(params.format.as_deref()),
        })
    }

    pub fn from_json_body(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ApiError::bad_request("URL is required"));
        }

        let params: JsonDownloadParams = serde_json::from_slice(body)
            .map_err(|error| ApiError::bad_request(format!("Invalid JSON body: {error}")))?;
        Self::from_params(params.into())
    }
}
