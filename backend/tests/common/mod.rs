#![allow(dead_code)]

use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::Router;
use clipfetch::{
    AppState, Config, MediaResolver, ResolvedArtifact, ResolverError, ResolverOptions,
    build_router,
};

/// Stands in for yt-dlp: writes one file into the request's output directory.
pub struct StubResolver {
    title: String,
    extension: Option<String>,
    failure: Option<String>,
    delay: Duration,
    pub calls: Mutex<Vec<(String, ResolverOptions)>>,
}

impl StubResolver {
    pub fn succeeding(title: &str) -> Self {
        Self {
            title: title.to_string(),
            extension: None,
            failure: None,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::succeeding("unused")
        }
    }

    /// Writes the file with this extension instead of the one the options imply.
    pub fn writing_extension(mut self, extension: &str) -> Self {
        self.extension = Some(extension.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaResolver for StubResolver {
    async fn resolve(
        &self,
        url: &str,
        options: &ResolverOptions,
    ) -> Result<ResolvedArtifact, ResolverError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), options.clone()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(message) = &self.failure {
            return Err(ResolverError::Failed(message.clone()));
        }

        let extension = self.extension.clone().unwrap_or_else(|| {
            if options.transcode.is_some() {
                "mp3".to_string()
            } else {
                "mp4".to_string()
            }
        });
        let path = options
            .output_dir
            .join(format!("{}.{extension}", self.title));
        tokio::fs::write(&path, format!("{} payload", self.title))
            .await
            .map_err(|error| ResolverError::Failed(error.to_string()))?;

        Ok(ResolvedArtifact {
            path,
            title: self.title.clone(),
            extension,
        })
    }
}

pub fn test_app(root: &Path, resolver: Arc<StubResolver>) -> (Router, Config) {
    let config = Config::with_data_dir(root);
    let app = build_router(AppState::new(config.clone(), resolver)).unwrap();
    (app, config)
}

pub async fn directory_entries(dir: &Path) -> Vec<String> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names
}
