use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// A per-request directory inside the downloads folder, named by a fresh UUID.
///
/// Removed by [`ScratchJob::cleanup`]; if the request future is dropped first
/// (client disconnect) the directory is removed on drop instead.
#[derive(Debug)]
pub struct ScratchJob {
    id: Uuid,
    dir: PathBuf,
    removed: bool,
}

impl ScratchJob {
    pub async fn create(downloads_dir: &Path) -> Result<Self, ApiError> {
        let id = Uuid::new_v4();
        let dir = downloads_dir.join(id.to_string());
        tokio::fs::create_dir_all(&dir).await.map_err(|error| {
            ApiError::internal(format!("Could not prepare the download directory: {error}"))
        })?;

        Ok(Self {
            id,
            dir,
            removed: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn cleanup(mut self) {
        self.removed = true;
        if let Err(error) = tokio::fs::remove_dir_all(&self.dir).await
            && error.kind() != ErrorKind::NotFound
        {
            warn!("Could not remove download directory {:?}: {error}", self.dir);
        }
    }
}

impl Drop for ScratchJob {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(error) = std::fs::remove_dir_all(&self.dir)
            && error.kind() != ErrorKind::NotFound
        {
            warn!("Could not remove abandoned download directory {:?}: {error}", self.dir);
        }
    }
}

/// Removes leftovers of requests that never finished (crash, kill -9).
pub async fn cleanup_stale_jobs(downloads_dir: &Path, older_than: Duration) {
    let mut entries = match tokio::fs::read_dir(downloads_dir).await {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                warn!("Could not open downloads directory for cleanup: {error}");
            }
            return;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0usize;

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(error) => {
                warn!("Could not iterate downloads directory for cleanup: {error}");
                break;
            }
        };

        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!("Could not read metadata of {:?}: {error}", path);
                continue;
            }
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified_at| now.duration_since(modified_at).ok())
            .unwrap_or_default();
        if age < older_than {
            continue;
        }

        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };

        match result {
            Ok(()) => removed += 1,
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!("Could not remove stale download {:?}: {error}", path),
        }
    }

    if removed > 0 {
        info!("Removed {removed} stale download(s) from {:?}", downloads_dir);
    }
}
