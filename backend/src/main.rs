use std::{sync::Arc, time::Duration};

use clipfetch::{
    ApiError, AppState, Config, YtDlpResolver, build_router, scratch::cleanup_stale_jobs,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

const STALE_DOWNLOAD_JOB: Duration = Duration::from_secs(2 * 60 * 60);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "clipfetch=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let config = Config::from_env()?;

    tokio::fs::create_dir_all(&config.downloads_dir)
        .await
        .map_err(|error| {
            ApiError::internal(format!(
                "Could not create downloads directory {:?}: {error}",
                config.downloads_dir
            ))
        })?;
    cleanup_stale_jobs(&config.downloads_dir, STALE_DOWNLOAD_JOB).await;

    if config.production {
        info!("Production mode: proxy reachability is probed on every download.");
    }
    if tokio::fs::metadata(&config.extension_archive).await.is_err() {
        warn!(
            "Extension package {:?} not found. /api/download-extension will return 404.",
            config.extension_archive
        );
    }

    let addr = config.bind_addr.clone();
    let resolver = Arc::new(YtDlpResolver::new(config.yt_dlp_path.clone()));
    let app = build_router(AppState::new(config, resolver))?;

    let listener = TcpListener::bind(&addr).await.map_err(|error| {
        ApiError::internal(format!("Could not bind {addr}: {error}"))
    })?;

    info!("Server ready at http://{addr}");

    axum::serve(listener, app)
        .await
        .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}
