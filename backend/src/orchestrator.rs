use tracing::{info, warn};

use crate::{
    classify::classify_failure,
    error::ApiError,
    materialize::{MaterializedFile, materialize},
    options::{AuthState, build_resolver_options, resolve_proxy},
    request::DownloadRequest,
    resolver::ResolverError,
    scratch::ScratchJob,
    state::AppState,
};

/// Runs one validated request through the resolver and returns the file in memory.
///
/// Whatever happens, the request's scratch directory is gone when this returns.
pub async fn run_download(
    state: &AppState,
    request: &DownloadRequest,
) -> Result<MaterializedFile, ApiError> {
    let _permit = state
        .download_slots
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ApiError::internal("Could not reserve download capacity."))?;

    let job = ScratchJob::create(&state.config.downloads_dir).await?;
    let auth = AuthState::detect(&state.config.cookies_path).await;
    let proxy = resolve_proxy(&state.config).await;
    let options = build_resolver_options(
        request.format,
        job.dir(),
        &auth,
        &proxy,
        state.config.po_token.as_deref(),
    );

    info!(
        "Download {} started: url={:?} format={} cookies={} proxy={}",
        job.id(),
        request.url,
        request.format.extension(),
        matches!(auth, AuthState::Cookies(_)),
        options.proxy.is_some()
    );

    let result = match state.resolver.resolve(&request.url, &options).await {
        Ok(artifact) => {
            materialize(
                &artifact,
                request.format,
                job.id(),
                state.config.max_download_bytes,
            )
            .await
        }
        Err(ResolverError::Failed(message)) => {
            warn!("Download {} failed: {message}", job.id());
            Err(classify_failure(&message))
        }
        Err(ResolverError::NoOutput) => Err(ApiError::artifact_missing(format!(
            "Failed to generate {} file",
            request.format.extension().to_uppercase()
        ))),
    };

    let job_id = job.id();
    job.cleanup().await;

    if let Ok(file) = &result {
        info!(
            "Download {job_id} ready: {} ({} bytes)",
            file.filename,
            file.bytes.len()
        );
    }

    result
}
