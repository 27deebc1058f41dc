use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::{net::TcpStream, time::timeout};
use tracing::{info, warn};
use url::Url;

use crate::{
    config::{Config, PROXY_PROBE_TIMEOUT, RESOLVER_SOCKET_TIMEOUT},
    request::TargetFormat,
};

pub const AUDIO_FORMAT_SELECTOR: &str = "bestaudio/best";
pub const VIDEO_FORMAT_SELECTOR: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";
pub const AUDIO_QUALITY_KBPS: u32 = 192;
pub const PLAYER_CLIENTS: &[&str] = &["android", "web"];
/// Title capped in bytes so long or multibyte titles stay under the 255 byte name limit.
pub const OUTPUT_NAME_TEMPLATE: &str = "%(title).140B-%(id)s.%(ext)s";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcode {
    pub audio_codec: &'static str,
    pub quality_kbps: u32,
}

/// Everything the resolver needs for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    pub output_dir: PathBuf,
    pub output_template: String,
    pub format_selector: &'static str,
    pub transcode: Option<Transcode>,
    pub merge_output_format: Option<&'static str>,
    pub proxy: Option<String>,
    pub cookies_path: Option<PathBuf>,
    pub player_clients: &'static [&'static str],
    pub po_token: Option<String>,
    pub socket_timeout: Duration,
    pub source_address: &'static str,
    pub sleep_between_requests: Duration,
    pub no_playlist: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Cookies(PathBuf),
}

impl AuthState {
    /// Checked on every request; the upload endpoint may replace the file at any time.
    pub async fn detect(cookies_path: &Path) -> Self {
        match tokio::fs::metadata(cookies_path).await {
            Ok(metadata) if metadata.is_file() => Self::Cookies(cookies_path.to_path_buf()),
            _ => Self::Anonymous,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyState {
    Disabled,
    Reachable(Url),
    Unreachable(Url),
}

impl ProxyState {
    pub fn address(&self) -> Option<&Url> {
        match self {
            Self::Reachable(url) => Some(url),
            Self::Disabled | Self::Unreachable(_) => None,
        }
    }
}

/// Proxy routing only applies in production mode, and only when the proxy answers.
pub async fn resolve_proxy(config: &Config) -> ProxyState {
    match (&config.proxy_url, config.production) {
        (Some(proxy), true) => probe_proxy(proxy, PROXY_PROBE_TIMEOUT).await,
        _ => ProxyState::Disabled,
    }
}

pub async fn probe_proxy(proxy: &Url, probe_timeout: Duration) -> ProxyState {
    let (Some(host), Some(port)) = (proxy.host_str(), proxy.port_or_known_default()) else {
        warn!("Proxy {} has no host or port. Downloading directly.", redact(proxy));
        return ProxyState::Unreachable(proxy.clone());
    };

    match timeout(probe_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => {
            info!("Proxy {host}:{port} reachable. Routing download through it.");
            ProxyState::Reachable(proxy.clone())
        }
        Ok(Err(error)) => {
            warn!("Proxy {host}:{port} unreachable ({error}). Downloading directly.");
            ProxyState::Unreachable(proxy.clone())
        }
        Err(_) => {
            warn!(
                "Proxy {host}:{port} did not answer within {}s. Downloading directly.",
                probe_timeout.as_secs()
            );
            ProxyState::Unreachable(proxy.clone())
        }
    }
}

fn redact(proxy: &Url) -> String {
    let mut shown = proxy.clone();
    if shown.password().is_some() {
        let _ = shown.set_password(Some("***"));
    }
    shown.to_string()
}

pub fn build_resolver_options(
    format: TargetFormat,
    output_dir: &Path,
    auth: &AuthState,
    proxy: &ProxyState,
    po_token: Option<&str>,
) -> ResolverOptions {
    let (format_selector, transcode, merge_output_format) = match format {
        TargetFormat::Audio => (
            AUDIO_FORMAT_SELECTOR,
            Some(Transcode {
                audio_codec: "mp3",
                quality_kbps: AUDIO_QUALITY_KBPS,
            }),
            None,
        ),
        TargetFormat::Video => (VIDEO_FORMAT_SELECTOR, None, Some("mp4")),
    };

    let cookies_path = match auth {
        AuthState::Cookies(path) => Some(path.clone()),
        AuthState::Anonymous => None,
    };

    ResolverOptions {
        output_dir: output_dir.to_path_buf(),
        output_template: format!("{}/{OUTPUT_NAME_TEMPLATE}", output_dir.to_string_lossy()),
        format_selector,
        transcode,
        merge_output_format,
        proxy: proxy.address().map(ToString::to_string),
        cookies_path,
        player_clients: PLAYER_CLIENTS,
        po_token: po_token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(ToString::to_string),
        socket_timeout: RESOLVER_SOCKET_TIMEOUT,
        source_address: "0.0.0.0",
        sleep_between_requests: Duration::from_secs(1),
        no_playlist: true,
    }
}
