use std::{io::ErrorKind, path::PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::options::ResolverOptions;

/// The file a resolver reports for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub path: PathBuf,
    pub title: String,
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// The resolver ran and failed; carries its error text.
    Failed(String),
    /// The resolver exited cleanly without reporting a file.
    NoOutput,
}

#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(
        &self,
        url: &str,
        options: &ResolverOptions,
    ) -> Result<ResolvedArtifact, ResolverError>;
}

/// Runs the `yt-dlp` binary as a child process.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    binary: String,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(
        &self,
        url: &str,
        options: &ResolverOptions,
    ) -> Result<ResolvedArtifact, ResolverError> {
        let args = yt_dlp_args(url, options);
        debug!("Running {} {:?}", self.binary, args);

        let output = Command::new(&self.binary)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    ResolverError::Failed(format!(
                        "{} is not installed. Install yt-dlp and restart the server.",
                        self.binary
                    ))
                } else {
                    ResolverError::Failed(format!("Could not run {}: {error}", self.binary))
                }
            })?;

        if !output.status.success() {
            return Err(ResolverError::Failed(failure_message(&output.stderr)));
        }

        parse_printed_artifact(&output.stdout).ok_or(ResolverError::NoOutput)
    }
}

/// One JSON object per finished file, so titles with newlines cannot shift the fields.
const PRINTED_ARTIFACT_TEMPLATE: &str = "after_move:%(.{title,filepath})j";

#[derive(Debug, Deserialize)]
struct PrintedArtifact {
    title: Option<String>,
    filepath: String,
}

pub fn yt_dlp_args(url: &str, options: &ResolverOptions) -> Vec<String> {
    let mut args = vec![
        "--no-warnings".to_string(),
        "--newline".to_string(),
        "--print".to_string(),
        PRINTED_ARTIFACT_TEMPLATE.to_string(),
        "-o".to_string(),
        options.output_template.clone(),
        "-f".to_string(),
        options.format_selector.to_string(),
        "--socket-timeout".to_string(),
        options.socket_timeout.as_secs().to_string(),
        "--source-address".to_string(),
        options.source_address.to_string(),
        "--sleep-requests".to_string(),
        options.sleep_between_requests.as_secs().to_string(),
    ];

    if options.no_playlist {
        args.push("--no-playlist".to_string());
    }

    if let Some(transcode) = &options.transcode {
        args.push("-x".to_string());
        args.push("--audio-format".to_string());
        args.push(transcode.audio_codec.to_string());
        args.push("--audio-quality".to_string());
        args.push(format!("{}K", transcode.quality_kbps));
    }

    if let Some(container) = options.merge_output_format {
        args.push("--merge-output-format".to_string());
        args.push(container.to_string());
    }

    if let Some(cookies) = &options.cookies_path {
        args.push("--cookies".to_string());
        args.push(cookies.to_string_lossy().into_owned());
    }

    if let Some(proxy) = &options.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }

    let mut extractor_args = format!("youtube:player_client={}", options.player_clients.join(","));
    if let Some(token) = &options.po_token {
        extractor_args.push_str(";po_token=");
        extractor_args.push_str(&qualify_po_token(token));
    }
    args.push("--extractor-args".to_string());
    args.push(extractor_args);

    args.push("--".to_string());
    args.push(url.to_string());
    args
}

/// Bare tokens are bound to the web client's video streams.
fn qualify_po_token(token: &str) -> String {
    if token.contains('+') {
        token.to_string()
    } else {
        format!("web.gvs+{token}")
    }
}

fn failure_message(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let errors = text
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("ERROR:"))
        .collect::<Vec<_>>();

    if !errors.is_empty() {
        return errors.join("\n");
    }

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp could not complete the download")
        .to_string()
}

/// Reads the last JSON record yt-dlp printed after moving the file into place.
fn parse_printed_artifact(stdout: &[u8]) -> Option<ResolvedArtifact> {
    let text = String::from_utf8_lossy(stdout);
    let printed = text
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<PrintedArtifact>(line).ok())
        .filter(|printed| !printed.filepath.trim().is_empty())
        .next_back()?;

    let path = PathBuf::from(printed.filepath);
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    Some(ResolvedArtifact {
        path,
        title: printed.title.unwrap_or_default(),
        extension,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        options::{AuthState, ProxyState, build_resolver_options},
        request::TargetFormat,
    };
    use std::path::Path;
    use url::Url;

    fn position(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|arg| arg == flag)
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        position(args, flag).and_then(|index| args.get(index + 1).map(String::as_str))
    }

    #[test]
    fn audio_args_extract_mp3_at_192k() {
        let options = build_resolver_options(
            TargetFormat::Audio,
            Path::new("/tmp/job"),
            &AuthState::Anonymous,
            &ProxyState::Disabled,
            None,
        );
        let args = yt_dlp_args("https://example/video", &options);

        assert!(position(&args, "-x").is_some());
        assert_eq!(value_after(&args, "--audio-format"), Some("mp3"));
        assert_eq!(value_after(&args, "--audio-quality"), Some("192K"));
        assert_eq!(value_after(&args, "-f"), Some("bestaudio/best"));
        assert_eq!(value_after(&args, "--socket-timeout"), Some("30"));
        assert_eq!(
            value_after(&args, "-o"),
            Some("/tmp/job/%(title).140B-%(id)s.%(ext)s")
        );
        assert!(position(&args, "--no-playlist").is_some());
        assert!(position(&args, "--cookies").is_none());
        assert!(position(&args, "--proxy").is_none());
        assert_eq!(
            value_after(&args, "--extractor-args"),
            Some("youtube:player_client=android,web")
        );
        assert_eq!(args.last().map(String::as_str), Some("https://example/video"));
    }

    #[test]
    fn video_args_merge_into_mp4_without_transcode() {
        let options = build_resolver_options(
            TargetFormat::Video,
            Path::new("/tmp/job"),
            &AuthState::Anonymous,
            &ProxyState::Disabled,
            None,
        );
        let args = yt_dlp_args("https://example/video", &options);

        assert!(position(&args, "-x").is_none());
        assert_eq!(value_after(&args, "--merge-output-format"), Some("mp4"));
    }

    #[test]
    fn cookies_proxy_and_token_reach_the_command_line() {
        let proxy = Url::parse("http://10.0.0.5:3128").unwrap();
        let options = build_resolver_options(
            TargetFormat::Audio,
            Path::new("/tmp/job"),
            &AuthState::Cookies("/data/cookies.txt".into()),
            &ProxyState::Reachable(proxy),
            Some("abc"),
        );
        let args = yt_dlp_args("https://example/video", &options);

        assert_eq!(value_after(&args, "--cookies"), Some("/data/cookies.txt"));
        assert_eq!(value_after(&args, "--proxy"), Some("http://10.0.0.5:3128/"));
        assert_eq!(
            value_after(&args, "--extractor-args"),
            Some("youtube:player_client=android,web;po_token=web.gvs+abc")
        );
    }

    #[test]
    fn qualified_po_tokens_pass_through() {
        assert_eq!(qualify_po_token("mweb.gvs+xyz"), "mweb.gvs+xyz");
        assert_eq!(qualify_po_token("xyz"), "web.gvs+xyz");
    }

    #[test]
    fn failure_message_prefers_error_lines() {
        let stderr = b"WARNING: something odd\nERROR: [youtube] x: Sign in to confirm you're not a bot\n";
        assert_eq!(
            failure_message(stderr),
            "ERROR: [youtube] x: Sign in to confirm you're not a bot"
        );
        assert_eq!(failure_message(b"plain failure\n\n"), "plain failure");
        assert_eq!(
            failure_message(b""),
            "yt-dlp could not complete the download"
        );
    }

    #[test]
    fn artifact_is_printed_as_one_json_record() {
        let options = build_resolver_options(
            TargetFormat::Audio,
            Path::new("/tmp/job"),
            &AuthState::Anonymous,
            &ProxyState::Disabled,
            None,
        );
        let args = yt_dlp_args("https://example/video", &options);

        assert_eq!(args.iter().filter(|arg| *arg == "--print").count(), 1);
        assert_eq!(
            value_after(&args, "--print"),
            Some("after_move:%(.{title,filepath})j")
        );
    }

    #[test]
    fn printed_title_and_path_are_parsed() {
        let artifact = parse_printed_artifact(
            br#"{"title": "My Clip! #1", "filepath": "/tmp/job/My Clip! #1-abc.MP3"}
"#,
        )
        .unwrap();
        assert_eq!(artifact.title, "My Clip! #1");
        assert_eq!(artifact.path, PathBuf::from("/tmp/job/My Clip! #1-abc.MP3"));
        assert_eq!(artifact.extension, "mp3");

        assert_eq!(parse_printed_artifact(b"\n  \n"), None);
        assert_eq!(parse_printed_artifact(b"/tmp/job/clip.mp3\n"), None);
        assert_eq!(parse_printed_artifact(br#"{"title": "clip"}"#), None);
    }

    #[test]
    fn multiline_titles_keep_title_and_path_apart() {
        let stdout = br#"[download] Destination: /tmp/job/x.webm
{"title": "Line one\nLine two", "filepath": "/tmp/job/Line one Line two-abc.mp3"}
"#;
        let artifact = parse_printed_artifact(stdout).unwrap();

        assert_eq!(artifact.title, "Line one\nLine two");
        assert_eq!(
            artifact.path,
            PathBuf::from("/tmp/job/Line one Line two-abc.mp3")
        );

        let untitled = parse_printed_artifact(br#"{"filepath": "/tmp/job/clip.mp4"}"#).unwrap();
        assert_eq!(untitled.title, "");
        assert_eq!(untitled.extension, "mp4");
    }

    #[tokio::test]
    async fn missing_binary_is_a_resolver_failure() {
        let resolver = YtDlpResolver::new("clipfetch-test-no-such-binary");
        let options = build_resolver_options(
            TargetFormat::Audio,
            Path::new("/tmp/job"),
            &AuthState::Anonymous,
            &ProxyState::Disabled,
            None,
        );

        let error = resolver
            .resolve("https://example/video", &options)
            .await
            .unwrap_err();
        assert!(matches!(error, ResolverError::Failed(message) if message.contains("not installed")));
    }
}
