//! HTTP service that downloads media through yt-dlp and returns the file
//! as an mp3 or mp4 attachment.

pub mod classify;
pub mod config;
pub mod cookies;
pub mod error;
pub mod materialize;
pub mod options;
pub mod orchestrator;
pub mod request;
pub mod resolver;
pub mod routes;
pub mod scratch;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ErrorKind};
pub use options::ResolverOptions;
pub use request::{DownloadRequest, TargetFormat};
pub use resolver::{MediaResolver, ResolvedArtifact, ResolverError, YtDlpResolver};
pub use routes::build_router;
pub use state::AppState;
