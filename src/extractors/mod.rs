use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod progress;
pub mod youtube;

use crate::download::ProgressReporter;
use crate::Result;

pub use youtube::YtDlpExtractor;

/// Metadata about a single video, as reported by the extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Platform identifier of the video
    pub id: String,

    /// Video title
    pub title: String,

    /// Channel or uploader name
    pub channel: String,

    /// Duration in seconds if available
    pub duration: Option<f64>,

    /// View count if available
    pub view_count: Option<u64>,

    /// Every downloadable variant
    pub streams: Vec<StreamDescriptor>,

    /// The URL that was looked up
    pub url: String,
}

/// What a stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    /// Video and audio muxed together
    Progressive,
    /// Video track only, needs a companion audio stream
    VideoOnly,
    /// Audio track only
    AudioOnly,
}

/// One downloadable variant of a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Extractor format selector (`-f` value for yt-dlp)
    pub format_id: String,

    pub kind: MediaKind,

    /// Frame height in pixels for video streams
    pub height: Option<u32>,

    /// Frame rate of video streams
    pub fps: Option<f64>,

    /// Audio bitrate in kbps
    pub abr: Option<f64>,

    /// Total bitrate in kbps
    pub tbr: Option<f64>,

    /// Container extension (mp4, webm, m4a...)
    pub ext: String,

    pub vcodec: Option<String>,

    pub acodec: Option<String>,

    /// Size in bytes, exact or estimated
    pub filesize: Option<u64>,
}

impl StreamDescriptor {
    pub fn has_video(&self) -> bool {
        matches!(self.kind, MediaKind::Progressive | MediaKind::VideoOnly)
    }

    pub fn is_progressive(&self) -> bool {
        self.kind == MediaKind::Progressive
    }

    /// Resolution label such as `1080p`
    pub fn resolution(&self) -> Option<String> {
        self.height.map(|h| format!("{}p", h))
    }

    /// Audio bitrate rounded to whole kbps, 128 when unknown
    pub fn bitrate_kbps(&self) -> u32 {
        self.abr.map(|abr| abr.round() as u32).filter(|kbps| *kbps > 0).unwrap_or(128)
    }

    /// Codec of the track that defines this stream
    pub fn primary_codec(&self) -> &str {
        let codec = if self.has_video() { &self.vcodec } else { &self.acodec };
        codec.as_deref().unwrap_or("unknown")
    }
}

/// Trait for fetching metadata and streams from a video platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Look up a video and its available streams
    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata>;

    /// Download a single stream to `destination`, reporting byte progress
    async fn download(
        &self,
        url: &str,
        stream: &StreamDescriptor,
        destination: &Path,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Version string of the backing tool, if it can be run
    async fn check_available(&self) -> Result<String>;

    /// Get the name of this platform
    fn platform_name(&self) -> &'static str;
}
