//! tubegrab - A Rust CLI for downloading YouTube videos and audio
//!
//! This library fetches video metadata through yt-dlp, organises the available
//! streams into a numbered catalog, downloads the selected entry and, when
//! needed, merges or converts the result with ffmpeg.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod download;
pub mod extractors;
pub mod output;
pub mod prompt;
pub mod transcode;
pub mod tui;
pub mod utils;

pub use catalog::{AudioTarget, Catalog, CatalogOptions, FormatOption};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use download::{DownloadPipeline, DownloadedFile, ProgressReporter, Stage};
pub use extractors::{MediaExtractor, StreamDescriptor, VideoMetadata};
pub use transcode::Transcoder;

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the downloader
#[derive(thiserror::Error, Debug)]
pub enum DownloaderError {
    #[error("Invalid YouTube URL: {0}")]
    InvalidUrl(String),

    #[error("Video unavailable: {0}")]
    VideoUnavailable(String),

    #[error("Video is restricted: {0}")]
    Restricted(String),

    #[error("Extractor failed: {0}")]
    Extractor(String),

    #[error("No downloadable formats found")]
    NoFormats,

    #[error("Selection {choice} is out of range (1-{max})")]
    SelectionOutOfRange { choice: usize, max: usize },

    #[error("Input closed before a format was chosen")]
    InputClosed,

    #[error("{0} not found; make sure it is installed and on PATH")]
    ToolMissing(String),

    #[error("Transcoding failed: {0}")]
    Transcode(String),

    #[error("Download cancelled")]
    Cancelled,
}

impl DownloaderError {
    /// Whether an error chain ends in a user-initiated cancellation
    pub fn is_cancelled(error: &anyhow::Error) -> bool {
        error
            .chain()
            .any(|cause| matches!(cause.downcast_ref::<DownloaderError>(), Some(DownloaderError::Cancelled)))
    }
}
