use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::catalog::{AudioTarget, FormatOption};
use crate::extractors::{MediaExtractor, StreamDescriptor, VideoMetadata};
use crate::transcode::Transcoder;
use crate::utils;
use crate::DownloaderError;

pub mod reporter;

pub use reporter::{ConsoleProgress, NoProgress};

/// Step of a download a progress reporter is told about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Video,
    Audio,
    Merging,
    Converting,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Video => "📹 Video",
            Stage::Audio => "🎵 Audio",
            Stage::Merging => "🎬 Processing",
            Stage::Converting => "🎵 Converting",
        }
    }

    /// Whether positions are bytes (download) or percent (transcode)
    pub fn counts_bytes(&self) -> bool {
        matches!(self, Stage::Video | Stage::Audio)
    }
}

/// Receives progress from the extractor and the transcoder
pub trait ProgressReporter: Send + Sync {
    /// A new stage starts; `total` is bytes for downloads, 100 for transcodes
    fn begin(&self, stage: Stage, total: Option<u64>);

    /// The total became known or changed
    fn set_total(&self, total: u64);

    fn update(&self, position: u64);

    /// The current stage completed
    fn finish(&self);
}

/// A finished download
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub path: PathBuf,
    /// Size on disk in bytes
    pub size: u64,
}

/// Runs a catalog entry through the extractor and, when needed, the transcoder
#[derive(Clone)]
pub struct DownloadPipeline {
    extractor: Arc<dyn MediaExtractor>,
    transcoder: Arc<dyn Transcoder>,
}

impl DownloadPipeline {
    pub fn new(extractor: Arc<dyn MediaExtractor>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self { extractor, transcoder }
    }

    /// Look up metadata for `url`
    pub async fn fetch(&self, url: &str) -> Result<VideoMetadata> {
        tracing::info!("Fetching {} metadata for {}", self.extractor.platform_name(), url);
        self.extractor.fetch_metadata(url).await
    }

    /// Final path the selected option is written to
    pub fn output_path(metadata: &VideoMetadata, option: &FormatOption, directory: &Path) -> PathBuf {
        let title = utils::clean_filename(&metadata.title);
        let filename = match option {
            FormatOption::Video { stream, label, .. } => {
                let resolution = stream.resolution().unwrap_or_else(|| label.clone());
                format!("{}_{}.{}", title, resolution, stream.ext)
            }
            FormatOption::Audio { stream } => format!("{}_audio.{}", title, stream.ext),
            FormatOption::Transcode { target, .. } => format!("{}_audio.{}", title, target.extension()),
        };
        directory.join(filename)
    }

    /// Download `option` into `directory`.
    ///
    /// Work happens under a temporary name that is renamed over the final path
    /// on success. A failed run leaves any file already at that path untouched.
    pub async fn download(
        &self,
        metadata: &VideoMetadata,
        option: &FormatOption,
        directory: &Path,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Result<DownloadedFile> {
        fs_err::create_dir_all(directory).context("Could not create download directory")?;

        let output = Self::output_path(metadata, option, directory);
        let title = utils::clean_filename(&metadata.title);
        let staging = directory.join(format!(
            "{}_partial_{}.{}",
            title,
            utils::temp_suffix(),
            option.output_extension()
        ));
        tracing::info!("Downloading \"{}\" ({}) to {}", metadata.title, option.quality(), output.display());

        let result = match option {
            FormatOption::Video { stream, companion_audio: Some(audio), .. } => {
                let video_temp = directory.join(format!("{}_video_temp_{}.{}", title, utils::temp_suffix(), stream.ext));
                let audio_temp = directory.join(format!("{}_audio_temp_{}.{}", title, utils::temp_suffix(), audio.ext));

                let result = self
                    .download_adaptive(metadata, stream, audio, &video_temp, &audio_temp, &staging, reporter, cancel)
                    .await;

                utils::remove_if_exists(&video_temp);
                utils::remove_if_exists(&audio_temp);
                result
            }
            FormatOption::Video { stream, companion_audio: None, .. } => {
                if !stream.is_progressive() {
                    tracing::warn!("No audio stream available; {} will be silent", output.display());
                }
                self.fetch_stream(metadata, stream, Stage::Video, &staging, reporter, cancel).await
            }
            FormatOption::Audio { stream } => {
                self.fetch_stream(metadata, stream, Stage::Audio, &staging, reporter, cancel).await
            }
            FormatOption::Transcode { source, target } => {
                let temp = directory.join(format!("{}_temp_{}.{}", title, utils::temp_suffix(), source.ext));

                let result = self
                    .download_transcoded(metadata, source, *target, &temp, &staging, reporter, cancel)
                    .await;

                utils::remove_if_exists(&temp);
                result
            }
        };

        if let Err(e) = result {
            utils::remove_if_exists(&staging);
            return Err(e);
        }

        if !staging.exists() {
            anyhow::bail!("Download finished but {} was not created", output.display());
        }
        fs_err::rename(&staging, &output).context("Could not move download into place")?;
        let size = fs_err::metadata(&output)?.len();

        tracing::info!("Saved {} ({} bytes)", output.display(), size);
        Ok(DownloadedFile { path: output, size })
    }

    async fn fetch_stream(
        &self,
        metadata: &VideoMetadata,
        stream: &StreamDescriptor,
        stage: Stage,
        destination: &Path,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(DownloaderError::Cancelled.into());
        }

        reporter.begin(stage, stream.filesize);
        let result = self
            .extractor
            .download(&metadata.url, stream, destination, reporter.clone(), cancel)
            .await;
        reporter.finish();
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn download_adaptive(
        &self,
        metadata: &VideoMetadata,
        video: &StreamDescriptor,
        audio: &StreamDescriptor,
        video_temp: &Path,
        audio_temp: &Path,
        output: &Path,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Result<()> {
        tracing::debug!("Adaptive download: video {} + audio {}", video.format_id, audio.format_id);

        self.fetch_stream(metadata, video, Stage::Video, video_temp, reporter.clone(), cancel.clone())
            .await?;
        self.fetch_stream(metadata, audio, Stage::Audio, audio_temp, reporter.clone(), cancel.clone())
            .await?;

        if cancel.is_cancelled() {
            return Err(DownloaderError::Cancelled.into());
        }

        reporter.begin(Stage::Merging, Some(100));
        let result = self
            .transcoder
            .merge(video_temp, audio_temp, output, metadata.duration, reporter.clone(), cancel)
            .await;
        reporter.finish();
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn download_transcoded(
        &self,
        metadata: &VideoMetadata,
        source: &StreamDescriptor,
        target: AudioTarget,
        temp: &Path,
        output: &Path,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.fetch_stream(metadata, source, Stage::Audio, temp, reporter.clone(), cancel.clone())
            .await?;

        if cancel.is_cancelled() {
            return Err(DownloaderError::Cancelled.into());
        }

        reporter.begin(Stage::Converting, Some(100));
        let result = self
            .transcoder
            .convert_audio(temp, output, target, metadata.duration, reporter.clone(), cancel)
            .await;
        reporter.finish();
        result
    }
}
