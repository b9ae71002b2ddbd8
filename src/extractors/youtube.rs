use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::progress::{self, ProgressLine};
use super::{MediaExtractor, MediaKind, StreamDescriptor, VideoMetadata};
use crate::download::ProgressReporter;
use crate::utils;
use crate::{DownloaderError, Result};

/// Subset of yt-dlp's `--dump-json` output that tubegrab needs
#[derive(Debug, Deserialize)]
struct RawVideoInfo {
    id: String,
    title: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    view_count: Option<u64>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: String,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    fps: Option<f64>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    abr: Option<f64>,
    #[serde(default)]
    tbr: Option<f64>,
    #[serde(default)]
    filesize: Option<u64>,
    #[serde(default)]
    filesize_approx: Option<u64>,
}

impl RawFormat {
    fn into_descriptor(self) -> Option<StreamDescriptor> {
        let present = |codec: &Option<String>| codec.as_deref().is_some_and(|c| c != "none");
        let kind = match (present(&self.vcodec), present(&self.acodec)) {
            (true, true) => MediaKind::Progressive,
            (true, false) => MediaKind::VideoOnly,
            (false, true) => MediaKind::AudioOnly,
            // storyboards and other non-media entries
            (false, false) => return None,
        };

        Some(StreamDescriptor {
            format_id: self.format_id,
            kind,
            height: self.height,
            fps: self.fps,
            abr: self.abr,
            tbr: self.tbr,
            ext: self.ext.unwrap_or_else(|| "mp4".to_string()),
            vcodec: self.vcodec.filter(|c| c != "none"),
            acodec: self.acodec.filter(|c| c != "none"),
            filesize: self.filesize.or(self.filesize_approx),
        })
    }
}

impl RawVideoInfo {
    fn into_metadata(self, url: &str) -> VideoMetadata {
        VideoMetadata {
            id: self.id,
            title: self.title,
            channel: self.channel.or(self.uploader).unwrap_or_else(|| "Unknown".to_string()),
            duration: self.duration,
            view_count: self.view_count,
            streams: self.formats.into_iter().filter_map(RawFormat::into_descriptor).collect(),
            url: url.to_string(),
        }
    }
}

/// YouTube extractor backed by the yt-dlp binary
pub struct YtDlpExtractor {
    yt_dlp_path: String,
}

impl YtDlpExtractor {
    pub fn new(yt_dlp_path: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
        }
    }

    fn spawn_error(&self, error: std::io::Error) -> anyhow::Error {
        if error.kind() == std::io::ErrorKind::NotFound {
            DownloaderError::ToolMissing(self.yt_dlp_path.clone()).into()
        } else {
            anyhow::Error::new(error).context(format!("Failed to run {}", self.yt_dlp_path))
        }
    }
}

impl Default for YtDlpExtractor {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

/// Map yt-dlp's stderr to the error a user should see
pub fn classify_failure(stderr: &str) -> DownloaderError {
    let message = stderr
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix("ERROR:").map(str::trim))
        .unwrap_or_else(|| stderr.trim())
        .to_string();
    let lower = message.to_lowercase();

    if lower.contains("video unavailable") || lower.contains("private video") || lower.contains("has been removed") {
        DownloaderError::VideoUnavailable(message)
    } else if lower.contains("confirm your age")
        || lower.contains("not available in your country")
        || lower.contains("members-only")
    {
        DownloaderError::Restricted(message)
    } else if lower.contains("is not a valid url") || lower.contains("unsupported url") || lower.contains("incomplete youtube id") {
        DownloaderError::InvalidUrl(message)
    } else {
        DownloaderError::Extractor(message)
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata> {
        let url = utils::validate_youtube_url(url)?;
        tracing::debug!("Extracting video info for: {}", url);

        let output = Command::new(&self.yt_dlp_path)
            .args(["--dump-json", "--skip-download", "--no-playlist", url.as_str()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!("yt-dlp exited with {:?}: {}", output.status.code(), stderr);
            return Err(classify_failure(&stderr).into());
        }

        let info: RawVideoInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| DownloaderError::Extractor(format!("unreadable metadata: {}", e)))?;
        let metadata = info.into_metadata(&url);

        tracing::info!(
            "Fetched \"{}\" with {} streams",
            metadata.title,
            metadata.streams.len()
        );

        if metadata.streams.is_empty() {
            return Err(DownloaderError::NoFormats.into());
        }

        Ok(metadata)
    }

    async fn download(
        &self,
        url: &str,
        stream: &StreamDescriptor,
        destination: &Path,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let destination_arg = output_template(destination);
        let args = [
            "-f",
            stream.format_id.as_str(),
            "-o",
            destination_arg.as_str(),
            "--no-playlist",
            "--force-overwrites",
            "--newline",
            "--progress-template",
            progress::PROGRESS_TEMPLATE,
            url,
        ];
        tracing::debug!(binary = %self.yt_dlp_path, ?args, "spawning yt-dlp");

        let mut child = Command::new(&self.yt_dlp_path)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("yt-dlp stderr not captured"))?;
        let stderr_task = tokio::spawn(async move {
            let mut collected = String::new();
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                tracing::trace!(line = %line, "yt-dlp stderr");
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("yt-dlp stdout not captured"))?;
        let mut lines = BufReader::new(stdout).lines();

        let read_progress = async {
            let mut last_error = None;
            while let Some(line) = lines.next_line().await? {
                match progress::parse_line(&line) {
                    Some(ProgressLine::Bytes { downloaded, total }) => {
                        if let Some(total) = total {
                            reporter.set_total(total);
                        }
                        reporter.update(downloaded);
                    }
                    Some(ProgressLine::Destination(path)) => tracing::debug!("yt-dlp writing to {}", path),
                    Some(ProgressLine::Warning(message)) => tracing::warn!("yt-dlp: {}", message),
                    Some(ProgressLine::Error(message)) => last_error = Some(message),
                    None => tracing::trace!(line = %line, "yt-dlp stdout"),
                }
            }
            Ok::<_, std::io::Error>(last_error)
        };

        let outcome = tokio::select! {
            result = read_progress => Some(result),
            _ = cancel.cancelled() => None,
        };

        let Some(stdout_result) = outcome else {
            tracing::info!("Cancelling download of format {}", stream.format_id);
            let _ = child.kill().await;
            stderr_task.abort();
            utils::remove_if_exists(destination);
            utils::remove_if_exists(&part_path(destination));
            return Err(DownloaderError::Cancelled.into());
        };
        let last_error = stdout_result?;

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            utils::remove_if_exists(&part_path(destination));
            let failure = match last_error {
                Some(message) => classify_failure(&format!("ERROR: {}", message)),
                None => classify_failure(&stderr),
            };
            return Err(anyhow::Error::new(failure)
                .context(format!("yt-dlp exited with code {}", status.code().unwrap_or(-1))));
        }

        if !destination.exists() {
            anyhow::bail!("yt-dlp reported success but {} is missing", destination.display());
        }

        Ok(())
    }

    async fn check_available(&self) -> Result<String> {
        let output = Command::new(&self.yt_dlp_path)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(DownloaderError::ToolMissing(self.yt_dlp_path.clone()).into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn platform_name(&self) -> &'static str {
        "YouTube"
    }
}

/// `-o` is an output template; `%` is doubled so titles are written literally
fn output_template(destination: &Path) -> String {
    destination.to_string_lossy().replace('%', "%%")
}

/// yt-dlp writes to `<destination>.part` until the download completes
fn part_path(destination: &Path) -> std::path::PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(".part");
    name.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": "abc123",
        "title": "Sample Video",
        "uploader": "Sample Channel",
        "duration": 212.0,
        "view_count": 1500000,
        "formats": [
            {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none"},
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5, "filesize": 3400000},
            {"format_id": "18", "ext": "mp4", "height": 360, "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "filesize_approx": 9000000},
            {"format_id": "137", "ext": "mp4", "height": 1080, "vcodec": "avc1.640028", "acodec": "none", "tbr": 4400.0}
        ]
    }"#;

    #[test]
    fn test_metadata_conversion_skips_storyboards() {
        let info: RawVideoInfo = serde_json::from_str(SAMPLE).unwrap();
        let metadata = info.into_metadata("https://youtu.be/abc123");

        assert_eq!(metadata.channel, "Sample Channel");
        assert_eq!(metadata.streams.len(), 3);
        assert!(metadata.streams.iter().all(|s| s.format_id != "sb0"));

        let audio = &metadata.streams[0];
        assert_eq!(audio.kind, MediaKind::AudioOnly);
        assert_eq!(audio.bitrate_kbps(), 130);
        assert!(audio.vcodec.is_none());

        let progressive = &metadata.streams[1];
        assert!(progressive.is_progressive());
        assert_eq!(progressive.filesize, Some(9000000));
        assert_eq!(progressive.resolution().as_deref(), Some("360p"));

        assert_eq!(metadata.streams[2].kind, MediaKind::VideoOnly);
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("ERROR: [youtube] abc: Video unavailable"),
            DownloaderError::VideoUnavailable(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: [youtube] abc: Sign in to confirm your age"),
            DownloaderError::Restricted(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: 'nope' is not a valid URL"),
            DownloaderError::InvalidUrl(_)
        ));
        match classify_failure("WARNING: x\nERROR: Unable to download webpage: timed out") {
            DownloaderError::Extractor(message) => assert_eq!(message, "Unable to download webpage: timed out"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_part_path() {
        assert_eq!(part_path(Path::new("/tmp/a.mp4")), Path::new("/tmp/a.mp4.part"));
    }

    #[test]
    fn test_output_template_escapes_percent() {
        assert_eq!(output_template(Path::new("/tmp/100%(id)s_360p.mp4")), "/tmp/100%%(id)s_360p.mp4");
        assert_eq!(output_template(Path::new("/tmp/plain_audio.m4a")), "/tmp/plain_audio.m4a");
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_youtube_url_without_spawning() {
        let extractor = YtDlpExtractor::new("/nonexistent/yt-dlp");
        let err = extractor.fetch_metadata("https://example.com/video").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DownloaderError>(), Some(DownloaderError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let extractor = YtDlpExtractor::new("/nonexistent/yt-dlp");
        let err = extractor.check_available().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DownloaderError>(), Some(DownloaderError::ToolMissing(_))));
    }
}
