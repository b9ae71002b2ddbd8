use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::catalog::AudioTarget;
use crate::config::AudioConfig;
use crate::download::ProgressReporter;
use crate::utils;
use crate::{DownloaderError, Result};

/// Number of ffmpeg diagnostic lines kept for error messages
const STDERR_TAIL: usize = 12;

/// Trait for the external program that merges and converts containers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Mux a video-only and an audio-only file into `output`
    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        duration: Option<f64>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Convert a downloaded audio container into `target`
    async fn convert_audio(
        &self,
        input: &Path,
        output: &Path,
        target: AudioTarget,
        duration: Option<f64>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Result<()>;
}

/// A parsed line of `ffmpeg -progress pipe:1` output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressUpdate {
    Percent(u64),
    End,
}

/// Parse one `key=value` progress line against the total duration in seconds
pub fn parse_progress(line: &str, total_secs: Option<f64>) -> Option<ProgressUpdate> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // out_time_ms is in microseconds as well
        "out_time_us" | "out_time_ms" => {
            let total = total_secs.filter(|t| *t > 0.0)?;
            let micros: f64 = value.trim().parse().ok()?;
            let percent = (micros / 1_000_000.0 / total * 100.0).clamp(0.0, 100.0);
            Some(ProgressUpdate::Percent(percent as u64))
        }
        "progress" if value.trim() == "end" => Some(ProgressUpdate::End),
        _ => None,
    }
}

/// Audio codec that fits the output container
fn merge_audio_codec(output: &Path) -> &'static str {
    match output.extension().and_then(|ext| ext.to_str()) {
        Some("webm") => "libopus",
        _ => "aac",
    }
}

/// ffmpeg transcoder driven as a subprocess
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    audio: AudioConfig,
    verbose: bool,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>, audio: AudioConfig) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            audio,
            verbose: false,
        }
    }

    /// Echo ffmpeg's own diagnostics instead of only reporting percentages
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn merge_args(&self, video: &Path, audio: &Path, output: &Path) -> Vec<String> {
        let mut args = self.common_args();
        args.extend([
            "-i".to_string(),
            video.to_string_lossy().to_string(),
            "-i".to_string(),
            audio.to_string_lossy().to_string(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            merge_audio_codec(output).to_string(),
            output.to_string_lossy().to_string(),
        ]);
        args
    }

    pub fn convert_args(&self, input: &Path, output: &Path, target: AudioTarget) -> Vec<String> {
        let mut args = self.common_args();
        args.extend(["-i".to_string(), input.to_string_lossy().to_string(), "-vn".to_string()]);
        match target {
            AudioTarget::Mp3 => args.extend([
                "-codec:a".to_string(),
                "libmp3lame".to_string(),
                "-q:a".to_string(),
                self.audio.mp3_quality.to_string(),
            ]),
            AudioTarget::Aac => args.extend([
                "-c:a".to_string(),
                "aac".to_string(),
                "-b:a".to_string(),
                self.audio.aac_bitrate.clone(),
            ]),
        }
        args.push(output.to_string_lossy().to_string());
        args
    }

    fn common_args(&self) -> Vec<String> {
        ["-y", "-hide_banner", "-nostats", "-progress", "pipe:1"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Get the container duration using ffprobe
    pub async fn probe_duration(&self, path: &Path) -> Option<f64> {
        let path_arg = path.to_string_lossy().to_string();
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", path_arg.as_str()])
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            tracing::debug!("ffprobe could not read {}", path.display());
            return None;
        }

        let info: serde_json::Value = serde_json::from_slice(&output.stdout).ok()?;
        info["format"]["duration"].as_str().and_then(|d| d.parse::<f64>().ok())
    }

    async fn run(
        &self,
        args: Vec<String>,
        input: &Path,
        output: &Path,
        duration: Option<f64>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let duration = match duration {
            Some(d) if d > 0.0 => Some(d),
            _ => self.probe_duration(input).await,
        };
        tracing::debug!(binary = %self.ffmpeg_path, ?args, ?duration, "spawning ffmpeg");

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    anyhow::Error::from(DownloaderError::ToolMissing(self.ffmpeg_path.clone()))
                } else {
                    anyhow::Error::new(e).context(format!("Failed to run {}", self.ffmpeg_path))
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("ffmpeg stderr not captured"))?;
        let verbose = self.verbose;
        if verbose {
            println!(
                "{}",
                console::style("\n📝 FFmpeg output - you can safely ignore the following technical details:").cyan()
            );
            println!("{}", console::style("=".repeat(80)).cyan());
        }
        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL);
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if verbose {
                    println!("{}", line);
                }
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        });

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("ffmpeg stdout not captured"))?;
        let mut lines = BufReader::new(stdout).lines();

        let read_progress = async {
            while let Some(line) = lines.next_line().await? {
                match parse_progress(&line, duration) {
                    Some(ProgressUpdate::Percent(percent)) => reporter.update(percent),
                    Some(ProgressUpdate::End) => reporter.update(100),
                    None => {}
                }
            }
            Ok::<_, std::io::Error>(())
        };

        let finished = tokio::select! {
            result = read_progress => Some(result),
            _ = cancel.cancelled() => None,
        };

        let Some(read_result) = finished else {
            tracing::info!("Cancelling ffmpeg for {}", output.display());
            let _ = child.kill().await;
            stderr_task.abort();
            utils::remove_if_exists(output);
            return Err(DownloaderError::Cancelled.into());
        };
        read_result?;

        let status = child.wait().await?;
        let stderr_tail = stderr_task.await.unwrap_or_default();
        if verbose {
            println!("{}", console::style("=".repeat(80)).cyan());
        }

        if !status.success() {
            utils::remove_if_exists(output);
            return Err(DownloaderError::Transcode(format!(
                "ffmpeg exited with code {}: {}",
                status.code().unwrap_or(-1),
                stderr_tail.trim()
            ))
            .into());
        }

        reporter.update(100);
        Ok(())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        duration: Option<f64>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Result<()> {
        tracing::info!("Merging {} and {} into {}", video.display(), audio.display(), output.display());
        let args = self.merge_args(video, audio, output);
        self.run(args, video, output, duration, reporter, cancel).await
    }

    async fn convert_audio(
        &self,
        input: &Path,
        output: &Path,
        target: AudioTarget,
        duration: Option<f64>,
        reporter: Arc<dyn ProgressReporter>,
        cancel: CancellationToken,
    ) -> Result<()> {
        tracing::info!("Converting {} to {}", input.display(), target.label());
        let args = self.convert_args(input, output, target);
        self.run(args, input, output, duration, reporter, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::NoProgress;

    fn transcoder() -> FfmpegTranscoder {
        FfmpegTranscoder::new("ffmpeg", "ffprobe", AudioConfig::default())
    }

    #[test]
    fn test_parse_progress() {
        assert_eq!(parse_progress("out_time_us=5000000", Some(10.0)), Some(ProgressUpdate::Percent(50)));
        assert_eq!(parse_progress("out_time_ms=20000000", Some(10.0)), Some(ProgressUpdate::Percent(100)));
        assert_eq!(parse_progress("out_time_us=N/A", Some(10.0)), None);
        assert_eq!(parse_progress("out_time_us=5000000", None), None);
        assert_eq!(parse_progress("progress=end", None), Some(ProgressUpdate::End));
        assert_eq!(parse_progress("progress=continue", None), None);
        assert_eq!(parse_progress("frame=42", Some(10.0)), None);
    }

    #[test]
    fn test_convert_args_mp3() {
        let args = transcoder().convert_args(Path::new("in.m4a"), Path::new("out.mp3"), AudioTarget::Mp3);
        let joined = args.join(" ");
        assert!(joined.starts_with("-y -hide_banner -nostats -progress pipe:1"));
        assert!(joined.contains("-i in.m4a -vn -codec:a libmp3lame -q:a 2"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp3"));
    }

    #[test]
    fn test_convert_args_aac() {
        let args = transcoder().convert_args(Path::new("in.webm"), Path::new("out.aac"), AudioTarget::Aac);
        assert!(args.join(" ").contains("-c:a aac -b:a 192k"));
    }

    #[test]
    fn test_merge_args_pick_codec_for_container() {
        let mp4 = transcoder().merge_args(Path::new("v.mp4"), Path::new("a.webm"), Path::new("out.mp4"));
        assert!(mp4.join(" ").contains("-c:v copy -c:a aac out.mp4"));

        let webm = transcoder().merge_args(Path::new("v.webm"), Path::new("a.webm"), Path::new("out.webm"));
        assert!(webm.join(" ").contains("-c:a libopus"));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.m4a");
        fs_err::write(&input, b"data").unwrap();

        let transcoder = FfmpegTranscoder::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe", AudioConfig::default());
        let err = transcoder
            .convert_audio(
                &input,
                &dir.path().join("out.mp3"),
                AudioTarget::Mp3,
                Some(1.0),
                Arc::new(NoProgress),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<DownloaderError>(), Some(DownloaderError::ToolMissing(_))));
    }
}
