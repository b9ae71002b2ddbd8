use anyhow::Result;
use std::path::Path;
use url::Url;

use crate::DownloaderError;

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
    "www.youtube-nocookie.com",
    "youtube-nocookie.com",
];

/// Validate a YouTube URL and return the normalized version
pub fn validate_youtube_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url.trim())
        .map_err(|_| DownloaderError::InvalidUrl(url.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(DownloaderError::InvalidUrl(format!("{} (URL must use HTTP or HTTPS)", url)).into());
    }

    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    if !YOUTUBE_HOSTS.contains(&host.as_str()) {
        return Err(DownloaderError::InvalidUrl(format!("{} (not a YouTube address)", url)).into());
    }

    Ok(parsed.to_string())
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0.00 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);
    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format an optional size, `N/A` when the extractor did not report one
pub fn format_optional_size(bytes: Option<u64>) -> String {
    bytes.map(format_file_size).unwrap_or_else(|| "N/A".to_string())
}

/// Format duration as `M:SS` or `H:MM:SS`
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0:00".to_string();
    }

    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Format a count with thousands separators
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Strip characters that are illegal in file names on common platforms
pub fn clean_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') && !c.is_control())
        .collect();

    let cleaned = cleaned.trim().trim_end_matches('.').trim();
    if cleaned.is_empty() {
        format!("video_{}", chrono::Local::now().format("%Y%m%d_%H%M%S"))
    } else {
        cleaned.to_string()
    }
}

/// Short random suffix used to keep temporary files from colliding
pub fn temp_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Remove a file if it exists, logging instead of failing
pub fn remove_if_exists(path: &Path) {
    if path.exists() {
        if let Err(e) = fs_err::remove_file(path) {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        } else {
            tracing::debug!("Removed {}", path.display());
        }
    }
}

/// Check that the ffmpeg tools can be run, returning each one's version line
pub async fn check_dependencies(ffmpeg: &str, ffprobe: &str) -> Vec<(String, Option<String>)> {
    let mut report = Vec::new();

    for tool in [ffmpeg, ffprobe] {
        report.push((tool.to_string(), tool_version(tool, "-version").await));
    }

    report
}

/// Run `<command> <flag>` and return the first line of its output
async fn tool_version(command: &str, flag: &str) -> Option<String> {
    use tokio::process::Command;

    let output = Command::new(command).arg(flag).output().await.ok()?;
    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
}

/// Open the platform file manager at `path`
pub async fn open_file_explorer(path: &Path) -> Result<()> {
    use tokio::process::Command;

    let opener = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "explorer"
    } else {
        "xdg-open"
    };

    tracing::debug!("Opening {} with {}", path.display(), opener);
    Command::new(opener).arg(path).status().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0.00 B");
        assert_eq!(format_file_size(512), "512.00 B");
        assert_eq!(format_file_size(1024), "1.00 KB");
        assert_eq!(format_file_size(1536), "1.50 KB");
        assert_eq!(format_file_size(1048576), "1.00 MB");
        assert_eq!(format_optional_size(None), "N/A");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(30.0), "0:30");
        assert_eq!(format_duration(90.0), "1:30");
        assert_eq!(format_duration(3661.0), "1:01:01");
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1234567), "1,234,567");
    }

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("Hello: World?"), "Hello World");
        assert_eq!(clean_filename("a/b\\c|d*e"), "abcde");
        assert_eq!(clean_filename("  spaced  "), "spaced");
        assert!(clean_filename("???").starts_with("video_"));
    }

    #[test]
    fn test_validate_youtube_url() {
        assert!(validate_youtube_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ").is_ok());
        assert!(validate_youtube_url("https://youtu.be/dQw4w9WgXcQ").is_ok());
        assert!(validate_youtube_url("ftp://youtube.com/watch?v=1").is_err());
        assert!(validate_youtube_url("https://example.com/watch?v=1").is_err());
        assert!(validate_youtube_url("not-a-url").is_err());
    }

    #[test]
    fn test_temp_suffix_is_short_and_unique() {
        let a = temp_suffix();
        let b = temp_suffix();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_check_dependencies_reports_missing_tools() {
        let report = check_dependencies("/nonexistent/ffmpeg", "/nonexistent/ffprobe").await;
        assert_eq!(
            report,
            vec![
                ("/nonexistent/ffmpeg".to_string(), None),
                ("/nonexistent/ffprobe".to_string(), None),
            ]
        );
    }
}
