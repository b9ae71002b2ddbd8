//! Parsing of yt-dlp's line-oriented download output.

/// Marker yt-dlp prints in front of every progress line
pub const PROGRESS_PREFIX: &str = "tubegrab-progress:";

/// Template passed to `--progress-template`. The leading `download:` selects
/// the progress type and is not printed.
pub const PROGRESS_TEMPLATE: &str =
    "download:tubegrab-progress:%(progress.downloaded_bytes)s/%(progress.total_bytes,progress.total_bytes_estimate)s";

/// A parsed line of yt-dlp output
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
    /// Bytes downloaded so far and the total, if known
    Bytes { downloaded: u64, total: Option<u64> },
    /// yt-dlp announced where it is writing
    Destination(String),
    Warning(String),
    Error(String),
}

/// Parse one line of yt-dlp stdout or stderr
pub fn parse_line(line: &str) -> Option<ProgressLine> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix(PROGRESS_PREFIX) {
        let mut parts = rest.splitn(2, '/');
        let downloaded = parse_number(parts.next()?)?;
        let total = parts.next().and_then(parse_number).filter(|total| *total > 0);
        return Some(ProgressLine::Bytes { downloaded, total });
    }

    if let Some(rest) = line.strip_prefix("[download] Destination:") {
        return Some(ProgressLine::Destination(rest.trim().to_string()));
    }

    if let Some(rest) = line.strip_prefix("WARNING:") {
        return Some(ProgressLine::Warning(rest.trim().to_string()));
    }

    if let Some(rest) = line.strip_prefix("ERROR:") {
        return Some(ProgressLine::Error(rest.trim().to_string()));
    }

    None
}

/// yt-dlp prints `NA` for missing fields and floats for estimates
fn parse_number(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() || s == "NA" || s == "None" {
        return None;
    }

    s.parse::<u64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|n| n.is_finite() && *n >= 0.0).map(|n| n as u64))
}
