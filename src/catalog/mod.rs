//! Organising an extractor's stream list into the numbered catalog a user
//! picks from.
//!
//! Ordinals shown to the user are 1-based and contiguous: entry `i` of
//! [`Catalog::entries`] is printed as `i + 1`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::extractors::{MediaKind, StreamDescriptor, VideoMetadata};
use crate::DownloaderError;

/// Resolution that keeps a second, smaller variant in the catalog
const DUAL_VARIANT_HEIGHT: u32 = 1080;

/// Audio formats the transcoder can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioTarget {
    Mp3,
    Aac,
}

impl AudioTarget {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioTarget::Mp3 => "mp3",
            AudioTarget::Aac => "aac",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AudioTarget::Mp3 => "MP3",
            AudioTarget::Aac => "AAC",
        }
    }
}

impl std::fmt::Display for AudioTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// One selectable entry of the catalog
#[derive(Debug, Clone, PartialEq)]
pub enum FormatOption {
    /// A video stream; adaptive streams carry the audio they get merged with
    Video {
        stream: StreamDescriptor,
        label: String,
        companion_audio: Option<StreamDescriptor>,
    },
    /// An audio container downloaded as-is
    Audio { stream: StreamDescriptor },
    /// An audio stream converted by the transcoder after download
    Transcode {
        source: StreamDescriptor,
        target: AudioTarget,
    },
}

impl FormatOption {
    pub fn is_video(&self) -> bool {
        matches!(self, FormatOption::Video { .. })
    }

    /// Text for the "Type" column
    pub fn kind_label(&self) -> &'static str {
        if self.is_video() {
            "Video"
        } else {
            "Audio only"
        }
    }

    /// Resolution for video, bitrate for audio
    pub fn quality(&self) -> String {
        match self {
            FormatOption::Video { label, .. } => label.clone(),
            FormatOption::Audio { stream } => format!("{}kbps", stream.bitrate_kbps()),
            FormatOption::Transcode { source, .. } => format!("{}kbps", source.bitrate_kbps()),
        }
    }

    /// Extension of the file the user ends up with
    pub fn output_extension(&self) -> &str {
        match self {
            FormatOption::Video { stream, .. } | FormatOption::Audio { stream } => &stream.ext,
            FormatOption::Transcode { target, .. } => target.extension(),
        }
    }

    pub fn codec(&self) -> String {
        match self {
            FormatOption::Video { stream, .. } | FormatOption::Audio { stream } => {
                stream.primary_codec().to_string()
            }
            FormatOption::Transcode { target, .. } => target.extension().to_string(),
        }
    }

    /// Approximate number of bytes that will be downloaded
    pub fn estimated_size(&self) -> Option<u64> {
        match self {
            FormatOption::Video { stream, companion_audio, .. } => match companion_audio {
                Some(audio) => Some(stream.filesize? + audio.filesize?),
                None => stream.filesize,
            },
            FormatOption::Audio { stream } => stream.filesize,
            FormatOption::Transcode { source, .. } => source.filesize,
        }
    }
}

/// Which entries a front-end wants to offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogOptions {
    /// List WebM video streams next to MP4 ones
    pub include_webm: bool,

    /// List audio containers for direct download
    pub include_raw_audio: bool,

    /// Offer MP3/AAC for every bitrate tier instead of just the best
    pub all_transcode_tiers: bool,
}

impl CatalogOptions {
    /// The console layout; verbose mode shows everything
    pub fn console(verbose: bool) -> Self {
        Self {
            include_webm: verbose,
            include_raw_audio: verbose,
            all_transcode_tiers: verbose,
        }
    }

    pub fn interactive() -> Self {
        Self {
            include_webm: false,
            include_raw_audio: false,
            all_transcode_tiers: true,
        }
    }
}

/// The numbered list of format options for one video
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<FormatOption>,
}

impl Catalog {
    /// Organise the streams of `metadata` according to `options`
    pub fn build(metadata: &VideoMetadata, options: CatalogOptions) -> Result<Self, DownloaderError> {
        let audio_tiers = audio_tiers(&metadata.streams);
        let best_audio = best_audio(&metadata.streams);

        let mut entries = video_entries(&metadata.streams, options, best_audio);

        if options.include_raw_audio {
            entries.extend(audio_tiers.iter().map(|stream| FormatOption::Audio { stream: stream.clone() }));
        }

        let tiers = if options.all_transcode_tiers {
            &audio_tiers[..]
        } else {
            &audio_tiers[..audio_tiers.len().min(1)]
        };
        for source in tiers {
            for target in [AudioTarget::Mp3, AudioTarget::Aac] {
                entries.push(FormatOption::Transcode {
                    source: source.clone(),
                    target,
                });
            }
        }

        if entries.is_empty() {
            return Err(DownloaderError::NoFormats);
        }

        tracing::debug!("Catalog built with {} entries", entries.len());
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[FormatOption] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries paired with their 1-based ordinal
    pub fn numbered(&self) -> impl Iterator<Item = (usize, &FormatOption)> {
        self.entries.iter().enumerate().map(|(i, option)| (i + 1, option))
    }

    /// Map a printed ordinal back to its entry
    pub fn select(&self, ordinal: usize) -> Result<&FormatOption, DownloaderError> {
        ordinal
            .checked_sub(1)
            .and_then(|index| self.entries.get(index))
            .ok_or(DownloaderError::SelectionOutOfRange {
                choice: ordinal,
                max: self.entries.len(),
            })
    }
}

fn compare_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    a.unwrap_or(0.0).partial_cmp(&b.unwrap_or(0.0)).unwrap_or(Ordering::Equal)
}

/// Higher bitrate first, larger file breaking ties
fn video_rank(a: &StreamDescriptor, b: &StreamDescriptor) -> Ordering {
    compare_f64(a.tbr, b.tbr).then_with(|| a.filesize.unwrap_or(0).cmp(&b.filesize.unwrap_or(0)))
}

fn best_audio(streams: &[StreamDescriptor]) -> Option<&StreamDescriptor> {
    streams
        .iter()
        .filter(|s| s.kind == MediaKind::AudioOnly)
        .max_by(|a, b| compare_f64(a.abr, b.abr).then_with(|| a.filesize.cmp(&b.filesize)))
}

fn video_entries(
    streams: &[StreamDescriptor],
    options: CatalogOptions,
    best_audio: Option<&StreamDescriptor>,
) -> Vec<FormatOption> {
    let mut by_height: BTreeMap<u32, Vec<&StreamDescriptor>> = BTreeMap::new();
    for stream in streams.iter().filter(|s| s.has_video()) {
        if !options.include_webm && stream.ext == "webm" {
            continue;
        }
        if let Some(height) = stream.height {
            by_height.entry(height).or_default().push(stream);
        }
    }

    let companion = |stream: &StreamDescriptor| {
        if stream.is_progressive() {
            None
        } else {
            best_audio.cloned()
        }
    };

    let mut entries = Vec::new();
    for (height, group) in by_height.into_iter().rev() {
        let Some(best) = group.iter().copied().max_by(|a, b| video_rank(a, b)) else {
            continue;
        };

        let smaller = if height == DUAL_VARIANT_HEIGHT {
            group
                .iter()
                .copied()
                .filter(|s| s.format_id != best.format_id)
                .filter(|s| matches!((s.filesize, best.filesize), (Some(a), Some(b)) if a < b))
                .min_by_key(|s| s.filesize)
        } else {
            None
        };

        let label = format!("{}p", height);
        match smaller {
            Some(alternative) => {
                entries.push(FormatOption::Video {
                    stream: best.clone(),
                    label: format!("{}+", label),
                    companion_audio: companion(best),
                });
                entries.push(FormatOption::Video {
                    stream: alternative.clone(),
                    label,
                    companion_audio: companion(alternative),
                });
            }
            None => entries.push(FormatOption::Video {
                stream: best.clone(),
                label,
                companion_audio: companion(best),
            }),
        }
    }

    entries
}

/// One audio stream per whole-kbps tier, smallest file wins, best tier first
fn audio_tiers(streams: &[StreamDescriptor]) -> Vec<StreamDescriptor> {
    let mut tiers: BTreeMap<u32, &StreamDescriptor> = BTreeMap::new();
    for stream in streams.iter().filter(|s| s.kind == MediaKind::AudioOnly) {
        let kbps = stream.bitrate_kbps();
        let replace = match tiers.get(&kbps) {
            Some(current) => stream.filesize.unwrap_or(u64::MAX) < current.filesize.unwrap_or(u64::MAX),
            None => true,
        };
        if replace {
            tiers.insert(kbps, stream);
        }
    }

    tiers.into_values().rev().cloned().collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn stream(id: &str, kind: MediaKind, ext: &str) -> StreamDescriptor {
        StreamDescriptor {
            format_id: id.to_string(),
            kind,
            height: None,
            fps: None,
            abr: None,
            tbr: None,
            ext: ext.to_string(),
            vcodec: None,
            acodec: None,
            filesize: None,
        }
    }

    pub(crate) fn video(id: &str, height: u32, ext: &str, tbr: f64, size: u64, kind: MediaKind) -> StreamDescriptor {
        StreamDescriptor {
            height: Some(height),
            tbr: Some(tbr),
            filesize: Some(size),
            vcodec: Some(if ext == "webm" { "vp9" } else { "avc1.640028" }.to_string()),
            acodec: (kind == MediaKind::Progressive).then(|| "mp4a.40.2".to_string()),
            ..stream(id, kind, ext)
        }
    }

    pub(crate) fn audio(id: &str, abr: f64, ext: &str, size: u64) -> StreamDescriptor {
        StreamDescriptor {
            abr: Some(abr),
            filesize: Some(size),
            acodec: Some(if ext == "webm" { "opus" } else { "mp4a.40.2" }.to_string()),
            ..stream(id, MediaKind::AudioOnly, ext)
        }
    }

    pub(crate) fn sample_metadata() -> VideoMetadata {
        VideoMetadata {
            id: "abc123".to_string(),
            title: "Sample: Video?".to_string(),
            channel: "Sample Channel".to_string(),
            duration: Some(212.0),
            view_count: Some(1_234_567),
            url: "https://www.youtube.com/watch?v=abc123".to_string(),
            streams: vec![
                video("18", 360, "mp4", 500.0, 9_000_000, MediaKind::Progressive),
                video("134", 360, "mp4", 300.0, 5_000_000, MediaKind::VideoOnly),
                video("136", 720, "mp4", 2500.0, 40_000_000, MediaKind::VideoOnly),
                video("247", 720, "webm", 2600.0, 38_000_000, MediaKind::VideoOnly),
                video("137", 1080, "mp4", 4400.0, 80_000_000, MediaKind::VideoOnly),
                video("399", 1080, "mp4", 2100.0, 45_000_000, MediaKind::VideoOnly),
                audio("139", 48.8, "m4a", 1_200_000),
                audio("140", 129.5, "m4a", 3_400_000),
                audio("251", 130.2, "webm", 3_100_000),
            ],
        }
    }

    #[test]
    fn test_console_catalog_layout() {
        let catalog = Catalog::build(&sample_metadata(), CatalogOptions::console(false)).unwrap();
        let qualities: Vec<String> = catalog.entries().iter().map(|o| o.quality()).collect();

        assert_eq!(qualities, vec!["1080p+", "1080p", "720p", "360p", "130kbps", "130kbps"]);
        assert!(catalog.entries().iter().all(|o| o.output_extension() != "webm"));
        assert_eq!(catalog.entries()[4].output_extension(), "mp3");
        assert_eq!(catalog.entries()[5].output_extension(), "aac");
    }

    #[test]
    fn test_ordinals_are_contiguous_from_one() {
        for options in [CatalogOptions::console(false), CatalogOptions::console(true), CatalogOptions::interactive()] {
            let catalog = Catalog::build(&sample_metadata(), options).unwrap();
            let ordinals: Vec<usize> = catalog.numbered().map(|(n, _)| n).collect();
            assert_eq!(ordinals, (1..=catalog.len()).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_verbose_catalog_lists_raw_audio_before_transcodes() {
        let catalog = Catalog::build(&sample_metadata(), CatalogOptions::console(true)).unwrap();
        let entries = catalog.entries();

        // 720p webm outranks the mp4 once webm is allowed
        assert!(entries.iter().any(|o| o.is_video() && o.output_extension() == "webm"));

        let first_raw = entries.iter().position(|o| matches!(o, FormatOption::Audio { .. })).unwrap();
        let first_transcode = entries.iter().position(|o| matches!(o, FormatOption::Transcode { .. })).unwrap();
        assert!(first_raw < first_transcode);

        // two tiers (130 and 49 kbps), each with MP3 and AAC
        let transcodes = entries.iter().filter(|o| matches!(o, FormatOption::Transcode { .. })).count();
        assert_eq!(transcodes, 4);
    }

    #[test]
    fn test_audio_tier_keeps_smallest_file() {
        let tiers = audio_tiers(&sample_metadata().streams);
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].format_id, "251");
        assert_eq!(tiers[1].format_id, "139");
    }

    #[test]
    fn test_adaptive_video_carries_best_audio() {
        let catalog = Catalog::build(&sample_metadata(), CatalogOptions::console(false)).unwrap();
        match &catalog.entries()[0] {
            FormatOption::Video { stream, companion_audio, .. } => {
                assert_eq!(stream.format_id, "137");
                assert_eq!(companion_audio.as_ref().map(|a| a.format_id.as_str()), Some("251"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(catalog.entries()[0].estimated_size(), Some(83_100_000));

        match &catalog.entries()[3] {
            FormatOption::Video { stream, companion_audio, .. } => {
                assert_eq!(stream.format_id, "18");
                assert!(companion_audio.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_select_rejects_out_of_range() {
        let catalog = Catalog::build(&sample_metadata(), CatalogOptions::console(false)).unwrap();
        assert!(catalog.select(1).is_ok());
        assert!(catalog.select(catalog.len()).is_ok());
        assert!(matches!(
            catalog.select(0),
            Err(DownloaderError::SelectionOutOfRange { choice: 0, .. })
        ));
        assert!(matches!(
            catalog.select(catalog.len() + 1),
            Err(DownloaderError::SelectionOutOfRange { .. })
        ));
    }

    #[test]
    fn test_empty_stream_list_has_no_formats() {
        let mut metadata = sample_metadata();
        metadata.streams.clear();
        assert!(matches!(
            Catalog::build(&metadata, CatalogOptions::console(false)),
            Err(DownloaderError::NoFormats)
        ));
    }
}
