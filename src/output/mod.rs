use std::fmt::Write as _;

use crate::catalog::{Catalog, FormatOption};
use crate::extractors::VideoMetadata;
use crate::utils;

const INFO_RULE_WIDTH: usize = 80;
const TABLE_RULE_WIDTH: usize = 90;
const VERBOSE_TABLE_RULE_WIDTH: usize = 100;

/// Title, channel, duration and views framed by rules
pub fn render_video_info(metadata: &VideoMetadata) -> String {
    let rule = "=".repeat(INFO_RULE_WIDTH);
    let views = metadata
        .view_count
        .map(utils::format_count)
        .unwrap_or_else(|| "N/A".to_string());

    let mut out = String::new();
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Title: {}", metadata.title);
    let _ = writeln!(out, "Channel: {}", metadata.channel);
    let _ = writeln!(out, "Duration: {}", utils::format_duration(metadata.duration.unwrap_or(0.0)));
    let _ = writeln!(out, "Views: {}", views);
    let _ = writeln!(out, "{}", rule);
    out
}

pub fn print_video_info(metadata: &VideoMetadata) {
    println!();
    print!("{}", render_video_info(metadata));
}

fn table_row(columns: [&str; 5]) -> String {
    let [number, kind, quality, format, size] = columns;
    format!("{:<3} {:<12} {:<10} {:<8} {:<10}", number, kind, quality, format, size)
        .trim_end()
        .to_string()
}

fn verbose_table_row(columns: [&str; 6]) -> String {
    let [number, kind, quality, format, codec, size] = columns;
    format!("{:<3} {:<12} {:<10} {:<8} {:<15} {:<10}", number, kind, quality, format, codec, size)
        .trim_end()
        .to_string()
}

/// The numbered format table; verbose adds a codec column
pub fn render_format_table(catalog: &Catalog, verbose: bool) -> String {
    let rule = "-".repeat(if verbose { VERBOSE_TABLE_RULE_WIDTH } else { TABLE_RULE_WIDTH });

    let mut out = String::new();
    let _ = writeln!(out, "Available formats:");
    let _ = writeln!(out, "{}", rule);
    let header = if verbose {
        verbose_table_row(["#", "Type", "Quality", "Format", "Codec", "Size"])
    } else {
        table_row(["#", "Type", "Quality", "Format", "Size"])
    };
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "{}", rule);

    for (ordinal, option) in catalog.numbered() {
        let number = ordinal.to_string();
        let quality = option.quality();
        let size = utils::format_optional_size(option.estimated_size());
        let row = if verbose {
            verbose_table_row([
                &number,
                option.kind_label(),
                &quality,
                option.output_extension(),
                &option.codec(),
                &size,
            ])
        } else {
            table_row([&number, option.kind_label(), &quality, option.output_extension(), &size])
        };
        let _ = writeln!(out, "{}", row);
    }

    let _ = writeln!(out, "{}", rule);
    out
}

pub fn print_format_table(catalog: &Catalog, verbose: bool) {
    println!();
    print!("{}", render_format_table(catalog, verbose));
}

/// Summary of the chosen entry
pub fn render_selection(option: &FormatOption) -> String {
    let mut out = String::new();
    match option {
        FormatOption::Video { stream, label, companion_audio } => {
            let _ = writeln!(out, "🎥 Selected quality: {}", label);
            let _ = writeln!(out, "ℹ️  Video codec: {}", stream.primary_codec());
            if let Some(fps) = stream.fps.filter(|fps| *fps > 0.0) {
                let _ = writeln!(out, "ℹ️  Frame rate: {}fps", fps.round() as u32);
            }
            let _ = writeln!(out, "ℹ️  Container: {}", stream.ext);
            if let Some(audio) = companion_audio {
                let _ = writeln!(out, "ℹ️  Selected audio stream:");
                let _ = writeln!(out, "   - Bitrate: {}kbps", audio.bitrate_kbps());
                let _ = writeln!(out, "   - Codec: {}", audio.primary_codec());
                let _ = writeln!(out, "   - Size: {}", utils::format_optional_size(audio.filesize));
            }
        }
        FormatOption::Audio { stream } => {
            let _ = writeln!(out, "🎵 Selected quality: {}kbps", stream.bitrate_kbps());
            let _ = writeln!(out, "ℹ️  Audio codec: {}", stream.primary_codec());
            let _ = writeln!(out, "ℹ️  Container: {}", stream.ext);
        }
        FormatOption::Transcode { source, target } => {
            let _ = writeln!(out, "🎵 Selected quality: {}kbps", source.bitrate_kbps());
            let _ = writeln!(out, "ℹ️  Format: {}", target.label());
        }
    }
    let _ = writeln!(out, "📦 File size: {}", utils::format_optional_size(option.estimated_size()));
    out
}

pub fn print_selection(option: &FormatOption) {
    println!();
    print!("{}", render_selection(option));
}
