use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tubegrab",
    about = "Download YouTube videos and audio through yt-dlp and ffmpeg",
    version,
    long_about = "Fetches a YouTube video's available streams, prints them as a numbered table and downloads the one you pick. Adaptive video is merged with the best audio track; audio can be converted to MP3 or AAC. Run `tubegrab tui` for the full-screen interface."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// YouTube video URL
    #[arg(value_name = "URL")]
    pub url: Option<String>,

    /// Show WebM streams, raw audio containers, codecs and ffmpeg output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Download the format with this number instead of prompting
    #[arg(short, long, value_name = "N")]
    pub format: Option<usize>,

    /// Directory to save downloads to
    #[arg(short, long, value_name = "DIR", env = "TUBEGRAB_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Do not open the download folder when finished
    #[arg(long)]
    pub no_open: bool,

    /// Configuration file to use
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the full-screen interactive downloader
    Tui {
        /// Directory to save downloads to
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Print video information and the format table without downloading
    Formats {
        /// YouTube video URL
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// Check that yt-dlp, ffmpeg and ffprobe can be run
    Doctor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_positional_url_with_flags() {
        let cli = Cli::try_parse_from([
            "tubegrab",
            "https://youtu.be/abc123",
            "-v",
            "--format",
            "3",
            "-o",
            "/tmp/out",
            "--no-open",
        ])
        .unwrap();

        assert!(cli.command.is_none());
        assert_eq!(cli.url.as_deref(), Some("https://youtu.be/abc123"));
        assert!(cli.verbose);
        assert_eq!(cli.format, Some(3));
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp/out")));
        assert!(cli.no_open);
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::try_parse_from(["tubegrab", "formats", "https://youtu.be/abc123", "-v"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Formats { ref url }) if url == "https://youtu.be/abc123"));
        assert!(cli.verbose);

        let cli = Cli::try_parse_from(["tubegrab", "tui", "-o", "videos"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Tui { output_dir: Some(_) })));

        let cli = Cli::try_parse_from(["tubegrab", "doctor"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Doctor)));
    }

    #[test]
    fn test_format_must_be_a_number() {
        assert!(Cli::try_parse_from(["tubegrab", "https://youtu.be/abc123", "--format", "x"]).is_err());
    }
}
