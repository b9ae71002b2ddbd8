use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tubegrab::download::ConsoleProgress;
use tubegrab::extractors::YtDlpExtractor;
use tubegrab::transcode::FfmpegTranscoder;
use tubegrab::{
    output, prompt, tui, utils, Catalog, CatalogOptions, Cli, Commands, Config, DownloadPipeline,
    DownloaderError, FormatOption, MediaExtractor,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) if DownloaderError::is_cancelled(&e) => {
            println!("\n🛑 Download cancelled by user.");
            std::process::exit(0);
        }
        Err(e) => {
            tracing::debug!("Fatal error: {:?}", e);
            eprintln!("\n{}", style(format!("❌ {:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let log_file = match &cli.command {
        Some(Commands::Tui { .. }) => Some(tui::log_path()?),
        _ => None,
    };
    init_tracing(cli.verbose, log_file.as_deref())?;

    let config = Config::load(cli.config.as_deref()).await?;

    match &cli.command {
        None => {
            let url = cli
                .url
                .as_deref()
                .context("A video URL is required (run `tubegrab --help` for usage, or `tubegrab tui`)")?;
            download(&cli, &config, url).await
        }
        Some(Commands::Formats { url }) => list_formats(&config, url, cli.verbose).await,
        Some(Commands::Tui { output_dir }) => {
            let pipeline = build_pipeline(&config, false);
            tui::run(config, pipeline, output_dir.clone()).await
        }
        Some(Commands::Config { show }) => {
            if *show {
                config.display();
            } else if let Some(source) = config.source() {
                println!("Configuration file: {}", source.display());
                println!("Run `tubegrab config --show` to print its values.");
            }
            Ok(())
        }
        Some(Commands::Doctor) => doctor(&config).await,
    }
}

/// Initialize tracing, writing to `log_file` instead of stderr when given
fn init_tracing(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default_filter = if verbose { "tubegrab=debug" } else { "tubegrab=warn" };

    let writer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs_err::create_dir_all(parent)?;
            }
            let file = fs_err::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(log_file.is_none()),
        )
        .init();

    Ok(())
}

fn build_pipeline(config: &Config, verbose: bool) -> DownloadPipeline {
    let extractor = YtDlpExtractor::new(config.tools.yt_dlp.clone());
    let transcoder = FfmpegTranscoder::new(
        config.tools.ffmpeg.clone(),
        config.tools.ffprobe.clone(),
        config.audio.clone(),
    )
    .verbose(verbose);

    DownloadPipeline::new(Arc::new(extractor), Arc::new(transcoder))
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Ctrl-C received");
            token.cancel();
        }
    });
}

async fn fetch_metadata(
    pipeline: &DownloadPipeline,
    url: &str,
    cancel: &CancellationToken,
) -> Result<tubegrab::VideoMetadata> {
    println!("\n📡 Getting video information...");
    tokio::select! {
        result = pipeline.fetch(url) => result,
        _ = cancel.cancelled() => Err(DownloaderError::Cancelled.into()),
    }
}

async fn list_formats(config: &Config, url: &str, verbose: bool) -> Result<()> {
    let url = utils::validate_youtube_url(url)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let pipeline = build_pipeline(config, verbose);
    let metadata = fetch_metadata(&pipeline, &url, &cancel).await?;
    let catalog = Catalog::build(&metadata, CatalogOptions::console(verbose))?;

    output::print_video_info(&metadata);
    output::print_format_table(&catalog, verbose);
    Ok(())
}

/// Read a selection from stdin without blocking the runtime
async fn prompt_for_format(catalog: &Catalog, cancel: &CancellationToken) -> Result<FormatOption> {
    let catalog = catalog.clone();
    let prompt = tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        prompt::choose_format(&catalog, &mut stdin.lock(), &mut stdout).cloned()
    });

    tokio::select! {
        result = prompt => result.context("Format prompt failed")?,
        _ = cancel.cancelled() => Err(DownloaderError::Cancelled.into()),
    }
}

async fn download(cli: &Cli, config: &Config, url: &str) -> Result<()> {
    let url = utils::validate_youtube_url(url)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let pipeline = build_pipeline(config, cli.verbose);
    let metadata = fetch_metadata(&pipeline, &url, &cancel).await?;
    let catalog = Catalog::build(&metadata, CatalogOptions::console(cli.verbose))?;

    output::print_video_info(&metadata);
    output::print_format_table(&catalog, cli.verbose);

    let option = match cli.format {
        Some(choice) => catalog.select(choice)?.clone(),
        None => prompt_for_format(&catalog, &cancel).await?,
    };
    output::print_selection(&option);

    let directory = config.download_dir(cli.output_dir.as_deref())?;
    if matches!(option, FormatOption::Video { companion_audio: Some(_), .. }) {
        println!("\n📥 Downloading video and audio separately for best quality...");
    } else {
        println!("\n🚀 Starting download...");
    }

    let reporter = Arc::new(ConsoleProgress::new(cli.quiet).verbose(cli.verbose));
    let file = pipeline
        .download(&metadata, &option, &directory, reporter, cancel)
        .await?;

    println!("\n{}", style("✨ Download completed!").green());
    println!("📁 Saved to: {}", file.path.display());
    println!("📦 Size: {}", utils::format_file_size(file.size));

    if config.download.open_folder && !cli.no_open {
        println!("\n🗂️  Opening downloads folder...");
        if let Err(e) = utils::open_file_explorer(&directory).await {
            tracing::warn!("Could not open {}: {:#}", directory.display(), e);
        }
    }

    Ok(())
}

async fn doctor(config: &Config) -> Result<()> {
    println!("Checking external tools:");

    let extractor = YtDlpExtractor::new(config.tools.yt_dlp.clone());
    let yt_dlp = match extractor.check_available().await {
        Ok(version) => Some(version),
        Err(e) => {
            tracing::debug!("yt-dlp check failed: {:#}", e);
            None
        }
    };

    let mut report = vec![(config.tools.yt_dlp.clone(), yt_dlp)];
    report.extend(utils::check_dependencies(&config.tools.ffmpeg, &config.tools.ffprobe).await);

    let mut missing = 0;
    for (tool, version) in &report {
        match version {
            Some(version) => println!("  {} {}: {}", style("✅").green(), tool, version),
            None => {
                missing += 1;
                println!("  {} {}: not found", style("❌").red(), tool);
            }
        }
    }

    if missing > 0 {
        anyhow::bail!("{} of {} tools could not be run", missing, report.len());
    }

    println!("\nAll tools available.");
    Ok(())
}
