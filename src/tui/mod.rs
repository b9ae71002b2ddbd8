//! Full-screen interactive front-end.
//!
//! The UI loop owns [`App`] and never blocks: terminal input arrives from a
//! reader thread and background fetches/downloads report back through the
//! same unbounded channel.

use anyhow::{Context, Result};
use crossterm::event::{self, Event};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

pub mod app;
pub mod ui;

use crate::config::Config;
use crate::download::{DownloadPipeline, ProgressReporter, Stage};
use crate::DownloaderError;
use app::{Action, Activity, App, WorkerEvent};

const TICK: Duration = Duration::from_millis(250);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

enum AppEvent {
    Input(Event),
    Worker(WorkerEvent),
}

/// File the interactive front-end logs to
pub fn log_path() -> Result<PathBuf> {
    let cache = dirs::cache_dir().context("Could not determine cache directory")?;
    Ok(cache.join("tubegrab").join("tui.log"))
}

/// Forwards pipeline progress to the UI loop
struct ChannelProgress {
    tx: UnboundedSender<AppEvent>,
}

impl ChannelProgress {
    fn send(&self, event: WorkerEvent) {
        let _ = self.tx.send(AppEvent::Worker(event));
    }
}

impl ProgressReporter for ChannelProgress {
    fn begin(&self, stage: Stage, total: Option<u64>) {
        self.send(WorkerEvent::StageStarted { stage, total });
    }

    fn set_total(&self, total: u64) {
        self.send(WorkerEvent::Total(total));
    }

    fn update(&self, position: u64) {
        self.send(WorkerEvent::Position(position));
    }

    fn finish(&self) {
        self.send(WorkerEvent::StageFinished);
    }
}

/// Run the interactive downloader until the user quits
pub async fn run(mut config: Config, pipeline: DownloadPipeline, output_dir: Option<PathBuf>) -> Result<()> {
    let directory = match output_dir {
        Some(dir) => dir,
        None => config.interactive_dir(),
    };
    let mut app = App::new(directory);

    let (tx, rx) = mpsc::unbounded_channel();
    spawn_input_reader(tx.clone());

    tracing::info!("Starting interactive front-end");
    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, &mut app, &mut config, &pipeline, tx, rx).await;
    ratatui::restore();

    result
}

/// Terminal events are read on a plain thread so the runtime never blocks on them
fn spawn_input_reader(tx: UnboundedSender<AppEvent>) {
    std::thread::spawn(move || loop {
        match event::read() {
            Ok(event) => {
                if tx.send(AppEvent::Input(event)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Terminal input failed: {}", e);
                break;
            }
        }
    });
}

async fn event_loop(
    terminal: &mut ratatui::DefaultTerminal,
    app: &mut App,
    config: &mut Config,
    pipeline: &DownloadPipeline,
    tx: UnboundedSender<AppEvent>,
    mut rx: UnboundedReceiver<AppEvent>,
) -> Result<()> {
    let mut tick = tokio::time::interval(TICK);

    loop {
        terminal.draw(|frame| ui::draw(frame, app))?;

        let event = tokio::select! {
            event = rx.recv() => event,
            _ = tick.tick() => {
                app.expire_message(Instant::now());
                continue;
            }
        };

        let action = match event {
            Some(AppEvent::Input(Event::Key(key))) => app.handle_key(key),
            Some(AppEvent::Input(_)) => None,
            Some(AppEvent::Worker(event)) => {
                app.on_worker_event(event);
                None
            }
            None => return Ok(()),
        };

        match action {
            Some(Action::Quit) => {
                if app.is_busy() {
                    tracing::info!("Waiting for the running download to stop");
                    let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {
                        while let Some(event) = rx.recv().await {
                            if let AppEvent::Worker(event) = event {
                                app.on_worker_event(event);
                            }
                            if !app.is_busy() {
                                break;
                            }
                        }
                    })
                    .await;
                }
                return Ok(());
            }
            Some(Action::Fetch(url)) => {
                let cancel = app.begin_work(Activity::Fetching);
                spawn_fetch(pipeline.clone(), url, tx.clone(), cancel);
            }
            Some(Action::Download { metadata, option, directory }) => {
                let cancel = app.begin_work(Activity::Downloading);
                let pipeline = pipeline.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let reporter = Arc::new(ChannelProgress { tx: tx.clone() });
                    let event = match pipeline.download(&metadata, &option, &directory, reporter, cancel).await {
                        Ok(file) => WorkerEvent::Downloaded(file.path),
                        Err(e) if DownloaderError::is_cancelled(&e) => WorkerEvent::Cancelled,
                        Err(e) => WorkerEvent::Failed(format!("{:#}", e)),
                    };
                    let _ = tx.send(AppEvent::Worker(event));
                });
            }
            Some(Action::UseDirectory(directory)) => {
                let event = WorkerEvent::DirectoryReady(use_directory(config, directory).await);
                app.on_worker_event(event);
            }
            None => {}
        }
    }
}

fn spawn_fetch(pipeline: DownloadPipeline, url: String, tx: UnboundedSender<AppEvent>, cancel: CancellationToken) {
    tokio::spawn(async move {
        let result = tokio::select! {
            result = pipeline.fetch(&url) => result,
            _ = cancel.cancelled() => {
                tracing::debug!("Fetch of {} cancelled", url);
                return;
            }
        };
        let event = WorkerEvent::Fetched(result.map_err(|e| format!("{:#}", e)));
        let _ = tx.send(AppEvent::Worker(event));
    });
}

/// Create `directory` and remember it for the next session
async fn use_directory(config: &mut Config, directory: PathBuf) -> Result<PathBuf, String> {
    let directory = config.download_dir(Some(directory.as_path())).map_err(|e| e.to_string())?;
    fs_err::create_dir_all(&directory).map_err(|e| e.to_string())?;

    config.interactive.last_directory = Some(directory.clone());
    if let Err(e) = config.save().await {
        tracing::warn!("Could not save configuration: {:#}", e);
    }

    Ok(directory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_progress_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let progress = ChannelProgress { tx };

        progress.begin(Stage::Video, Some(10));
        progress.update(5);
        progress.finish();

        let mut app = App::new(PathBuf::from("/tmp"));
        while let Ok(AppEvent::Worker(event)) = rx.try_recv() {
            app.on_worker_event(event);
        }
        let progress = app.progress.unwrap();
        assert_eq!(progress.stage, Stage::Video);
        assert_eq!(progress.position, 10);
    }

    #[tokio::test]
    async fn test_use_directory_creates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let mut config = Config::load(Some(&config_path)).await.unwrap();

        let target = dir.path().join("media").join("videos");
        let resolved = use_directory(&mut config, target.clone()).await.unwrap();
        assert_eq!(resolved, target);
        assert!(target.is_dir());

        let reloaded = Config::load(Some(&config_path)).await.unwrap();
        assert_eq!(reloaded.interactive.last_directory, Some(target));
    }
}
