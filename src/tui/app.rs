use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::widgets::TableState;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::catalog::{Catalog, CatalogOptions, FormatOption};
use crate::download::Stage;
use crate::extractors::VideoMetadata;

/// How long a message stays on screen
pub const MESSAGE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Url,
    Directory,
    Formats,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Url => Focus::Directory,
            Focus::Directory => Focus::Formats,
            Focus::Formats => Focus::Url,
        }
    }

    fn previous(self) -> Self {
        match self {
            Focus::Url => Focus::Formats,
            Focus::Directory => Focus::Url,
            Focus::Formats => Focus::Directory,
        }
    }
}

/// Background work in flight, at most one at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Fetching,
    Downloading,
    Cancelling,
}

/// Something the event loop has to carry out on behalf of the app
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Fetch(String),
    Download {
        metadata: Box<VideoMetadata>,
        option: FormatOption,
        directory: PathBuf,
    },
    /// Create the directory and remember it in the configuration
    UseDirectory(PathBuf),
    Quit,
}

/// Reported by background tasks
#[derive(Debug)]
pub enum WorkerEvent {
    Fetched(Result<VideoMetadata, String>),
    StageStarted { stage: Stage, total: Option<u64> },
    Total(u64),
    Position(u64),
    StageFinished,
    DirectoryReady(Result<PathBuf, String>),
    Downloaded(PathBuf),
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub text: String,
    pub is_error: bool,
    posted: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub stage: Stage,
    pub position: u64,
    pub total: Option<u64>,
}

impl Progress {
    /// Completed fraction in `0.0..=1.0`
    pub fn ratio(&self) -> f64 {
        match self.total {
            Some(total) if total > 0 => (self.position as f64 / total as f64).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }

    /// `x.xMB / y.yMB` for downloads, a percentage for transcoder stages
    pub fn label(&self) -> String {
        const MB: f64 = 1024.0 * 1024.0;
        if self.stage.counts_bytes() {
            let total = self.total.map(|t| t as f64 / MB).unwrap_or(0.0);
            format!("{:.1}MB / {:.1}MB", self.position as f64 / MB, total)
        } else {
            format!("{}%", (self.ratio() * 100.0).round() as u64)
        }
    }
}

pub struct App {
    pub url: String,
    pub directory: String,
    pub focus: Focus,
    pub activity: Activity,
    pub metadata: Option<VideoMetadata>,
    pub catalog: Option<Catalog>,
    pub table: TableState,
    pub status: String,
    pub progress: Option<Progress>,
    message: Option<Message>,
    cancel: Option<CancellationToken>,
}

impl App {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            url: String::new(),
            directory: directory.display().to_string(),
            focus: Focus::Url,
            activity: Activity::Idle,
            metadata: None,
            catalog: None,
            table: TableState::default(),
            status: String::new(),
            progress: None,
            message: None,
            cancel: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.activity != Activity::Idle
    }

    /// Message currently on screen, if it has not expired
    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    pub fn show_message(&mut self, text: impl Into<String>) {
        self.post(text.into(), false, Instant::now());
    }

    pub fn show_error(&mut self, text: impl Into<String>) {
        self.post(text.into(), true, Instant::now());
    }

    fn post(&mut self, text: String, is_error: bool, posted: Instant) {
        if is_error {
            tracing::warn!("{}", text);
        }
        self.message = Some(Message { text, is_error, posted });
    }

    /// Drop the message once it has been shown for [`MESSAGE_TTL`]
    pub fn expire_message(&mut self, now: Instant) {
        if self
            .message
            .as_ref()
            .is_some_and(|m| now.duration_since(m.posted) >= MESSAGE_TTL)
        {
            self.message = None;
        }
    }

    /// Token for the next background task; the app keeps a clone for cancelling
    pub fn begin_work(&mut self, activity: Activity) -> CancellationToken {
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.activity = activity;
        token
    }

    fn end_work(&mut self) {
        self.cancel = None;
        self.activity = Activity::Idle;
    }

    pub fn cancel(&mut self) {
        if let Some(token) = &self.cancel {
            if self.activity == Activity::Fetching {
                token.cancel();
                self.end_work();
                self.status.clear();
                return;
            }
            token.cancel();
            self.activity = Activity::Cancelling;
            self.status = "Canceling download...".to_string();
        }
    }

    pub fn selected_option(&self) -> Option<&FormatOption> {
        let catalog = self.catalog.as_ref()?;
        catalog.entries().get(self.table.selected()?)
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('q') if ctrl => {
                self.cancel();
                return Some(Action::Quit);
            }
            KeyCode::Esc => {
                self.cancel();
                return None;
            }
            KeyCode::Tab => {
                self.focus = self.focus.next();
                return None;
            }
            KeyCode::BackTab => {
                self.focus = self.focus.previous();
                return None;
            }
            _ => {}
        }

        match self.focus {
            Focus::Url => self.edit_url(key, ctrl),
            Focus::Directory => self.edit_directory(key, ctrl),
            Focus::Formats => self.navigate_formats(key),
        }
    }

    fn edit_url(&mut self, key: KeyEvent, ctrl: bool) -> Option<Action> {
        match key.code {
            KeyCode::Enter => self.request_fetch(),
            code => {
                edit_field(&mut self.url, code, ctrl);
                None
            }
        }
    }

    fn edit_directory(&mut self, key: KeyEvent, ctrl: bool) -> Option<Action> {
        match key.code {
            KeyCode::Enter => {
                let directory = self.directory.trim();
                if directory.is_empty() {
                    self.show_error("Please choose a download directory");
                    return None;
                }
                Some(Action::UseDirectory(PathBuf::from(directory)))
            }
            code => {
                edit_field(&mut self.directory, code, ctrl);
                None
            }
        }
    }

    fn navigate_formats(&mut self, key: KeyEvent) -> Option<Action> {
        let len = self.catalog.as_ref().map_or(0, Catalog::len);
        match key.code {
            KeyCode::Down | KeyCode::Char('j') if len > 0 => {
                let next = self.table.selected().map_or(0, |i| (i + 1).min(len - 1));
                self.table.select(Some(next));
                None
            }
            KeyCode::Up | KeyCode::Char('k') if len > 0 => {
                let previous = self.table.selected().map_or(0, |i| i.saturating_sub(1));
                self.table.select(Some(previous));
                None
            }
            KeyCode::Home if len > 0 => {
                self.table.select(Some(0));
                None
            }
            KeyCode::End if len > 0 => {
                self.table.select(Some(len - 1));
                None
            }
            KeyCode::Enter | KeyCode::Char('d') => self.request_download(),
            KeyCode::Char('f') | KeyCode::F(5) => self.request_fetch(),
            _ => None,
        }
    }

    fn request_fetch(&mut self) -> Option<Action> {
        if self.is_busy() {
            self.show_error("Wait for the current task to finish or press Esc to cancel");
            return None;
        }

        let url = self.url.trim().to_string();
        if url.is_empty() {
            self.show_error("Please enter a YouTube URL");
            return None;
        }

        self.status = "Fetching video info...".to_string();
        self.metadata = None;
        self.catalog = None;
        self.table.select(None);
        self.progress = None;
        Some(Action::Fetch(url))
    }

    fn request_download(&mut self) -> Option<Action> {
        if self.is_busy() {
            self.show_error("A download is already running");
            return None;
        }

        let Some(metadata) = self.metadata.clone() else {
            self.show_error("Please fetch video information first");
            return None;
        };
        let Some(option) = self.selected_option().cloned() else {
            self.show_error("Please select a format to download");
            return None;
        };

        let directory = self.directory.trim();
        if directory.is_empty() {
            self.show_error("Please choose a download directory");
            return None;
        }

        self.status = "Starting download...".to_string();
        self.progress = None;
        Some(Action::Download {
            metadata: Box::new(metadata),
            option,
            directory: PathBuf::from(directory),
        })
    }

    pub fn on_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Fetched(Ok(metadata)) => {
                self.end_work();
                self.status.clear();
                match Catalog::build(&metadata, CatalogOptions::interactive()) {
                    Ok(catalog) => {
                        self.table.select(Some(0));
                        self.catalog = Some(catalog);
                        self.metadata = Some(metadata);
                        self.focus = Focus::Formats;
                        self.show_message("Video information loaded successfully");
                    }
                    Err(e) => self.show_error(e.to_string()),
                }
            }
            WorkerEvent::Fetched(Err(e)) => {
                self.end_work();
                self.status.clear();
                self.show_error(e);
            }
            WorkerEvent::StageStarted { stage, total } => {
                self.status = match stage {
                    Stage::Video => "Downloading video...",
                    Stage::Audio => "Downloading audio...",
                    Stage::Merging => "Combining video and audio...",
                    Stage::Converting => "Converting audio...",
                }
                .to_string();
                self.progress = Some(Progress { stage, position: 0, total });
            }
            WorkerEvent::Total(total) => {
                if let Some(progress) = &mut self.progress {
                    progress.total = Some(total);
                }
            }
            WorkerEvent::Position(position) => {
                if let Some(progress) = &mut self.progress {
                    progress.position = position;
                }
            }
            WorkerEvent::StageFinished => {
                if let Some(progress) = &mut self.progress {
                    if let Some(total) = progress.total {
                        progress.position = total;
                    }
                }
            }
            WorkerEvent::DirectoryReady(Ok(directory)) => {
                self.directory = directory.display().to_string();
                self.show_message(format!("Downloads will be saved to {}", self.directory));
            }
            WorkerEvent::DirectoryReady(Err(e)) => {
                self.show_error(format!("Could not create download directory: {}", e));
            }
            WorkerEvent::Downloaded(path) => {
                self.end_work();
                self.status = format!("Saved to {}", path.display());
                self.show_message("Download completed successfully!");
            }
            WorkerEvent::Cancelled => {
                self.end_work();
                self.progress = None;
                self.status = "Download cancelled".to_string();
            }
            WorkerEvent::Failed(e) => {
                self.end_work();
                self.progress = None;
                self.status.clear();
                self.show_error(e);
            }
        }
    }
}

/// Apply a key press to a single-line text field
fn edit_field(field: &mut String, code: KeyCode, ctrl: bool) {
    match code {
        KeyCode::Char('u') if ctrl => field.clear(),
        KeyCode::Char(c) if !ctrl => field.push(c),
        KeyCode::Backspace => {
            field.pop();
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_metadata;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(press(KeyCode::Char(c)));
        }
    }

    fn loaded_app() -> App {
        let mut app = App::new(PathBuf::from("/tmp/videos"));
        app.begin_work(Activity::Fetching);
        app.on_worker_event(WorkerEvent::Fetched(Ok(sample_metadata())));
        app
    }

    #[test]
    fn test_typing_and_fetch() {
        let mut app = App::new(PathBuf::from("/tmp/videos"));
        assert_eq!(app.handle_key(press(KeyCode::Enter)), None);
        assert!(app.message().unwrap().is_error);

        type_text(&mut app, "https://youtu.be/abc1234");
        app.handle_key(press(KeyCode::Backspace));
        assert_eq!(
            app.handle_key(press(KeyCode::Enter)),
            Some(Action::Fetch("https://youtu.be/abc123".to_string()))
        );
        assert_eq!(app.status, "Fetching video info...");
    }

    #[test]
    fn test_focus_cycles() {
        let mut app = App::new(PathBuf::from("/tmp"));
        app.handle_key(press(KeyCode::Tab));
        assert_eq!(app.focus, Focus::Directory);
        app.handle_key(press(KeyCode::Tab));
        assert_eq!(app.focus, Focus::Formats);
        app.handle_key(press(KeyCode::Tab));
        assert_eq!(app.focus, Focus::Url);
        app.handle_key(press(KeyCode::BackTab));
        assert_eq!(app.focus, Focus::Formats);
    }

    #[test]
    fn test_directory_field() {
        let mut app = App::new(PathBuf::from("/tmp"));
        app.handle_key(press(KeyCode::Tab));
        app.handle_key(ctrl('u'));
        assert_eq!(app.directory, "");
        assert_eq!(app.handle_key(press(KeyCode::Enter)), None);

        type_text(&mut app, "/srv/media");
        assert_eq!(
            app.handle_key(press(KeyCode::Enter)),
            Some(Action::UseDirectory(PathBuf::from("/srv/media")))
        );
    }

    #[test]
    fn test_fetched_metadata_fills_table() {
        let app = loaded_app();
        assert_eq!(app.focus, Focus::Formats);
        assert!(!app.is_busy());
        assert_eq!(app.table.selected(), Some(0));
        assert_eq!(app.selected_option().map(|o| o.quality()), Some("1080p+".to_string()));

        // interactive layout: every tier gets MP3 and AAC
        let transcodes = app
            .catalog
            .as_ref()
            .unwrap()
            .entries()
            .iter()
            .filter(|o| matches!(o, FormatOption::Transcode { .. }))
            .count();
        assert_eq!(transcodes, 4);
    }

    #[test]
    fn test_table_navigation_and_download() {
        let mut app = loaded_app();
        app.handle_key(press(KeyCode::Up));
        assert_eq!(app.table.selected(), Some(0));
        app.handle_key(press(KeyCode::Down));
        app.handle_key(press(KeyCode::Down));
        assert_eq!(app.table.selected(), Some(2));
        app.handle_key(press(KeyCode::End));
        let last = app.catalog.as_ref().unwrap().len() - 1;
        assert_eq!(app.table.selected(), Some(last));
        app.handle_key(press(KeyCode::Down));
        assert_eq!(app.table.selected(), Some(last));

        match app.handle_key(press(KeyCode::Enter)) {
            Some(Action::Download { option, directory, .. }) => {
                assert_eq!(option.output_extension(), "aac");
                assert_eq!(directory, PathBuf::from("/tmp/videos"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_download_requires_metadata() {
        let mut app = App::new(PathBuf::from("/tmp"));
        app.focus = Focus::Formats;
        assert_eq!(app.handle_key(press(KeyCode::Enter)), None);
        assert_eq!(app.message().unwrap().text, "Please fetch video information first");
    }

    #[test]
    fn test_cancel_signals_token() {
        let mut app = loaded_app();
        let token = app.begin_work(Activity::Downloading);

        app.on_worker_event(WorkerEvent::StageStarted { stage: Stage::Video, total: None });
        app.on_worker_event(WorkerEvent::Total(2 * 1024 * 1024));
        app.on_worker_event(WorkerEvent::Position(1024 * 1024));
        assert_eq!(app.progress.unwrap().label(), "1.0MB / 2.0MB");

        app.handle_key(press(KeyCode::Esc));
        assert!(token.is_cancelled());
        assert_eq!(app.activity, Activity::Cancelling);

        // a second request while cancelling is refused
        assert_eq!(app.handle_key(press(KeyCode::Enter)), None);

        app.on_worker_event(WorkerEvent::Cancelled);
        assert_eq!(app.status, "Download cancelled");
        assert!(!app.is_busy());
        assert!(app.progress.is_none());
    }

    #[test]
    fn test_quit_cancels_running_work() {
        let mut app = App::new(PathBuf::from("/tmp"));
        let token = app.begin_work(Activity::Fetching);
        assert_eq!(app.handle_key(ctrl('c')), Some(Action::Quit));
        assert!(token.is_cancelled());
        assert!(!app.is_busy());
    }

    #[test]
    fn test_messages_expire() {
        let mut app = App::new(PathBuf::from("/tmp"));
        let posted = Instant::now();
        app.post("hello".to_string(), false, posted);

        app.expire_message(posted + Duration::from_secs(4));
        assert!(app.message().is_some());
        app.expire_message(posted + MESSAGE_TTL);
        assert!(app.message().is_none());
    }

    #[test]
    fn test_transcode_progress_label() {
        let progress = Progress {
            stage: Stage::Converting,
            position: 42,
            total: Some(100),
        };
        assert_eq!(progress.label(), "42%");
        assert!((progress.ratio() - 0.42).abs() < f64::EPSILON);
    }
}
