use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

use super::{ProgressReporter, Stage};

const BYTES_TEMPLATE: &str =
    "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const BYTES_UNKNOWN_TEMPLATE: &str = "{msg} {spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec})";
const PERCENT_TEMPLATE: &str = "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.magenta/blue}] {pos}%";

/// Reporter that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn begin(&self, _stage: Stage, _total: Option<u64>) {}
    fn set_total(&self, _total: u64) {}
    fn update(&self, _position: u64) {}
    fn finish(&self) {}
}

/// Terminal progress bars, one per stage
pub struct ConsoleProgress {
    hidden: bool,
    verbose: bool,
    current: Mutex<Option<(Stage, ProgressBar)>>,
}

impl ConsoleProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            hidden: quiet,
            verbose: false,
            current: Mutex::new(None),
        }
    }

    /// In verbose mode ffmpeg's own output replaces the merge and convert bars
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn shows_bar(&self, stage: Stage) -> bool {
        !self.hidden && (stage.counts_bytes() || !self.verbose)
    }

    fn style(stage: Stage, total_known: bool) -> ProgressStyle {
        let template = match (stage.counts_bytes(), total_known) {
            (true, true) => BYTES_TEMPLATE,
            (true, false) => BYTES_UNKNOWN_TEMPLATE,
            (false, _) => PERCENT_TEMPLATE,
        };
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏ ")
    }

    fn with_bar(&self, f: impl FnOnce(Stage, &ProgressBar)) {
        if let Ok(guard) = self.current.lock() {
            if let Some((stage, bar)) = guard.as_ref() {
                f(*stage, bar);
            }
        }
    }
}

impl ProgressReporter for ConsoleProgress {
    fn begin(&self, stage: Stage, total: Option<u64>) {
        let bar = if self.shows_bar(stage) {
            ProgressBar::new(total.unwrap_or(0))
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(Self::style(stage, total.is_some()));
        bar.set_message(stage.label());

        if let Ok(mut guard) = self.current.lock() {
            if let Some((_, previous)) = guard.take() {
                previous.finish_and_clear();
            }
            *guard = Some((stage, bar));
        }
    }

    fn set_total(&self, total: u64) {
        self.with_bar(|stage, bar| {
            if bar.length() != Some(total) {
                bar.set_style(Self::style(stage, true));
                bar.set_length(total);
            }
        });
    }

    fn update(&self, position: u64) {
        self.with_bar(|_, bar| bar.set_position(position));
    }

    fn finish(&self) {
        if let Ok(mut guard) = self.current.lock() {
            if let Some((stage, bar)) = guard.take() {
                if !stage.counts_bytes() {
                    bar.set_position(100);
                }
                bar.finish();
            }
        }
    }
}
