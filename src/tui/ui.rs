use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Gauge, Paragraph, Row, Table};
use ratatui::Frame;

use super::app::{Activity, App, Focus};
use crate::catalog::{AudioTarget, FormatOption};
use crate::utils;

const HIGH_QUALITY_HEIGHT: u32 = 1080;

/// Text for the "Type" column of the interactive table
fn kind_label(option: &FormatOption) -> String {
    match option {
        FormatOption::Video { stream, .. } if stream.height.unwrap_or(0) >= HIGH_QUALITY_HEIGHT => {
            "Video (High Quality)".to_string()
        }
        FormatOption::Video { .. } => "Video".to_string(),
        FormatOption::Audio { .. } => "Audio".to_string(),
        FormatOption::Transcode { target: AudioTarget::Mp3, .. } => "Audio (MP3)".to_string(),
        FormatOption::Transcode { target: AudioTarget::Aac, .. } => "Audio (AAC)".to_string(),
    }
}

fn field_block(title: &str, focused: bool) -> Block<'_> {
    let block = Block::bordered().title(title);
    if focused {
        block.border_style(Style::default().fg(Color::Cyan))
    } else {
        block
    }
}

pub fn draw(frame: &mut Frame, app: &mut App) {
    let [header, url, directory, info, formats, gauge, status, help] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(5),
        Constraint::Min(5),
        Constraint::Length(3),
        Constraint::Length(2),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    frame.render_widget(
        Line::from(vec![
            Span::styled(" tubegrab ", Style::default().bold().reversed()),
            Span::raw(" YouTube Downloader"),
        ]),
        header,
    );

    draw_input(frame, url, "YouTube URL", &app.url, app.focus == Focus::Url);
    draw_input(frame, directory, "Download directory", &app.directory, app.focus == Focus::Directory);
    draw_info(frame, info, app);
    draw_formats(frame, formats, app);
    draw_gauge(frame, gauge, app);
    draw_status(frame, status, app);

    let hints = match app.activity {
        Activity::Idle => "Tab: switch field  Enter: fetch / use directory / download  ↑↓: select  Ctrl-C: quit",
        _ => "Esc: cancel  Ctrl-C: quit",
    };
    frame.render_widget(Paragraph::new(hints).fg(Color::DarkGray), help);
}

fn draw_input(frame: &mut Frame, area: Rect, title: &str, value: &str, focused: bool) {
    frame.render_widget(Paragraph::new(value).block(field_block(title, focused)), area);

    if focused {
        let width = value.chars().count() as u16;
        let x = area.x + 1 + width.min(area.width.saturating_sub(3));
        frame.set_cursor_position((x, area.y + 1));
    }
}

fn draw_info(frame: &mut Frame, area: Rect, app: &App) {
    let lines = match &app.metadata {
        Some(metadata) => vec![
            Line::from(format!("Title: {}", metadata.title)),
            Line::from(format!("Channel: {}", metadata.channel)),
            Line::from(format!(
                "Length: {}",
                utils::format_duration(metadata.duration.unwrap_or(0.0))
            )),
        ],
        None => vec![Line::from("Enter a URL and press Enter to fetch video information").dark_gray()],
    };

    frame.render_widget(Paragraph::new(lines).block(Block::bordered().title("Video Information")), area);
}

fn draw_formats(frame: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .catalog
        .as_ref()
        .map(|catalog| {
            catalog
                .entries()
                .iter()
                .map(|option| {
                    Row::new(vec![
                        kind_label(option),
                        option.quality(),
                        option.output_extension().to_string(),
                        utils::format_optional_size(option.estimated_size()),
                    ])
                })
                .collect()
        })
        .unwrap_or_default();

    let table = Table::new(
        rows,
        [
            Constraint::Length(22),
            Constraint::Length(10),
            Constraint::Length(8),
            Constraint::Min(10),
        ],
    )
    .header(Row::new(vec!["Type", "Quality", "Format", "Size"]).style(Style::default().add_modifier(Modifier::BOLD)))
    .block(field_block("Available Formats", app.focus == Focus::Formats))
    .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
    .highlight_symbol("> ");

    frame.render_stateful_widget(table, area, &mut app.table);
}

fn draw_gauge(frame: &mut Frame, area: Rect, app: &App) {
    let (ratio, label, title) = match &app.progress {
        Some(progress) => (progress.ratio(), progress.label(), progress.stage.label()),
        None => (0.0, String::new(), "Progress"),
    };

    frame.render_widget(
        Gauge::default()
            .block(Block::bordered().title(title))
            .gauge_style(Style::default().fg(Color::Green))
            .ratio(ratio)
            .label(label),
        area,
    );
}

fn draw_status(frame: &mut Frame, area: Rect, app: &App) {
    let message = match app.message() {
        Some(message) if message.is_error => Line::from(format!("❌ Error: {}", message.text)).red(),
        Some(message) => Line::from(format!("✅ {}", message.text)).green(),
        None => Line::default(),
    };

    frame.render_widget(Paragraph::new(vec![Line::from(app.status.as_str()), message]), area);
}
