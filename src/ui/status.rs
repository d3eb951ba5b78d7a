//! Activity log panel, help bar and loading overlay.

use std::collections::VecDeque;
use std::time::Duration;

use ratatui::{
    layout::{Alignment, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::LogEntry;
use crate::ui::theme::{colors, styles, symbols};
use crate::ui::widgets::Card;

/// Log level for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, LogLevel::Info)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(message, LogLevel::Success)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, LogLevel::Warning)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, LogLevel::Error)
    }

    fn new(message: impl Into<String>, level: LogLevel) -> Self {
        Self {
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            message: message.into(),
            level,
        }
    }
}

pub use LogLevel as LogEntryLevel;

/// Render the activity panel with the newest entries at the bottom.
pub fn render_status_panel(
    frame: &mut Frame,
    area: Rect,
    logs: &VecDeque<LogEntry>,
    max_lines: usize,
) {
    let visible: Vec<Line> = logs
        .iter()
        .rev()
        .take(max_lines)
        .rev()
        .map(format_log_entry)
        .collect();

    let panel = Paragraph::new(visible)
        .block(
            Block::default()
                .title(Span::styled(" Activity ", styles::card_title()))
                .title_alignment(Alignment::Left)
                .borders(Borders::TOP)
                .border_style(styles::border_unfocused()),
        )
        .wrap(Wrap { trim: true });
    frame.render_widget(panel, area);

    let count_text = format!(" {} entries ", logs.len());
    let count_width = count_text.len() as u16;
    let count_x = area.x + area.width.saturating_sub(count_width + 1);
    if count_x > area.x + 12 {
        let count = Paragraph::new(Line::from(Span::styled(count_text, styles::muted())));
        frame.render_widget(count, Rect::new(count_x, area.y, count_width, 1));
    }
}

fn format_log_entry(entry: &LogEntry) -> Line<'static> {
    let (icon, msg_style) = match entry.level {
        LogLevel::Success => (symbols::STATUS_OK, Style::default().fg(colors::SUCCESS)),
        LogLevel::Info => ("i", Style::default().fg(colors::TEXT_PRIMARY)),
        LogLevel::Warning => (symbols::WARNING, Style::default().fg(colors::WARNING)),
        LogLevel::Error => (symbols::ERROR, Style::default().fg(colors::ERROR)),
    };

    Line::from(vec![
        Span::styled(format!("  {}  ", entry.timestamp), styles::muted()),
        Span::styled(format!("{}  ", icon), msg_style),
        Span::styled(entry.message.clone(), msg_style),
    ])
}

/// Render help text at the bottom with styled keys.
pub fn render_help(frame: &mut Frame, area: Rect, context_help: &str) {
    let help = Paragraph::new(Line::from(parse_help_text(context_help)));
    frame.render_widget(help, area);
}

/// Split `key: action` groups (separated by two spaces) into styled spans.
fn parse_help_text(text: &str) -> Vec<Span<'static>> {
    let mut spans = vec![Span::raw("  ")];

    for (i, part) in text.split("  ").enumerate() {
        if i > 0 {
            spans.push(Span::raw("   "));
        }
        match part.split_once(':') {
            Some((key, action)) => {
                spans.push(Span::styled(key.to_string(), styles::help_key()));
                spans.push(Span::styled(
                    format!(" {}", action.trim_start()),
                    styles::muted(),
                ));
            }
            None => spans.push(Span::styled(part.to_string(), styles::muted())),
        }
    }

    spans
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else {
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

/// Overlay shown while an operation runs: spinner, label, elapsed time.
pub fn render_loading_indicator(
    frame: &mut Frame,
    area: Rect,
    message: &str,
    elapsed: Option<Duration>,
) {
    let text = match elapsed {
        Some(e) if e.as_secs() > 0 => format!("{} {}", message, format_elapsed(e)),
        _ => message.to_string(),
    };

    let popup_width = (text.chars().count() as u16 + 8).min(area.width.saturating_sub(4));
    let popup_area = crate::ui::centered(area, popup_width, 3);

    frame.render_widget(Clear, popup_area);

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let spinner_idx = ((now / 150) % symbols::SPINNER.len() as u128) as usize;
    let spinner = symbols::SPINNER[spinner_idx];

    let card = Card::empty().border_style(styles::border_focused());
    frame.render_widget(card, popup_area);

    let loading = Paragraph::new(Line::from(vec![
        Span::styled(format!(" {} ", spinner), styles::title()),
        Span::styled(text, styles::unselected()),
    ]))
    .alignment(Alignment::Center);

    frame.render_widget(loading, crate::ui::card_inner(popup_area, 1));
}
