//! Confirmation card shown before running or reverting a module, and the
//! restart prompt.

use ratatui::{
    layout::{Alignment, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::{Action, App};
use crate::modules::ModuleId;
use crate::ui::theme::{colors, styles, symbols};
use crate::ui::widgets::Card;

fn detail_lines(action: Action, app: &App) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    match action {
        Action::Run(id) => {
            for text in id.details() {
                lines.push(Line::from(Span::styled(*text, styles::unselected())));
            }
            if id == ModuleId::Dns {
                let provider = app.ctx.config.dns.provider;
                lines.push(Line::default());
                lines.push(Line::from(vec![
                    Span::styled("Provider: ", styles::muted()),
                    Span::styled(provider.name(), styles::selected()),
                    Span::styled(
                        format!("  {}", provider.servers().join(", ")),
                        styles::muted(),
                    ),
                ]));
            }
            if id.supports_revert() {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(
                    format!("{} Current values are backed up first", symbols::REVERTIBLE),
                    styles::muted(),
                )));
            }
        }
        Action::RunAll => {
            lines.push(Line::from(Span::styled(
                "Runs every module in this order:",
                styles::unselected(),
            )));
            for (i, id) in ModuleId::RUN_ALL_ORDER.iter().enumerate() {
                let branch = if i + 1 == ModuleId::RUN_ALL_ORDER.len() {
                    symbols::TREE_END
                } else {
                    symbols::TREE_BRANCH
                };
                lines.push(Line::from(vec![
                    Span::styled(format!("  {} ", branch), styles::muted()),
                    Span::styled(id.title(), styles::unselected()),
                ]));
            }
            lines.push(Line::from(Span::styled(
                "Repair tools can take over an hour.",
                Style::default().fg(colors::WARNING),
            )));
        }
        Action::Revert(id) => {
            let backed_up = app.ctx.backups.exists(id.key());
            lines.push(Line::from(Span::styled(
                "Restores the values saved before the last run.",
                styles::unselected(),
            )));
            lines.push(Line::default());
            lines.push(if backed_up {
                Line::from(Span::styled(
                    format!("{} Backup found", symbols::STATUS_OK),
                    styles::status_ok(),
                ))
            } else {
                Line::from(Span::styled(
                    format!("{} No backup for this module yet", symbols::WARNING),
                    styles::status_warning(),
                ))
            });
        }
    }
    lines
}

/// Render the confirmation card for `action`.
pub fn render_confirmation(frame: &mut Frame, area: Rect, app: &App, action: Action) {
    let lines = detail_lines(action, app);

    let card_width = 72u16.min(area.width.saturating_sub(4));
    let card_height = (lines.len() as u16 + 4).min(area.height);
    let card_area = crate::ui::centered(area, card_width, card_height);

    frame.render_widget(Clear, card_area);
    let card = Card::new(Span::styled(action.title(), styles::title())).focused(true);
    frame.render_widget(card, card_area);

    let inner = crate::ui::card_inner(card_area, 2);
    let body = Rect::new(inner.x, inner.y + 1, inner.width, inner.height.saturating_sub(1));
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), body);
}

/// Render the restart prompt shown on quit.
pub fn render_restart_prompt(frame: &mut Frame, area: Rect) {
    let card_area = crate::ui::centered(area, 56, 7);

    frame.render_widget(Clear, card_area);
    let card = Card::new(Span::styled("Restart required", styles::status_warning()))
        .border_style(Style::default().fg(colors::WARNING));
    frame.render_widget(card, card_area);

    let inner = crate::ui::card_inner(card_area, 2);
    let text = vec![
        Line::default(),
        Line::from(Span::styled(
            "Some changes take effect only after a restart.",
            styles::unselected(),
        )),
        Line::from(Span::styled("Restart Windows now?", styles::selected())),
    ];
    frame.render_widget(
        Paragraph::new(text).alignment(Alignment::Center),
        inner,
    );
}
