//! Main menu and header rendering.

use ratatui::{
    layout::{Alignment, Rect},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::app::{App, MenuItem};
use crate::modules::ModuleId;
use crate::ui::theme::{borders, styles, symbols};
use crate::ui::widgets::Card;

/// Render the single-line header: title on the left, badges on the right.
pub fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let title = Span::styled(format!("{} nettune", symbols::APP_ICON), styles::title());

    let mut badges: Vec<Span> = Vec::new();
    if app.reboot_pending {
        badges.push(Span::styled(
            format!("{} Restart needed", symbols::WARNING),
            styles::reboot(),
        ));
        badges.push(Span::raw("   "));
    }
    badges.push(match app.elevated {
        Some(true) => Span::styled(format!("{} Administrator", symbols::STATUS_OK), styles::status_ok()),
        Some(false) => Span::styled(format!("{} Not elevated", symbols::ERROR), styles::status_failed()),
        None => Span::styled(format!("{} Checking", symbols::STATUS_IDLE), styles::muted()),
    });

    let title_width = title.content.chars().count();
    let badges_width: usize = badges.iter().map(|s| s.content.chars().count()).sum();
    let spacing = (area.width as usize).saturating_sub(title_width + badges_width);

    let mut spans = vec![title, Span::raw(" ".repeat(spacing.max(1)))];
    spans.extend(badges);
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Render the separator line below header.
pub fn render_separator(frame: &mut Frame, area: Rect) {
    let line = borders::HORIZONTAL.repeat(area.width as usize);
    let sep = Paragraph::new(Line::from(Span::styled(line, styles::border_unfocused())));
    frame.render_widget(sep, area);
}

/// Status badge for menu items.
enum StatusBadge {
    Value(String),
    Revertible,
}

enum MenuRow {
    Blank,
    Separator,
    Item(usize, MenuItem),
}

/// Build the rows: modules, then run-all and status, then quit.
fn menu_rows(items: &[MenuItem]) -> Vec<MenuRow> {
    let mut rows = vec![MenuRow::Blank];
    let mut last_group = None;

    for (i, item) in items.iter().enumerate() {
        let group = match item {
            MenuItem::Module(_) => 0,
            MenuItem::RunAll | MenuItem::Status => 1,
            MenuItem::Quit => 2,
        };
        if last_group.is_some_and(|g| g != group) {
            rows.push(MenuRow::Blank);
            rows.push(MenuRow::Separator);
            rows.push(MenuRow::Blank);
        }
        last_group = Some(group);
        rows.push(MenuRow::Item(i, *item));
    }
    rows.push(MenuRow::Blank);
    rows
}

/// Render the main menu as a centered card.
pub fn render_main_menu(frame: &mut Frame, area: Rect, app: &App) {
    let items = app.menu_items();
    let rows = menu_rows(&items);

    let card_width = (48u16.max(area.width / 3) + 2).min(area.width);
    let card_height = (rows.len() as u16 + 2).min(area.height);
    let card_area = crate::ui::centered(area, card_width, card_height);

    let card = Card::new(Span::styled("Menu", styles::title()))
        .focused(true)
        .badge(Span::styled(
            format!("DNS: {}", app.ctx.config.dns.provider.name()),
            styles::muted(),
        ));
    frame.render_widget(card, card_area);

    let inner = crate::ui::card_inner(card_area, 1);

    for (row_idx, row) in rows.iter().enumerate() {
        let y = inner.y + row_idx as u16;
        if y >= inner.y + inner.height {
            break;
        }
        match row {
            MenuRow::Blank => {}
            MenuRow::Separator => render_separator_line(frame, inner, y),
            MenuRow::Item(idx, item) => render_menu_item(frame, inner, y, *idx, item, app),
        }
    }

    let hint_y = card_area.y + card_area.height;
    if hint_y < area.y + area.height {
        let hint = Paragraph::new(Line::from(Span::styled(
            format!("{} = can be reverted with r", symbols::REVERTIBLE),
            styles::muted(),
        )))
        .alignment(Alignment::Center);
        frame.render_widget(hint, Rect::new(area.x, hint_y, area.width, 1));
    }
}

/// Render a dotted separator line across the inner width.
fn render_separator_line(frame: &mut Frame, inner: Rect, y: u16) {
    let padding = 3u16;
    let width = inner.width.saturating_sub(padding * 2);
    let line = Line::from(Span::styled(
        symbols::SEPARATOR_CHAR.repeat(width as usize),
        styles::muted(),
    ));
    frame.render_widget(Paragraph::new(line), Rect::new(inner.x + padding, y, width, 1));
}

fn badge_for(item: &MenuItem, app: &App) -> Option<StatusBadge> {
    match item {
        MenuItem::Module(ModuleId::Dns) => Some(StatusBadge::Value(
            app.ctx.config.dns.provider.name().to_string(),
        )),
        MenuItem::Module(ModuleId::Mtu) => {
            let mtu = &app.ctx.config.mtu;
            Some(StatusBadge::Value(if mtu.auto_probe {
                "probe".to_string()
            } else {
                mtu.target.to_string()
            }))
        }
        MenuItem::Module(id) if id.supports_revert() => Some(StatusBadge::Revertible),
        _ => None,
    }
}

/// Render one item: key, label, right-aligned badge.
fn render_menu_item(frame: &mut Frame, inner: Rect, y: u16, idx: usize, item: &MenuItem, app: &App) {
    let is_selected = idx == app.selected_menu_item;

    let prefix = if is_selected {
        format!("  {} ", symbols::SELECTED)
    } else {
        "    ".to_string()
    };
    let number = format!("{:>2}  ", item.key());

    let label_style = if is_selected {
        styles::selected()
    } else {
        styles::unselected()
    };

    let mut spans = vec![
        Span::styled(prefix, label_style),
        Span::styled(number.clone(), styles::menu_number()),
        Span::styled(item.label(), label_style),
    ];

    if let Some(badge) = badge_for(item, app) {
        let (text, style) = match badge {
            StatusBadge::Value(v) => (v, styles::muted()),
            StatusBadge::Revertible => (symbols::REVERTIBLE.to_string(), styles::revertible()),
        };
        let used = 4 + number.len() + item.label().chars().count() + text.chars().count() + 2;
        let gap = (inner.width as usize).saturating_sub(used);
        spans.push(Span::raw(" ".repeat(gap)));
        spans.push(Span::styled(text, if is_selected { label_style } else { style }));
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans)),
        Rect::new(inner.x, y, inner.width, 1),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_rows_group_items() {
        let items: Vec<MenuItem> = ModuleId::ALL
            .into_iter()
            .map(MenuItem::Module)
            .chain([MenuItem::RunAll, MenuItem::Status, MenuItem::Quit])
            .collect();
        let rows = menu_rows(&items);
        let separators = rows
            .iter()
            .filter(|r| matches!(r, MenuRow::Separator))
            .count();
        let entries = rows
            .iter()
            .filter(|r| matches!(r, MenuRow::Item(..)))
            .count();
        assert_eq!(separators, 2);
        assert_eq!(entries, 12);
    }
}
