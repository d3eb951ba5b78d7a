//! Adapter status view: DNS servers and power management per adapter, then
//! the TCP values.

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::app::App;
use crate::modules::power::PowerState;
use crate::modules::tcp::ValueState;
use crate::orchestrator::SystemStatus;
use crate::ui::theme::{colors, styles, symbols};
use crate::ui::widgets::Card;

fn power_style(state: PowerState) -> Style {
    match state {
        PowerState::Disabled => styles::status_ok(),
        PowerState::Enabled | PowerState::NotConfigured => Style::default().fg(colors::WARNING),
        PowerState::Unknown => styles::muted(),
    }
}

fn adapter_lines(status: &SystemStatus) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for dns in &status.dns {
        lines.push(Line::from(Span::styled(dns.adapter.clone(), styles::adapter())));

        lines.push(Line::from(vec![
            Span::styled(format!("  {} ", symbols::TREE_BRANCH), styles::muted()),
            Span::styled("DNS: ", styles::muted()),
            Span::styled(dns.label(), styles::unselected()),
        ]));

        let power = status
            .power
            .iter()
            .find(|p| p.adapter == dns.adapter)
            .map(|p| p.state)
            .unwrap_or(PowerState::Unknown);
        lines.push(Line::from(vec![
            Span::styled(format!("  {} ", symbols::TREE_END), styles::muted()),
            Span::styled("Power: ", styles::muted()),
            Span::styled(power.label(), power_style(power)),
        ]));
        lines.push(Line::default());
    }
    lines
}

fn tcp_lines(status: &SystemStatus) -> Vec<Line<'static>> {
    status
        .tcp
        .iter()
        .map(|t| {
            let style = match t.state {
                ValueState::Configured => styles::status_ok(),
                ValueState::NeedsUpdate(_) => styles::status_warning(),
                ValueState::NotFound => styles::muted(),
            };
            Line::from(vec![
                Span::styled(format!("{:<28}", t.name), styles::unselected()),
                Span::styled(format!("{:<12}", t.wanted), styles::muted()),
                Span::styled(t.state.label(), style),
            ])
        })
        .collect()
}

/// Render the status view.
pub fn render_status_view(frame: &mut Frame, area: Rect, app: &App) {
    let Some(status) = &app.system_status else {
        render_no_adapters(frame, area, "Adapters", "No status loaded");
        return;
    };
    if status.dns.is_empty() {
        render_no_adapters(frame, area, "Adapters", "No network adapters found");
        return;
    }

    let tcp_height = status.tcp.len() as u16 + 2;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(6), Constraint::Length(tcp_height)])
        .split(area);

    let card = Card::new(Span::styled("Adapters", styles::card_title()))
        .focused(true)
        .item_count(status.dns.len());
    frame.render_widget(card, chunks[0]);
    frame.render_widget(
        Paragraph::new(adapter_lines(status)),
        crate::ui::card_inner(chunks[0], 2),
    );

    let card = Card::new(Span::styled("TCP", styles::card_title()));
    frame.render_widget(card, chunks[1]);
    frame.render_widget(
        Paragraph::new(tcp_lines(status)),
        crate::ui::card_inner(chunks[1], 2),
    );
}

/// Render a centered message inside an empty card.
pub fn render_no_adapters(frame: &mut Frame, area: Rect, title: &str, message: &str) {
    let card = Card::new(Span::styled(title.to_string(), styles::card_title()));
    frame.render_widget(card, area);

    let inner = crate::ui::card_inner(area, 2);
    let line = Line::from(vec![
        Span::styled(symbols::WARNING, Style::default().fg(colors::WARNING)),
        Span::raw(" "),
        Span::styled(message.to_string(), Style::default().fg(colors::ERROR)),
    ]);
    let msg_area = Rect::new(inner.x, inner.y + inner.height / 2, inner.width, 1);
    frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), msg_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::dns::DnsStatus;
    use crate::modules::power::PowerStatus;

    #[test]
    fn test_adapter_lines_pair_dns_and_power() {
        let status = SystemStatus {
            dns: vec![DnsStatus {
                adapter: "Ethernet".into(),
                servers: vec!["1.1.1.1".into(), "1.0.0.1".into()],
            }],
            power: vec![PowerStatus {
                adapter: "Ethernet".into(),
                key: None,
                state: PowerState::Disabled,
            }],
            tcp: Vec::new(),
        };
        let lines = adapter_lines(&status);
        assert_eq!(lines.len(), 4);
        let power_line: String = lines[2].spans.iter().map(|s| s.content.as_ref()).collect();
        assert!(power_line.contains("power saving off"));
        let dns_line: String = lines[1].spans.iter().map(|s| s.content.as_ref()).collect();
        assert!(dns_line.contains("Cloudflare"));
    }
}
