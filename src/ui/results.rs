//! Results view: the last module report or the "run all" summary.

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Paragraph, Wrap},
    Frame,
};

use crate::app::App;
use crate::report::{ModuleReport, RunSummary};
use crate::ui::theme::{colors, styles, symbols};
use crate::ui::widgets::Card;

fn outcome_icon(success: bool) -> Span<'static> {
    if success {
        Span::styled(format!("{} ", symbols::STATUS_OK), styles::status_ok())
    } else {
        Span::styled(format!("{} ", symbols::ERROR), styles::status_failed())
    }
}

fn report_lines(report: &ModuleReport) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(vec![
        outcome_icon(report.success),
        Span::styled(report.message.clone(), styles::unselected()),
    ])];

    for (i, step) in report.steps.iter().enumerate() {
        let branch = if i + 1 == report.steps.len() {
            symbols::TREE_END
        } else {
            symbols::TREE_BRANCH
        };
        let detail_style = if step.success {
            styles::muted()
        } else {
            Style::default().fg(colors::ERROR)
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  {} ", branch), styles::muted()),
            outcome_icon(step.success),
            Span::styled(format!("{}: ", step.name), styles::unselected()),
            Span::styled(step.detail.clone(), detail_style),
        ]));
    }

    if report.reboot_required {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            format!("{} Restart Windows to finish", symbols::WARNING),
            styles::reboot(),
        )));
    }
    lines
}

fn summary_lines(summary: &RunSummary) -> Vec<Line<'static>> {
    let (headline_style, icon) = if summary.all_succeeded() {
        (styles::status_ok(), symbols::STATUS_OK)
    } else if summary.mostly_succeeded() {
        (styles::status_warning(), symbols::WARNING)
    } else {
        (styles::status_failed(), symbols::ERROR)
    };

    let mut lines = vec![
        Line::from(Span::styled(
            format!("{} {}", icon, summary.headline()),
            headline_style,
        )),
        Line::default(),
    ];

    for report in &summary.reports {
        lines.push(Line::from(vec![
            Span::raw("  "),
            outcome_icon(report.success),
            Span::styled(format!("{:<32}", report.module.title()), styles::unselected()),
            Span::styled(report.message.clone(), styles::muted()),
        ]));
    }

    if summary.reboot_required() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            format!("{} Restart Windows to finish", symbols::WARNING),
            styles::reboot(),
        )));
    }
    lines
}

/// Render the results card over the content area.
pub fn render_results(frame: &mut Frame, area: Rect, app: &App) {
    let (title, lines) = match (&app.last_summary, &app.last_report) {
        (Some(summary), _) => ("Run all".to_string(), summary_lines(summary)),
        (None, Some(report)) => (report.module.title().to_string(), report_lines(report)),
        (None, None) => (
            "Results".to_string(),
            vec![Line::from(Span::styled("Nothing has run yet", styles::muted()))],
        ),
    };

    let card = Card::new(Span::styled(title, styles::title())).focused(true);
    frame.render_widget(card, area);

    let inner = crate::ui::card_inner(area, 2);
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
}
