//! Two-pane viewer for a query and its execution plan.

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use crate::tui::style::Styles;

use super::centered_rect;

/// Renders the viewer. `scroll` is clamped to the plan length.
pub fn render_plan(frame: &mut Frame, area: Rect, query: &str, plan: &str, scroll: &mut u16) {
    let popup_area = centered_rect(85, 85, area);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .title(" Execution plan ")
        .borders(Borders::ALL)
        .border_style(Styles::border())
        .style(Styles::popup());
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let query_height = u16::try_from(query.lines().count())
        .unwrap_or(u16::MAX)
        .min(inner.height / 3)
        .max(1)
        .saturating_add(2);
    let chunks = Layout::vertical([
        Constraint::Length(query_height),
        Constraint::Min(1),
        Constraint::Length(1),
    ])
    .split(inner);

    let query_pane = Paragraph::new(query.lines().map(Line::from).collect::<Vec<_>>()).block(
        Block::default()
            .title(Span::styled(" Query ", Styles::section_header()))
            .borders(Borders::ALL)
            .border_style(Styles::dim()),
    );
    frame.render_widget(query_pane, chunks[0]);

    let plan_lines: Vec<Line> = plan.lines().map(Line::from).collect();
    let visible = chunks[1].height.saturating_sub(2);
    let max_scroll = u16::try_from(plan_lines.len())
        .unwrap_or(u16::MAX)
        .saturating_sub(visible);
    *scroll = (*scroll).min(max_scroll);

    let plan_pane = Paragraph::new(plan_lines).scroll((*scroll, 0)).block(
        Block::default()
            .title(Span::styled(" Plan ", Styles::section_header()))
            .borders(Borders::ALL)
            .border_style(Styles::dim()),
    );
    frame.render_widget(plan_pane, chunks[1]);

    let footer = Line::from(vec![
        Span::styled("Up/Down/PgUp/PgDn", Styles::help_key()),
        Span::styled(" scroll  ", Styles::dim()),
        Span::styled("Esc/q/Enter", Styles::help_key()),
        Span::styled(" close", Styles::dim()),
    ]);
    frame.render_widget(Paragraph::new(footer), chunks[2]);
}
