//! Header widget showing server, refresh mode, session counts and clock.

use chrono::Local;
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::tui::state::AppState;
use crate::tui::style::Styles;

/// Renders the header bar.
pub fn render_header(frame: &mut Frame, area: Rect, state: &AppState) {
    let chunks = Layout::horizontal([
        Constraint::Min(20),    // Name, version, mode, counts, error
        Constraint::Length(21), // Clock
    ])
    .split(area);

    let mode = if state.paused { " PAUSED " } else { " LIVE " };
    let mut spans = vec![
        Span::styled(
            format!(" pgpeek  PostgreSQL {} ", state.server_version),
            Styles::header(),
        ),
        Span::styled(mode, Styles::header()),
        Span::styled(
            format!(
                " {}/{} sessions ",
                state.table.rows().len(),
                state.table.total()
            ),
            Styles::header(),
        ),
    ];
    if state.table.show_idle() {
        spans.push(Span::styled("[idle shown] ", Styles::header()));
    }
    if let Some(err) = &state.last_error {
        spans.push(Span::styled(format!(" {} ", err), Styles::header_error()));
    }
    let left = Paragraph::new(Line::from(spans)).style(Styles::header());
    frame.render_widget(left, chunks[0]);

    let clock = Paragraph::new(Local::now().format("%Y-%m-%d %H:%M:%S ").to_string())
        .style(Styles::header())
        .alignment(Alignment::Right);
    frame.render_widget(clock, chunks[1]);
}
