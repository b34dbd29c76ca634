//! Activity table widget.

use ratatui::Frame;
use ratatui::layout::{Constraint, Rect};
use ratatui::text::Span;
use ratatui::widgets::{Cell, Clear, Row, Table};

use crate::activity::model::{STATE_COLUMN, WAIT_COLUMN};
use crate::activity::{COLUMNS, IDLE_STATE};
use crate::tui::state::AppState;
use crate::tui::style::Styles;

/// Renders the session table with the precomputed column widths.
pub fn render_activity(frame: &mut Frame, area: Rect, state: &mut AppState) {
    let header = Row::new(
        COLUMNS
            .iter()
            .map(|c| Cell::from(Span::styled(c.label, Styles::table_header()))),
    )
    .style(Styles::table_header())
    .height(1);

    let rows: Vec<Row> = state
        .table
        .rows()
        .iter()
        .map(|row| {
            let style = if row.cells.get(WAIT_COLUMN).is_some_and(|c| c == "1") {
                Styles::waiting()
            } else if row.cells.get(STATE_COLUMN).is_some_and(|c| c == IDLE_STATE) {
                Styles::idle()
            } else {
                Styles::default()
            };
            Row::new(row.cells.iter().cloned().map(Cell::from)).style(style)
        })
        .collect();

    let widths: Vec<Constraint> = state
        .table
        .widths()
        .iter()
        .map(|&w| Constraint::Length(w))
        .collect();

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .style(Styles::default())
        .row_highlight_style(Styles::selected());

    frame.render_widget(Clear, area);
    frame.render_stateful_widget(table, area, &mut state.table.ratatui_state);
}
