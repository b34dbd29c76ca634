//! TUI widgets for pgpeek.

mod activity;
mod confirm;
mod footer;
mod header;
mod plan;

use ratatui::layout::{Constraint, Layout, Rect};

pub use activity::render_activity;
pub use confirm::render_confirm;
pub use footer::render_footer;
pub use header::render_header;
pub use plan::render_plan;

/// Returns a centered rect of given percentage within `area`.
pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(area);

    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}
