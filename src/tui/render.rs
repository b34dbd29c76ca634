//! Main rendering logic for TUI.

use ratatui::Frame;
use ratatui::layout::{Constraint, Layout};

use super::state::{AppState, PopupState};
use super::widgets::{render_activity, render_confirm, render_footer, render_header, render_plan};

/// Main render function.
pub fn render(frame: &mut Frame, state: &mut AppState) {
    let area = frame.area();

    let chunks = Layout::vertical([
        Constraint::Length(1), // Header
        Constraint::Min(1),    // Sessions
        Constraint::Length(1), // Hints / toast
    ])
    .split(area);

    render_header(frame, chunks[0], state);
    render_activity(frame, chunks[1], state);
    render_footer(frame, chunks[2], state);

    // Popups are rendered last to overlay everything
    match &mut state.popup {
        PopupState::None => {}
        PopupState::Confirm { intent, selected } => {
            render_confirm(frame, area, &intent.description, *selected);
        }
        PopupState::Plan {
            query,
            plan,
            scroll,
        } => render_plan(frame, area, query, plan, scroll),
    }
}
