//! Footer line: key hints, or the current toast.

use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::tui::state::AppState;
use crate::tui::style::Styles;

const HINTS: &[(&str, &str)] = &[
    ("i", "idle"),
    ("k", "cancel"),
    ("K", "terminate"),
    ("c", "copy"),
    ("e", "explain"),
    ("u", "pause"),
    ("q", "quit"),
];

pub fn render_footer(frame: &mut Frame, area: Rect, state: &AppState) {
    let line = match &state.toast {
        Some(toast) => Line::from(Span::styled(format!(">> {}", toast.message), Styles::toast())),
        None => Line::from(
            HINTS
                .iter()
                .flat_map(|(key, label)| {
                    [
                        Span::styled(format!(" {}", key), Styles::help_key()),
                        Span::styled(format!(":{} ", label), Styles::dim()),
                    ]
                })
                .collect::<Vec<_>>(),
        ),
    };
    frame.render_widget(Paragraph::new(line), area);
}
