//! Yes/No confirmation popup.

use ratatui::Frame;
use ratatui::layout::{Alignment, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use crate::tui::state::ConfirmChoice;
use crate::tui::style::Styles;

/// Renders a centered confirmation popup for `prompt`.
pub fn render_confirm(frame: &mut Frame, area: Rect, prompt: &str, selected: ConfirmChoice) {
    let popup_width = (area.width / 10 * 6).clamp(40, 90).min(area.width);
    let prompt_lines = u16::try_from(prompt.lines().count()).unwrap_or(u16::MAX);
    let popup_height = prompt_lines.saturating_add(6).min(area.height);

    let popup_x = area.x + (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = area.y + (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .title(" Confirm ")
        .borders(Borders::ALL)
        .border_style(Styles::border())
        .style(Styles::popup());
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let button = |label: &'static str, choice: ConfirmChoice| {
        let style = if choice == selected {
            Styles::button_focused()
        } else {
            Styles::button()
        };
        Span::styled(label, style)
    };

    let mut content: Vec<Line> = prompt.lines().map(Line::from).collect();
    content.push(Line::from(""));
    content.push(Line::from(vec![
        button("[ Yes ]", ConfirmChoice::Yes),
        Span::raw("   "),
        button("[ No ]", ConfirmChoice::No),
    ]));
    content.push(Line::from(""));
    content.push(Line::from(vec![
        Span::styled("y", Styles::help_key()),
        Span::styled(" confirm  ", Styles::dim()),
        Span::styled("n/Esc", Styles::help_key()),
        Span::styled(" dismiss", Styles::dim()),
    ]));

    let paragraph = Paragraph::new(content)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, inner);
}
