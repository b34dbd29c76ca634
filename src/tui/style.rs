//! Color scheme and styles.

use ratatui::style::{Color, Modifier, Style};

/// Dashboard color palette.
pub struct Theme;

impl Theme {
    pub const BG: Color = Color::Reset;
    pub const HEADER_BG: Color = Color::Blue;
    pub const SELECTED_BG: Color = Color::DarkGray;
    pub const POPUP_BG: Color = Color::Black;

    pub const FG: Color = Color::White;
    pub const FG_DIM: Color = Color::DarkGray;
    pub const HEADER_FG: Color = Color::White;

    pub const BORDER: Color = Color::Cyan;
    pub const KEY: Color = Color::Yellow;
    pub const ERROR: Color = Color::Red;
    pub const WAITING: Color = Color::Yellow;
    pub const IDLE: Color = Color::DarkGray;
}

/// Pre-defined styles.
pub struct Styles;

impl Styles {
    /// Default text style.
    pub fn default() -> Style {
        Style::default().fg(Theme::FG).bg(Theme::BG)
    }

    /// Header bar style.
    pub fn header() -> Style {
        Style::default()
            .fg(Theme::HEADER_FG)
            .bg(Theme::HEADER_BG)
            .add_modifier(Modifier::BOLD)
    }

    /// Header bar style for error text.
    pub fn header_error() -> Style {
        Style::default()
            .fg(Theme::ERROR)
            .bg(Theme::HEADER_BG)
            .add_modifier(Modifier::BOLD)
    }

    /// Selected row style.
    pub fn selected() -> Style {
        Style::default()
            .bg(Theme::SELECTED_BG)
            .add_modifier(Modifier::BOLD)
    }

    /// Table header style.
    pub fn table_header() -> Style {
        Style::default()
            .fg(Theme::HEADER_FG)
            .bg(Theme::HEADER_BG)
            .add_modifier(Modifier::BOLD)
    }

    /// Backend blocked on a lock or waiting for an event.
    pub fn waiting() -> Style {
        Style::default().fg(Theme::WAITING)
    }

    /// Idle backend.
    pub fn idle() -> Style {
        Style::default().fg(Theme::IDLE)
    }

    /// Dimmed text style.
    pub fn dim() -> Style {
        Style::default().fg(Theme::FG_DIM)
    }

    /// Key name in hints.
    pub fn help_key() -> Style {
        Style::default().fg(Theme::KEY).add_modifier(Modifier::BOLD)
    }

    pub fn toast() -> Style {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Green)
            .add_modifier(Modifier::BOLD)
    }

    /// Popup border.
    pub fn border() -> Style {
        Style::default().fg(Theme::BORDER)
    }

    /// Popup body.
    pub fn popup() -> Style {
        Style::default().fg(Theme::FG).bg(Theme::POPUP_BG)
    }

    /// Section title inside popups.
    pub fn section_header() -> Style {
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    }

    /// Focused popup button.
    pub fn button_focused() -> Style {
        Style::default()
            .fg(Color::Black)
            .bg(Theme::BORDER)
            .add_modifier(Modifier::BOLD)
    }

    pub fn button() -> Style {
        Style::default().fg(Theme::FG)
    }
}
