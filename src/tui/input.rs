//! Input handling and keybindings.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::actions::NOT_SENT;
use super::state::{AppState, ConfirmChoice, PopupState};

/// Rows moved by PageUp/PageDown.
const PAGE_ROWS: usize = 10;

/// Lines scrolled by PageUp/PageDown in the plan viewer.
const PAGE_LINES: u16 = 10;

/// Result of handling a key event. Variants other than `None` and `Quit`
/// need the worker or the terminal and are dispatched by the app.
#[derive(Debug, PartialEq, Eq)]
pub enum KeyAction {
    /// No action, continue.
    None,
    /// Quit the application.
    Quit,
    Cancel,
    Terminate,
    CopyQuery,
    Explain,
}

/// How the confirmation popup reacts to a key.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfirmationDecision {
    Confirm,
    Dismiss,
    Continue,
}

/// Handles key input and updates state.
pub fn handle_key(state: &mut AppState, key: KeyEvent) -> KeyAction {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return KeyAction::Quit;
    }
    match state.popup {
        PopupState::Confirm { .. } => handle_confirm(state, key),
        PopupState::Plan { .. } => handle_plan(state, key),
        PopupState::None => handle_normal(state, key),
    }
}

fn handle_normal(state: &mut AppState, key: KeyEvent) -> KeyAction {
    match key.code {
        KeyCode::Char('q') => return KeyAction::Quit,
        KeyCode::Char('i') => {
            let shown = state.table.toggle_idle();
            state.show_toast(if shown {
                "Showing idle sessions"
            } else {
                "Hiding idle sessions"
            });
        }
        KeyCode::Char('u') => {
            state.paused = !state.paused;
            state.show_toast(if state.paused {
                "Refresh paused"
            } else {
                "Refresh resumed"
            });
        }
        KeyCode::Char('k') => return KeyAction::Cancel,
        KeyCode::Char('K') => return KeyAction::Terminate,
        KeyCode::Char('c') => return KeyAction::CopyQuery,
        KeyCode::Char('e') => return KeyAction::Explain,
        KeyCode::Up => state.table.move_up(1),
        KeyCode::Down => state.table.move_down(1),
        KeyCode::PageUp => state.table.move_up(PAGE_ROWS),
        KeyCode::PageDown => state.table.move_down(PAGE_ROWS),
        KeyCode::Home => state.table.select_first(),
        KeyCode::End => state.table.select_last(),
        _ => {}
    }
    KeyAction::None
}

/// Maps a key to a confirmation decision, moving focus between the
/// Yes and No buttons.
pub fn confirmation_decision(selected: &mut ConfirmChoice, key: KeyEvent) -> ConfirmationDecision {
    match key.code {
        KeyCode::Char(c) if c.eq_ignore_ascii_case(&'y') => ConfirmationDecision::Confirm,
        KeyCode::Char(c) if c.eq_ignore_ascii_case(&'n') || c.eq_ignore_ascii_case(&'q') => {
            ConfirmationDecision::Dismiss
        }
        KeyCode::Esc => ConfirmationDecision::Dismiss,
        KeyCode::Left | KeyCode::Char('h') => {
            *selected = ConfirmChoice::Yes;
            ConfirmationDecision::Continue
        }
        KeyCode::Right | KeyCode::Char('l') => {
            *selected = ConfirmChoice::No;
            ConfirmationDecision::Continue
        }
        KeyCode::Tab | KeyCode::BackTab => {
            *selected = selected.toggle();
            ConfirmationDecision::Continue
        }
        KeyCode::Enter => match selected {
            ConfirmChoice::Yes => ConfirmationDecision::Confirm,
            ConfirmChoice::No => ConfirmationDecision::Dismiss,
        },
        _ => ConfirmationDecision::Continue,
    }
}

fn handle_confirm(state: &mut AppState, key: KeyEvent) -> KeyAction {
    let PopupState::Confirm { selected, .. } = &mut state.popup else {
        return KeyAction::None;
    };
    match confirmation_decision(selected, key) {
        ConfirmationDecision::Confirm => {
            if let PopupState::Confirm { intent, .. } = std::mem::take(&mut state.popup)
                && !intent.confirm()
            {
                state.show_toast(NOT_SENT);
            }
        }
        ConfirmationDecision::Dismiss => state.popup = PopupState::None,
        ConfirmationDecision::Continue => {}
    }
    KeyAction::None
}

fn handle_plan(state: &mut AppState, key: KeyEvent) -> KeyAction {
    let PopupState::Plan { scroll, .. } = &mut state.popup else {
        return KeyAction::None;
    };
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Enter => state.popup = PopupState::None,
        KeyCode::Up => *scroll = scroll.saturating_sub(1),
        KeyCode::Down => *scroll = scroll.saturating_add(1),
        KeyCode::PageUp => *scroll = scroll.saturating_sub(PAGE_LINES),
        KeyCode::PageDown => *scroll = scroll.saturating_add(PAGE_LINES),
        KeyCode::Home => *scroll = 0,
        _ => {}
    }
    KeyAction::None
}
